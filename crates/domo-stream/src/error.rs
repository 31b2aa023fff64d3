use domo_core::ErrorKind;
use thiserror::Error;

/// Errors raised by the stream transport layer.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The broker refused or dropped the connection. The caller's outer
    /// loop backs off and retries; entries stay pending meanwhile.
    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// A DLQ entry on the wire is missing fields or malformed.
    #[error("Malformed entry: {0}")]
    Malformed(#[from] domo_protocol::ProtocolError),

    /// Requeue/delete addressed an id that is not on the DLQ.
    #[error("Entry not found on DLQ: {id}")]
    NotFound { id: String },
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Broker(_) => ErrorKind::TransientNetwork,
            StreamError::Malformed(_) => ErrorKind::PermanentValidation,
            StreamError::NotFound { .. } => ErrorKind::PermanentValidation,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
