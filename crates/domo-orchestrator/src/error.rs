use domo_core::ErrorKind;
use thiserror::Error;

/// Failures while handling one inbound entry.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The payload is not a valid envelope. Dead-lettered immediately.
    #[error("Invalid envelope: {0}")]
    Envelope(#[from] domo_protocol::ProtocolError),

    /// The addressed user has no active secretary. Dead-lettered with its
    /// own error type; retrying cannot conjure an assignment.
    #[error("No secretary assigned for user {user_id}")]
    NoSecretaryAssigned { user_id: i64 },

    #[error("State store error: {0}")]
    State(#[from] domo_state::StateStoreError),

    #[error("Graph error: {0}")]
    Graph(#[from] domo_graph::GraphError),

    #[error("Stream error: {0}")]
    Stream(#[from] domo_stream::StreamError),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Envelope(_) => ErrorKind::PermanentValidation,
            ProcessError::NoSecretaryAssigned { .. } => ErrorKind::PermanentValidation,
            ProcessError::State(e) => e.kind(),
            ProcessError::Graph(e) => e.kind(),
            ProcessError::Stream(e) => e.kind(),
        }
    }

    /// `error_type` recorded on DLQ entries.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProcessError::NoSecretaryAssigned { .. } => "NoSecretaryAssigned",
            other => other.kind().as_str(),
        }
    }
}
