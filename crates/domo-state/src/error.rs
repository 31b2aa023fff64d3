use domo_core::ErrorKind;
use thiserror::Error;

/// Errors from the state-store client.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// Connection-level failure after the retry budget was spent.
    #[error("Network error: {0}")]
    Network(String),

    /// The store rejected the request; retrying would not help.
    #[error("HTTP {status}: {message}")]
    Http4xx { status: u16, message: String },

    /// The store failed server-side; the retry loop already re-tried.
    #[error("HTTP {status}: {message}")]
    Http5xx { status: u16, message: String },

    /// The breaker is open; the call was not attempted.
    #[error("Circuit open for state store (retry after {retry_after_secs}s)")]
    CircuitOpen { retry_after_secs: u64 },

    /// The response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl StateStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StateStoreError::Network(_) => ErrorKind::TransientNetwork,
            StateStoreError::Http4xx { .. } => ErrorKind::PermanentValidation,
            StateStoreError::Http5xx { .. } => ErrorKind::DependencyUnavailable,
            StateStoreError::CircuitOpen { .. } => ErrorKind::DependencyUnavailable,
            StateStoreError::Decode(_) => ErrorKind::PermanentValidation,
        }
    }
}

pub type Result<T> = std::result::Result<T, StateStoreError>;
