use domo_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("LLM call timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Http(_) => ErrorKind::TransientNetwork,
            LlmError::Api { .. } => ErrorKind::DependencyUnavailable,
            LlmError::Parse(_) => ErrorKind::DependencyUnavailable,
            LlmError::RateLimited { .. } => ErrorKind::DependencyUnavailable,
            LlmError::Timeout => ErrorKind::Timeout,
            LlmError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
