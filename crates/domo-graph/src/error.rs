use domo_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("State store error: {0}")]
    State(#[from] domo_state::StateStoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] domo_llm::LlmError),

    #[error("Assistant call timed out after {secs}s")]
    AssistantTimeout { secs: u64 },

    /// Reducer detected an unrecoverable message-stream violation.
    #[error("Graph invariant violated: {0}")]
    Invariant(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::State(e) => e.kind(),
            GraphError::Llm(e) => e.kind(),
            GraphError::AssistantTimeout { .. } => ErrorKind::Timeout,
            GraphError::Invariant(_) => ErrorKind::GraphInvariant,
            GraphError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
