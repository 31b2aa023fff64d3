use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("State store error: {0}")]
    State(#[from] domo_state::StateStoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] domo_llm::LlmError),

    #[error("Batch {batch_id} failed: {message}")]
    BatchFailed { batch_id: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExtractorError>;
