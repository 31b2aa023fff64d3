use async_trait::async_trait;

use crate::error::LlmError;
use crate::provider::ChatRequest;

/// One request in a provider batch, addressed by caller-chosen id.
#[derive(Debug, Clone)]
pub struct BatchRequestItem {
    pub custom_id: String,
    pub request: ChatRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    InProgress,
    Completed,
    Failed { message: String },
}

/// Result for one batch item. Exactly one of `content` / `error` is set.
#[derive(Debug, Clone)]
pub struct BatchResultItem {
    pub custom_id: String,
    pub content: Option<String>,
    pub error: Option<String>,
}

/// Deferred bulk completion API: submit, poll until terminal, collect.
///
/// Batch ids are durable on the provider side — a worker restarted mid-job
/// resumes by polling the id it recorded, without resubmitting.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    async fn submit_batch(&self, items: Vec<BatchRequestItem>) -> Result<String, LlmError>;

    async fn poll_batch(&self, batch_id: &str) -> Result<BatchStatus, LlmError>;

    /// Only valid once `poll_batch` reported `Completed`.
    async fn collect_batch(&self, batch_id: &str) -> Result<Vec<BatchResultItem>, LlmError>;
}
