//! In-process fakes for provider-dependent tests. No network, fully
//! deterministic, shared by the graph, orchestrator, and extractor suites.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::batch::{BatchProvider, BatchRequestItem, BatchResultItem, BatchStatus};
use crate::error::LlmError;
use crate::provider::{
    ChatProvider, ChatRequest, ChatResponse, EmbeddingProvider, StopReason, ToolCallRequest,
};

/// Chat provider that replays a fixed script of responses.
///
/// Each `chat` call pops the next scripted step; running past the end is a
/// test bug and returns an API error. Requests are recorded for assertions.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text reply.
    pub fn then_text(self, content: &str) -> Self {
        self.push(Ok(text_response(content)));
        self
    }

    /// Queue an assistant turn requesting a single tool call.
    pub fn then_tool_call(self, id: &str, name: &str, arguments: serde_json::Value) -> Self {
        self.push(Ok(tool_call_response(vec![ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        }])));
        self
    }

    /// Queue a failure.
    pub fn then_error(self, error: LlmError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, step: Result<ChatResponse, LlmError>) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_made(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(req.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(LlmError::Api {
                status: 500,
                message: "scripted provider ran out of responses".into(),
            })
        })
    }
}

pub fn text_response(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        tool_calls: Vec::new(),
        model: "scripted".into(),
        tokens_in: 10,
        tokens_out: 10,
        stop_reason: StopReason::Stop,
    }
}

pub fn tool_call_response(tool_calls: Vec<ToolCallRequest>) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls,
        model: "scripted".into(),
        tokens_in: 10,
        tokens_out: 5,
        stop_reason: StopReason::ToolUse,
    }
}

/// Deterministic embedder: hashes the text into a fixed-dimension unit
/// vector. Equal texts embed equally; different texts almost surely differ.
pub struct HashEmbedder {
    pub dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut state: u64 = 0xcbf29ce484222325;
        let mut vector = vec![0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            state = (state ^ byte as u64).wrapping_mul(0x100000001b3);
            vector[i % self.dim] += (state % 1000) as f32 / 1000.0 - 0.5;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
        Ok(vector.into_iter().map(|v| v / norm).collect())
    }
}

/// Batch provider whose lifecycle is driven by the test: submitted batches
/// stay in progress until `complete` (or `fail`) is called.
pub struct ScriptedBatch {
    state: Mutex<ScriptedBatchState>,
}

struct ScriptedBatchState {
    submitted: Vec<Vec<BatchRequestItem>>,
    status: BatchStatus,
    results: Vec<BatchResultItem>,
}

impl ScriptedBatch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptedBatchState {
                submitted: Vec::new(),
                status: BatchStatus::InProgress,
                results: Vec::new(),
            }),
        }
    }

    pub fn complete(&self, results: Vec<BatchResultItem>) {
        let mut state = self.state.lock().unwrap();
        state.status = BatchStatus::Completed;
        state.results = results;
    }

    pub fn fail(&self, message: &str) {
        self.state.lock().unwrap().status = BatchStatus::Failed {
            message: message.to_string(),
        };
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }
}

impl Default for ScriptedBatch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchProvider for ScriptedBatch {
    async fn submit_batch(&self, items: Vec<BatchRequestItem>) -> Result<String, LlmError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push(items);
        Ok(format!("batch-{}", state.submitted.len()))
    }

    async fn poll_batch(&self, _batch_id: &str) -> Result<BatchStatus, LlmError> {
        Ok(self.state.lock().unwrap().status.clone())
    }

    async fn collect_batch(&self, _batch_id: &str) -> Result<Vec<BatchResultItem>, LlmError> {
        Ok(self.state.lock().unwrap().results.clone())
    }
}
