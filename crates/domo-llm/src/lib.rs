//! `domo-llm` — the LLM provider seam.
//!
//! Three capabilities, each behind its own trait so callers depend on
//! exactly what they use: [`ChatProvider`] (conversation graph, summarizer),
//! [`EmbeddingProvider`] (memory retrieval and dedup), and [`BatchProvider`]
//! (the extractor's submit/poll/collect cycle). The shipped implementation
//! speaks the OpenAI-compatible HTTP dialect; tests use the scripted
//! provider in [`testing`].

pub mod batch;
pub mod error;
pub mod openai;
pub mod provider;
pub mod testing;

pub use batch::{BatchProvider, BatchRequestItem, BatchResultItem, BatchStatus};
pub use error::LlmError;
pub use openai::OpenAiProvider;
pub use provider::{
    ChatMessage, ChatProvider, ChatRequest, ChatResponse, ChatRole, EmbeddingProvider,
    StopReason, ToolCallRequest, ToolSpec,
};
