//! `domo-tools` — tool system for assistant tool calling.
//!
//! Tools are materialized from declarative [`ToolDefinition`] rows at
//! invocation time, bound to a per-request [`ToolContext`], and collected
//! into a [`ToolSet`] that validates every call's arguments against the
//! definition's JSON schema before dispatching. Execution failures never
//! escape as errors to the graph: they become [`ToolError`] values the
//! caller renders into tool-response content the LLM can react to.
//!
//! [`ToolDefinition`]: domo_state::models::ToolDefinition

pub mod calendar;
pub mod context;
pub mod error;
pub mod factory;
pub mod memory;
pub mod reminder;
pub mod schema;
pub mod sub_assistant;
pub mod time;
pub mod user_fact;
pub mod web_search;

use async_trait::async_trait;
use serde_json::Value;

pub use context::{ToolContext, WebSearchConfig};
pub use error::{ToolError, ToolErrorCode};
pub use factory::{build_tool_set, ToolSet};
pub use sub_assistant::SubAssistantRunner;

/// Trait that all tools implement.
///
/// `execute` receives arguments that already passed schema validation;
/// it still re-checks semantic constraints (date parse, cron validity).
#[async_trait]
pub trait AssistantTool: Send + Sync {
    /// Unique name, as stored in the tool definition.
    fn name(&self) -> &str;

    /// Human-readable description forwarded to the LLM.
    fn description(&self) -> &str;

    /// Execute with validated input; returns text for the tool response.
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}
