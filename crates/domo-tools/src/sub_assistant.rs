//! Sub-assistant tool — delegate a request to another configured assistant.
//!
//! The delegated assistant runs its own graph invocation with the tool's
//! `message` argument as a single user turn. It never sees or mutates the
//! parent conversation's state: the runner starts from a fresh state under
//! a separate thread namespace, and the delegate's tool set is built
//! without further sub-assistant kinds, so delegation cannot recurse.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use domo_core::RequestContext;

use crate::error::{ToolError, ToolErrorCode};
use crate::AssistantTool;

/// Seam to the conversation graph, implemented by the orchestrator. Kept
/// as a trait here so the tool layer does not depend on the graph crate.
#[async_trait]
pub trait SubAssistantRunner: Send + Sync {
    /// Run `message` as a single user turn against `assistant_id` on
    /// behalf of `user_id`. Returns the delegate's final text.
    async fn run_delegated(
        &self,
        ctx: &RequestContext,
        assistant_id: &str,
        user_id: i64,
        message: &str,
    ) -> Result<String, String>;
}

pub struct SubAssistantTool {
    name: String,
    description: String,
    delegate_assistant_id: String,
    user_id: i64,
    request: RequestContext,
    runner: Arc<dyn SubAssistantRunner>,
}

impl SubAssistantTool {
    pub fn new(
        name: &str,
        description: &str,
        delegate_assistant_id: &str,
        user_id: i64,
        request: RequestContext,
        runner: Arc<dyn SubAssistantRunner>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            delegate_assistant_id: delegate_assistant_id.to_string(),
            user_id,
            request,
            runner,
        }
    }
}

#[async_trait]
impl AssistantTool for SubAssistantTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'message' is required"))?;

        info!(
            tool = %self.name,
            delegate = %self.delegate_assistant_id,
            user_id = self.user_id,
            "delegating to sub-assistant"
        );

        self.runner
            .run_delegated(&self.request, &self.delegate_assistant_id, self.user_id, message)
            .await
            .map_err(|e| ToolError::new(&self.name, ToolErrorCode::ApiError, e))
    }
}
