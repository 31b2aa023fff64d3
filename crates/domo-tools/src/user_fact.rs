//! `user_fact_save` tool — record a short durable fact about the user.
//!
//! Facts are plain rows (no embedding); they are rendered wholesale into
//! the system context on every turn, unlike memories which are retrieved
//! by similarity.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::{from_state_error, ToolError};
use crate::{AssistantTool, ToolContext};

pub struct UserFactTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

impl UserFactTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for UserFactTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let fact = args
            .get("fact")
            .and_then(Value::as_str)
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'fact' is required"))?;

        let created = self
            .ctx
            .state
            .create_user_fact(&self.ctx.request, self.ctx.user_id, fact)
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        info!(fact_id = created.id, user_id = self.ctx.user_id, "user fact saved");
        Ok(format!("Noted: {fact}"))
    }
}
