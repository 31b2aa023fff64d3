//! Memory tools — save a fact about the user, or search stored memories
//! by semantic similarity.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use domo_state::models::{MemoryCreate, MemorySearchRequest, MemoryType};

use crate::error::{from_state_error, ToolError, ToolErrorCode};
use crate::{AssistantTool, ToolContext};

pub struct MemorySaveTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

pub struct MemorySearchTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

impl MemorySaveTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for MemorySaveTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'text' is required"))?;

        let memory_type = args
            .get("memory_type")
            .and_then(Value::as_str)
            .map(parse_memory_type)
            .transpose()
            .map_err(|bad| {
                ToolError::invalid_input(&self.name, format!("unknown memory_type: {bad}"))
            })?
            .unwrap_or(MemoryType::UserFact);

        let importance = args
            .get("importance")
            .and_then(Value::as_u64)
            .unwrap_or(5)
            .clamp(1, 10) as u8;

        let embedding = self
            .ctx
            .embedder
            .embed(text)
            .await
            .map_err(|e| ToolError::new(&self.name, ToolErrorCode::ApiError, e.to_string()))?;

        let memory = self
            .ctx
            .state
            .create_memory(
                &self.ctx.request,
                &MemoryCreate {
                    user_id: self.ctx.user_id,
                    assistant_id: Some(self.ctx.assistant_id.clone()),
                    text: text.to_string(),
                    memory_type,
                    importance,
                    embedding,
                },
            )
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        info!(
            memory_id = memory.id,
            user_id = self.ctx.user_id,
            "memory saved via tool"
        );
        Ok(format!("Saved memory #{}.", memory.id))
    }
}

impl MemorySearchTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for MemorySearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'query' is required"))?;

        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(self.ctx.settings.memory_retrieve_limit())
            .clamp(1, 50) as u32;

        let embedding = self
            .ctx
            .embedder
            .embed(query)
            .await
            .map_err(|e| ToolError::new(&self.name, ToolErrorCode::ApiError, e.to_string()))?;

        let hits = self
            .ctx
            .state
            .search_memories(
                &self.ctx.request,
                &MemorySearchRequest {
                    query: None,
                    embedding: Some(embedding),
                    user_id: self.ctx.user_id,
                    limit,
                    threshold: self.ctx.settings.memory_retrieve_threshold() as f32,
                },
            )
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        if hits.is_empty() {
            return Ok("No relevant memories found.".to_string());
        }
        let lines: Vec<String> = hits
            .iter()
            .map(|hit| {
                format!(
                    "- [{:?}, importance {}] {}",
                    hit.memory.memory_type, hit.memory.importance, hit.memory.text
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

fn parse_memory_type(raw: &str) -> Result<MemoryType, String> {
    match raw {
        "user_fact" => Ok(MemoryType::UserFact),
        "preference" => Ok(MemoryType::Preference),
        "event" => Ok(MemoryType::Event),
        "conversation_insight" => Ok(MemoryType::ConversationInsight),
        other => Err(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_parsing() {
        assert_eq!(parse_memory_type("preference").unwrap(), MemoryType::Preference);
        assert!(parse_memory_type("vibe").is_err());
    }
}
