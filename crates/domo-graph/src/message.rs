use serde::{Deserialize, Serialize};
use serde_json::Value;

use domo_llm::{ChatMessage, ToolCallRequest};
use domo_state::models::{MessageRole, StoredMessage};

/// One entry in the working conversation, as a closed sum — the reducer
/// matches on variants, never on runtime names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphMessage {
    /// Rendered assistant instructions. Never survives the reducer; the
    /// assistant node injects instructions from state instead.
    SystemPrompt { content: String },
    /// Rendered user-fact block. Same lifecycle as `SystemPrompt`.
    UserFacts { content: String },
    /// Compressed history prefix. At most one, always first.
    HistorySummary { content: String },
    Human {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        db_id: Option<i64>,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        db_id: Option<i64>,
    },
    ToolResponse {
        tool_call_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        db_id: Option<i64>,
    },
}

impl GraphMessage {
    pub fn human(content: impl Into<String>) -> Self {
        GraphMessage::Human {
            content: content.into(),
            db_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        GraphMessage::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
            db_id: None,
        }
    }

    pub fn tool_response(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        GraphMessage::ToolResponse {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            db_id: None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            GraphMessage::SystemPrompt { content }
            | GraphMessage::UserFacts { content }
            | GraphMessage::HistorySummary { content }
            | GraphMessage::Human { content, .. }
            | GraphMessage::Assistant { content, .. }
            | GraphMessage::ToolResponse { content, .. } => content,
        }
    }

    /// Persisted-row id, for messages loaded from or written to storage.
    pub fn db_id(&self) -> Option<i64> {
        match self {
            GraphMessage::Human { db_id, .. }
            | GraphMessage::Assistant { db_id, .. }
            | GraphMessage::ToolResponse { db_id, .. } => *db_id,
            _ => None,
        }
    }

    /// Whether an assistant turn's tool_calls contain `tool_call_id`.
    pub fn calls_tool(&self, tool_call_id: &str) -> bool {
        matches!(
            self,
            GraphMessage::Assistant { tool_calls, .. }
                if tool_calls.iter().any(|tc| tc.id == tool_call_id)
        )
    }

    /// Convert to the provider wire shape. Summary and system variants
    /// render as system messages.
    pub fn to_chat_message(&self) -> ChatMessage {
        match self {
            GraphMessage::SystemPrompt { content } | GraphMessage::UserFacts { content } => {
                ChatMessage::system(content.clone())
            }
            GraphMessage::HistorySummary { content } => {
                ChatMessage::system(format!("Summary of the earlier conversation:\n{content}"))
            }
            GraphMessage::Human { content, .. } => ChatMessage::user(content.clone()),
            GraphMessage::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut msg = ChatMessage::assistant(content.clone());
                msg.tool_calls = tool_calls.clone();
                msg
            }
            GraphMessage::ToolResponse {
                tool_call_id,
                content,
                ..
            } => ChatMessage::tool(tool_call_id.clone(), content.clone()),
        }
    }

    /// Convert a persisted row into its working-set form.
    ///
    /// `tool_request` rows (assistant turns that requested tools) map to
    /// `Assistant` with their recorded tool_calls so the pair invariant can
    /// be checked against reloaded history.
    pub fn from_stored(stored: &StoredMessage) -> Self {
        match stored.role {
            MessageRole::Human => GraphMessage::Human {
                content: stored.content.clone(),
                db_id: Some(stored.id),
            },
            MessageRole::Assistant | MessageRole::ToolRequest => GraphMessage::Assistant {
                content: stored.content.clone(),
                tool_calls: parse_tool_calls(stored.tool_calls.as_ref()),
                db_id: Some(stored.id),
            },
            MessageRole::ToolResponse => GraphMessage::ToolResponse {
                tool_call_id: stored.tool_call_id.clone().unwrap_or_default(),
                content: stored.content.clone(),
                db_id: Some(stored.id),
            },
        }
    }
}

fn parse_tool_calls(raw: Option<&Value>) -> Vec<ToolCallRequest> {
    raw.and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}
