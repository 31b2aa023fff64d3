use serde::{Deserialize, Serialize};

use domo_protocol::Trigger;
use domo_state::models::{MemorySearchHit, UserFact};

use crate::message::GraphMessage;

/// Per-invocation working state. Built by the orchestrator, mutated by the
/// nodes, persisted after every step by the checkpointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphState {
    /// Working conversation, maintained exclusively through the reducer.
    pub messages: Vec<GraphMessage>,
    pub user_id: i64,
    pub assistant_id: String,
    pub correlation_id: String,
    /// Persisted row id of the inbound human message, when there is one
    /// (triggers have none). Finalize flips its status.
    pub initial_message_id: Option<i64>,
    /// Rendered assistant instructions; injected by the assistant node,
    /// never carried inside `messages`.
    pub system_prompt: String,
    /// Rendered user-facts / relevant-memories block, same lifecycle.
    pub user_facts_block: Option<String>,
    pub current_summary_text: Option<String>,
    /// Exclusive lower bound of already-summarized history.
    pub last_summary_covered_id: Option<i64>,
    #[serde(default)]
    pub pending_facts: Vec<UserFact>,
    #[serde(default, skip_serializing, skip_deserializing)]
    pub relevant_memories: Vec<MemorySearchHit>,
    pub current_token_count: u32,
    #[serde(default)]
    pub newly_summarized_message_ids: Vec<i64>,
    pub triggering_event: Option<Trigger>,
    pub error_occurred: bool,
}

impl GraphState {
    /// Seed state for one run. `messages` starts with the incoming turn;
    /// history is loaded in front of it by `load_context`.
    pub fn seed(
        user_id: i64,
        assistant_id: impl Into<String>,
        correlation_id: impl Into<String>,
        incoming: GraphMessage,
    ) -> Self {
        Self {
            messages: vec![incoming],
            user_id,
            assistant_id: assistant_id.into(),
            correlation_id: correlation_id.into(),
            initial_message_id: None,
            system_prompt: String::new(),
            user_facts_block: None,
            current_summary_text: None,
            last_summary_covered_id: None,
            pending_facts: Vec::new(),
            relevant_memories: Vec::new(),
            current_token_count: 0,
            newly_summarized_message_ids: Vec::new(),
            triggering_event: None,
            error_occurred: false,
        }
    }

    pub fn thread_id(&self) -> String {
        format!("user_{}_assistant_{}", self.user_id, self.assistant_id)
    }

    /// Text of the newest human turn, used for memory retrieval.
    pub fn latest_human_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            GraphMessage::Human { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Count of persisted (db-backed) messages currently in the working
    /// set — the "messages since last summary" signal.
    pub fn persisted_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.db_id().is_some()).count()
    }
}
