//! Memory retrieval and the user-facts context block.

use tracing::{debug, warn};

use domo_core::RequestContext;
use domo_state::models::MemorySearchRequest;

use crate::graph::GraphDeps;
use crate::state::GraphState;
use crate::tokens;

/// Fetch memories similar to the incoming text. Retrieval is best-effort:
/// any failure leaves the turn running with no memories.
pub async fn retrieve_memories(deps: &GraphDeps, ctx: &RequestContext, state: &mut GraphState) {
    let Some(text) = state.latest_human_text().map(String::from) else {
        return;
    };

    let embedding = match deps.embedder.embed(&text).await {
        Ok(embedding) => embedding,
        Err(e) => {
            warn!(error = %e, "memory retrieval: embedding failed");
            return;
        }
    };

    let request = MemorySearchRequest {
        query: None,
        embedding: Some(embedding),
        user_id: state.user_id,
        limit: deps.settings.memory_retrieve_limit() as u32,
        threshold: deps.settings.memory_retrieve_threshold() as f32,
    };
    match deps.state_client.search_memories(ctx, &request).await {
        Ok(hits) => {
            debug!(count = hits.len(), "memories retrieved");
            state.relevant_memories = hits;
        }
        Err(e) => {
            warn!(error = %e, "memory retrieval failed, continuing without");
            state.relevant_memories = Vec::new();
        }
    }
}

/// Render facts and retrieved memories into the single context block the
/// assistant node injects right after the system prompt. Any previous
/// block is replaced wholesale.
pub fn load_user_facts(state: &mut GraphState) {
    let mut sections: Vec<String> = Vec::new();

    if !state.pending_facts.is_empty() {
        let mut block = String::from("Known facts about the user:\n");
        for fact in &state.pending_facts {
            block.push_str(&format!("- {}\n", fact.fact));
        }
        sections.push(block);
    }

    if !state.relevant_memories.is_empty() {
        let mut block = String::from("Relevant memories:\n");
        for hit in &state.relevant_memories {
            block.push_str(&format!(
                "- [{:?}] {}\n",
                hit.memory.memory_type, hit.memory.text
            ));
        }
        sections.push(block);
    }

    state.user_facts_block = if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n"))
    };
    state.current_token_count = tokens::estimate_state(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::GraphMessage;
    use domo_state::models::UserFact;

    #[test]
    fn facts_block_is_rebuilt_not_appended() {
        let mut state = GraphState::seed(1, "sec", "corr", GraphMessage::human("hi"));
        state.pending_facts = vec![UserFact {
            id: 1,
            user_id: 1,
            fact: "prefers metric units".into(),
        }];

        load_user_facts(&mut state);
        let first = state.user_facts_block.clone().unwrap();
        assert!(first.contains("metric"));

        // Re-running with different facts replaces the block.
        state.pending_facts = vec![UserFact {
            id: 2,
            user_id: 1,
            fact: "lives in Lisbon".into(),
        }];
        load_user_facts(&mut state);
        let second = state.user_facts_block.unwrap();
        assert!(second.contains("Lisbon"));
        assert!(!second.contains("metric"));
    }

    #[test]
    fn no_facts_means_no_block() {
        let mut state = GraphState::seed(1, "sec", "corr", GraphMessage::human("hi"));
        load_user_facts(&mut state);
        assert!(state.user_facts_block.is_none());
    }
}
