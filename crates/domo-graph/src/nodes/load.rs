//! Context assembly: system prompt, persisted history, user facts.

use tracing::{info, warn};

use domo_core::RequestContext;
use domo_state::models::{MessageQuery, MessageStatus};

use crate::error::Result;
use crate::graph::{rebuild_messages, GraphDeps};
use crate::message::GraphMessage;
use crate::state::GraphState;

/// Ensure the rendered assistant instructions are bound to the state. The
/// prompt lives in a dedicated field, not the message list — the reducer
/// strips system prompts from merges, and the assistant node re-injects.
pub fn init_state(deps: &GraphDeps, state: &mut GraphState) {
    if state.system_prompt.is_empty() {
        state.system_prompt = deps.assistant.instructions.clone();
    }
}

/// Load summary, post-summary history, and user facts; rebuild the message
/// list as summary → history → incoming turn.
pub async fn load_context(
    deps: &GraphDeps,
    ctx: &RequestContext,
    state: &mut GraphState,
) -> Result<()> {
    let summary = deps
        .state_client
        .get_latest_summary(ctx, state.user_id, &state.assistant_id)
        .await?;

    let mut query = MessageQuery {
        user_id: state.user_id,
        assistant_id: state.assistant_id.clone(),
        status: Some(MessageStatus::Processed),
        id_gt: None,
        limit: Some(deps.history_limit),
    };

    let mut delta: Vec<GraphMessage> = Vec::new();
    if let Some(ref summary) = summary {
        query.id_gt = Some(summary.last_message_id_covered);
        state.current_summary_text = Some(summary.summary_text.clone());
        state.last_summary_covered_id = Some(summary.last_message_id_covered);
        delta.push(GraphMessage::HistorySummary {
            content: summary.summary_text.clone(),
        });
    }

    let history = deps.state_client.list_messages(ctx, &query).await?;
    let history_len = history.len();
    delta.extend(history.iter().map(GraphMessage::from_stored));

    // The incoming turn (and anything else already in the state, e.g. a
    // checkpoint restore) goes after history.
    delta.append(&mut state.messages);

    // User facts are auxiliary context: a failed load degrades the turn,
    // it does not fail it.
    match deps.state_client.get_user_facts(ctx, state.user_id).await {
        Ok(facts) => state.pending_facts = facts,
        Err(e) => {
            warn!(user_id = state.user_id, error = %e, "failed to load user facts");
            state.pending_facts = Vec::new();
        }
    }

    rebuild_messages(state, delta)?;
    info!(
        user_id = state.user_id,
        assistant_id = %state.assistant_id,
        history = history_len,
        facts = state.pending_facts.len(),
        has_summary = summary.is_some(),
        "context loaded"
    );
    Ok(())
}
