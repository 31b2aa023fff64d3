//! Context-budget enforcement: the summarization predicate and the
//! guaranteed truncation pass that runs before every assistant call.

use tracing::{debug, warn};

use crate::graph::GraphDeps;
use crate::message::GraphMessage;
use crate::state::GraphState;
use crate::tokens;

/// True when history should be compressed before the next LLM call:
/// either the token estimate crossed `context_size × summarize_ratio`, or
/// too many persisted messages accumulated since the last summary.
pub fn should_summarize(deps: &GraphDeps, state: &GraphState) -> bool {
    let threshold =
        (deps.assistant.llm_context_size as f64 * deps.settings.summarize_ratio()) as u32;
    if state.current_token_count > threshold {
        debug!(
            tokens = state.current_token_count,
            threshold, "summarization triggered by token count"
        );
        return true;
    }
    let since_summary = state.persisted_message_count() as u64;
    if since_summary > deps.settings.messages_since_summary_limit() {
        debug!(
            messages = since_summary,
            limit = deps.settings.messages_since_summary_limit(),
            "summarization triggered by message count"
        );
        return true;
    }
    false
}

/// Hard guarantee: the LLM input fits `llm_context_size`. Truncates whole
/// blocks from the oldest end — never the retained summary, never the
/// newest message, and never half of a tool request/response pair.
pub fn ensure_context_limit(deps: &GraphDeps, state: &mut GraphState) {
    let budget = deps.assistant.llm_context_size;
    state.current_token_count = tokens::estimate_state(state);
    if state.current_token_count <= budget {
        return;
    }

    let mut removed = 0usize;
    while state.current_token_count > budget {
        let Some((start, end)) = oldest_removable_block(&state.messages) else {
            warn!(
                tokens = state.current_token_count,
                budget, "context still over budget but nothing left to truncate"
            );
            break;
        };
        removed += end - start;
        state.messages.drain(start..end);
        state.current_token_count = tokens::estimate_state(state);
    }

    if removed > 0 {
        warn!(
            removed,
            tokens = state.current_token_count,
            budget,
            "truncated oldest messages to fit context budget"
        );
    }
}

/// The oldest block eligible for truncation, as `[start, end)`.
///
/// A block is one message, extended over the following tool responses
/// when it is an assistant turn with tool calls — the pair always moves
/// together. The leading summary and the final message are untouchable.
fn oldest_removable_block(messages: &[GraphMessage]) -> Option<(usize, usize)> {
    let start = match messages.first() {
        Some(GraphMessage::HistorySummary { .. }) => 1,
        _ => 0,
    };
    if start >= messages.len().saturating_sub(1) {
        return None;
    }

    let mut end = start + 1;
    if matches!(&messages[start], GraphMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty())
    {
        while end < messages.len() && matches!(messages[end], GraphMessage::ToolResponse { .. }) {
            end += 1;
        }
    }

    // Never remove the newest message (the turn being processed).
    if end >= messages.len() {
        return None;
    }
    Some((start, end))
}
