//! History summarization: compress the oldest persisted block into a new
//! summary row and a single in-context summary message.

use tracing::{info, warn};

use domo_core::RequestContext;
use domo_llm::{ChatMessage, ChatRequest};
use domo_state::models::SummaryCreate;

use crate::error::{GraphError, Result};
use crate::graph::{rebuild_messages, GraphDeps};
use crate::message::GraphMessage;
use crate::state::GraphState;

/// Recent persisted messages kept verbatim out of any summary block.
const KEEP_RECENT: usize = 6;

const SUMMARIZER_INSTRUCTIONS: &str = "You summarize assistant conversations. \
Produce a compact third-person summary of the dialogue below, preserving: \
user requests and decisions, commitments the assistant made, names, dates, \
and unresolved threads. Fold the previous summary in when one is given. \
Respond with the summary text only.";

pub async fn summarize_history(
    deps: &GraphDeps,
    ctx: &RequestContext,
    state: &mut GraphState,
) -> Result<()> {
    let Some((block_end, covered_ids)) = summarizable_block(state) else {
        return Ok(());
    };
    let last_covered = *covered_ids.iter().max().unwrap_or(&0);

    // Render the block (and the previous summary, for continuity).
    let mut transcript = String::new();
    if let Some(ref previous) = state.current_summary_text {
        transcript.push_str(&format!("Previous summary:\n{previous}\n\n"));
    }
    transcript.push_str("Conversation to fold in:\n");
    for msg in &state.messages[..block_end] {
        let line = match msg {
            GraphMessage::Human { content, .. } => format!("USER: {content}\n"),
            GraphMessage::Assistant { content, .. } if !content.is_empty() => {
                format!("ASSISTANT: {content}\n")
            }
            GraphMessage::ToolResponse { content, .. } => format!("TOOL: {content}\n"),
            _ => String::new(),
        };
        transcript.push_str(&line);
    }

    let request = ChatRequest::new(
        deps.summary_model.clone(),
        vec![
            ChatMessage::system(SUMMARIZER_INSTRUCTIONS),
            ChatMessage::user(transcript),
        ],
    );
    let response = tokio::time::timeout(deps.llm_timeout, deps.chat.chat(&request))
        .await
        .map_err(|_| GraphError::AssistantTimeout {
            secs: deps.llm_timeout.as_secs(),
        })??;
    let summary_text = response.content.trim().to_string();
    if summary_text.is_empty() {
        warn!("summarizer returned empty text, skipping summarization");
        return Ok(());
    }

    // Persist first: monotonicity of last_message_id_covered comes from
    // covering only ids above the previous watermark.
    let created = deps
        .state_client
        .create_summary(
            ctx,
            &SummaryCreate {
                user_id: state.user_id,
                assistant_id: state.assistant_id.clone(),
                summary_text: summary_text.clone(),
                last_message_id_covered: last_covered,
            },
        )
        .await?;

    // Replace the block with a single summary message.
    let mut rebuilt = vec![GraphMessage::HistorySummary {
        content: summary_text.clone(),
    }];
    rebuilt.extend(state.messages[block_end..].iter().cloned());
    rebuild_messages(state, rebuilt)?;

    state.current_summary_text = Some(summary_text);
    state.last_summary_covered_id = Some(last_covered);
    state.newly_summarized_message_ids.extend(covered_ids);

    info!(
        summary_id = created.id,
        last_covered,
        summarized = state.newly_summarized_message_ids.len(),
        "history summarized"
    );
    Ok(())
}

/// The prefix of the message list to fold into a summary.
///
/// Returns `(block_end, covered_db_ids)`. The block is the oldest run of
/// persisted messages, leaving the newest [`KEEP_RECENT`] persisted
/// messages (and the in-flight turn) untouched, and never ending between
/// an assistant tool request and its responses.
fn summarizable_block(state: &GraphState) -> Option<(usize, Vec<i64>)> {
    let skip_summary = matches!(
        state.messages.first(),
        Some(GraphMessage::HistorySummary { .. })
    );
    let start = usize::from(skip_summary);

    let persisted_total = state.persisted_message_count();
    if persisted_total <= KEEP_RECENT {
        return None;
    }
    let mut budget = persisted_total - KEEP_RECENT;

    let mut end = start;
    let mut covered: Vec<i64> = Vec::new();
    for (i, msg) in state.messages.iter().enumerate().skip(start) {
        if budget == 0 {
            break;
        }
        let Some(db_id) = msg.db_id() else {
            break; // reached the unpersisted tail of the current turn
        };
        if Some(db_id) == state.initial_message_id {
            break; // never summarize the message being processed
        }
        covered.push(db_id);
        budget -= 1;
        end = i + 1;
    }

    // Don't split an assistant tool request from its responses: extend
    // over any responses that directly follow the block.
    while end < state.messages.len() {
        match &state.messages[end] {
            GraphMessage::ToolResponse { db_id, .. } => {
                if let Some(id) = db_id {
                    covered.push(*id);
                }
                end += 1;
            }
            _ => break,
        }
    }

    if covered.is_empty() || end <= start {
        None
    } else {
        Some((end, covered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persisted_human(id: i64) -> GraphMessage {
        GraphMessage::Human {
            content: format!("msg {id}"),
            db_id: Some(id),
        }
    }

    fn state_with_history(n: i64) -> GraphState {
        let mut state = GraphState::seed(1, "sec", "corr", GraphMessage::human("incoming"));
        let mut full: Vec<GraphMessage> = (1..=n).map(persisted_human).collect();
        full.append(&mut state.messages);
        state.messages = full;
        state
    }

    #[test]
    fn short_history_yields_no_block() {
        let state = state_with_history(4);
        assert!(summarizable_block(&state).is_none());
    }

    #[test]
    fn block_leaves_recent_messages() {
        let state = state_with_history(10);
        let (end, covered) = summarizable_block(&state).unwrap();
        assert_eq!(end, 4); // 10 persisted - KEEP_RECENT
        assert_eq!(covered, vec![1, 2, 3, 4]);
    }

    #[test]
    fn block_never_covers_the_initial_message() {
        let mut state = state_with_history(10);
        state.initial_message_id = Some(3);
        let (_, covered) = summarizable_block(&state).unwrap();
        assert!(!covered.contains(&3));
    }

    #[test]
    fn block_extends_over_adjacent_tool_responses() {
        let mut state = GraphState::seed(1, "sec", "corr", GraphMessage::human("incoming"));
        let mut full: Vec<GraphMessage> = (1..=7).map(persisted_human).collect();
        full.push(GraphMessage::Assistant {
            content: String::new(),
            tool_calls: vec![domo_llm::ToolCallRequest {
                id: "call_1".into(),
                name: "time".into(),
                arguments: serde_json::json!({}),
            }],
            db_id: Some(8),
        });
        full.push(GraphMessage::ToolResponse {
            tool_call_id: "call_1".into(),
            content: "12:00".into(),
            db_id: Some(9),
        });
        full.append(&mut state.messages);
        state.messages = full;

        // 9 persisted, KEEP_RECENT leaves 3 to cover (ids 1..=3); no tool
        // boundary is crossed so the block ends cleanly.
        let (end, covered) = summarizable_block(&state).unwrap();
        assert_eq!(covered, vec![1, 2, 3]);
        assert_eq!(end, 3);
    }
}
