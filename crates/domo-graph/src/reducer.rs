//! The message reducer — merges a node's proposed delta into the working
//! list while enforcing the conversation invariants:
//!
//! 1. `SystemPrompt` and `UserFacts` variants never survive the merge;
//!    dedicated state fields carry them and the assistant node re-injects.
//! 2. At most one `HistorySummary` (first wins), always moved to the front.
//! 3. Every `ToolResponse` must immediately follow an assistant turn whose
//!    tool_calls contain its id; orphans are dropped with a warning.
//! 4. An orphan `ToolResponse` in trailing position means a tool result
//!    went missing mid-turn — reported as critical for the caller to abort.
//!
//! The function is pure and idempotent: reducing its own output with an
//! empty delta returns the same list.

use tracing::{debug, error, warn};

use crate::message::GraphMessage;

/// Result of one merge.
#[derive(Debug)]
pub struct ReduceOutcome {
    pub messages: Vec<GraphMessage>,
    /// Number of orphaned tool responses that were dropped.
    pub dropped_orphans: usize,
    /// The last message was an orphaned tool response — an unrecoverable
    /// mid-turn inconsistency.
    pub trailing_orphan: bool,
}

pub fn reduce(current: &[GraphMessage], delta: Vec<GraphMessage>) -> ReduceOutcome {
    let mut combined: Vec<GraphMessage> = Vec::with_capacity(current.len() + delta.len());
    combined.extend_from_slice(current);
    combined.extend(delta);

    // Pass 1: strip system variants, keep the first summary.
    let mut summary: Option<GraphMessage> = None;
    let mut kept: Vec<GraphMessage> = Vec::with_capacity(combined.len());
    for msg in combined {
        match msg {
            GraphMessage::SystemPrompt { .. } => {
                debug!("reducer: discarding system prompt from message list");
            }
            GraphMessage::UserFacts { .. } => {
                debug!("reducer: discarding user facts from message list");
            }
            GraphMessage::HistorySummary { .. } => {
                if summary.is_none() {
                    summary = Some(msg);
                } else {
                    warn!("reducer: discarding extra history summary");
                }
            }
            other => kept.push(other),
        }
    }

    // Pass 2: trailing-orphan check before filtering, so the caller can
    // distinguish "stale orphan dropped" from "this turn's result missing".
    let trailing_orphan = match kept.last() {
        Some(GraphMessage::ToolResponse { tool_call_id, .. }) => {
            let paired = block_is_paired(&kept, tool_call_id);
            if !paired {
                error!(
                    tool_call_id = %tool_call_id,
                    "reducer: last message is an orphaned tool response"
                );
            }
            !paired
        }
        _ => false,
    };

    // Pass 3: validate the assistant → tool_response pairing, dropping
    // orphans. One assistant turn may fan out several calls, so responses
    // form a contiguous block after it; each response is checked against
    // the assistant turn that heads its block.
    let mut validated: Vec<GraphMessage> = Vec::with_capacity(kept.len());
    let mut dropped_orphans = 0usize;
    for msg in kept {
        match &msg {
            GraphMessage::ToolResponse { tool_call_id, .. } => {
                let paired = validated
                    .iter()
                    .rev()
                    .find(|m| !matches!(m, GraphMessage::ToolResponse { .. }))
                    .map(|head| head.calls_tool(tool_call_id))
                    .unwrap_or(false);
                if paired {
                    validated.push(msg);
                } else {
                    warn!(
                        tool_call_id = %tool_call_id,
                        "reducer: dropping orphaned tool response"
                    );
                    dropped_orphans += 1;
                }
            }
            _ => validated.push(msg),
        }
    }

    // Pass 4: retained summary goes first.
    let mut messages = Vec::with_capacity(validated.len() + 1);
    if let Some(summary) = summary {
        messages.push(summary);
    }
    messages.extend(validated);

    ReduceOutcome {
        messages,
        dropped_orphans,
        trailing_orphan,
    }
}

/// Whether the trailing tool-response block in `messages` is headed by an
/// assistant turn whose tool_calls include `tool_call_id`.
fn block_is_paired(messages: &[GraphMessage], tool_call_id: &str) -> bool {
    messages
        .iter()
        .rev()
        .find(|m| !matches!(m, GraphMessage::ToolResponse { .. }))
        .map(|head| head.calls_tool(tool_call_id))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domo_llm::ToolCallRequest;

    fn assistant_calling(id: &str) -> GraphMessage {
        GraphMessage::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: id.into(),
                name: "time".into(),
                arguments: serde_json::json!({}),
            }],
            db_id: None,
        }
    }

    #[test]
    fn system_variants_are_stripped() {
        let outcome = reduce(
            &[],
            vec![
                GraphMessage::SystemPrompt {
                    content: "be nice".into(),
                },
                GraphMessage::UserFacts {
                    content: "likes tea".into(),
                },
                GraphMessage::human("hello"),
            ],
        );
        assert_eq!(outcome.messages.len(), 1);
        assert!(matches!(outcome.messages[0], GraphMessage::Human { .. }));
    }

    #[test]
    fn only_first_summary_survives_and_moves_to_front() {
        let outcome = reduce(
            &[GraphMessage::human("hi")],
            vec![
                GraphMessage::HistorySummary {
                    content: "first".into(),
                },
                GraphMessage::HistorySummary {
                    content: "second".into(),
                },
            ],
        );
        assert_eq!(outcome.messages.len(), 2);
        match &outcome.messages[0] {
            GraphMessage::HistorySummary { content } => assert_eq!(content, "first"),
            other => panic!("summary not first: {other:?}"),
        }
    }

    #[test]
    fn orphan_at_head_is_dropped_and_order_is_kept() {
        // Scenario S6: a tool response with no preceding assistant call.
        let outcome = reduce(
            &[],
            vec![
                GraphMessage::tool_response("call_x", "stale"),
                GraphMessage::human("first"),
                GraphMessage::assistant("second"),
            ],
        );
        assert_eq!(outcome.dropped_orphans, 1);
        assert!(!outcome.trailing_orphan);
        let kinds: Vec<&str> = outcome
            .messages
            .iter()
            .map(|m| match m {
                GraphMessage::Human { .. } => "human",
                GraphMessage::Assistant { .. } => "assistant",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["human", "assistant"]);
    }

    #[test]
    fn paired_tool_response_is_kept() {
        let outcome = reduce(
            &[],
            vec![
                GraphMessage::human("what time is it"),
                assistant_calling("call_1"),
                GraphMessage::tool_response("call_1", "12:00"),
                GraphMessage::assistant("It's noon."),
            ],
        );
        assert_eq!(outcome.dropped_orphans, 0);
        assert_eq!(outcome.messages.len(), 4);
    }

    #[test]
    fn parallel_tool_responses_all_survive() {
        let fan_out = GraphMessage::Assistant {
            content: String::new(),
            tool_calls: vec![
                ToolCallRequest {
                    id: "call_a".into(),
                    name: "time".into(),
                    arguments: serde_json::json!({}),
                },
                ToolCallRequest {
                    id: "call_b".into(),
                    name: "reminder_list".into(),
                    arguments: serde_json::json!({}),
                },
            ],
            db_id: None,
        };
        let outcome = reduce(
            &[],
            vec![
                fan_out,
                GraphMessage::tool_response("call_a", "12:00"),
                GraphMessage::tool_response("call_b", "no reminders"),
            ],
        );
        assert_eq!(outcome.dropped_orphans, 0);
        assert!(!outcome.trailing_orphan);
        assert_eq!(outcome.messages.len(), 3);
    }

    #[test]
    fn mismatched_call_id_is_an_orphan() {
        let outcome = reduce(
            &[],
            vec![
                assistant_calling("call_1"),
                GraphMessage::tool_response("call_other", "?"),
            ],
        );
        assert_eq!(outcome.dropped_orphans, 1);
        assert!(outcome.trailing_orphan);
    }

    #[test]
    fn trailing_orphan_is_flagged() {
        let outcome = reduce(
            &[GraphMessage::human("hi")],
            vec![GraphMessage::tool_response("call_9", "lost")],
        );
        assert!(outcome.trailing_orphan);
        assert_eq!(outcome.dropped_orphans, 1);
    }

    #[test]
    fn reduce_is_idempotent() {
        let delta = vec![
            GraphMessage::HistorySummary {
                content: "sum".into(),
            },
            GraphMessage::human("q"),
            assistant_calling("call_1"),
            GraphMessage::tool_response("call_1", "a"),
            GraphMessage::tool_response("call_zzz", "orphan"),
        ];
        let once = reduce(&[], delta);
        let twice = reduce(&once.messages, vec![]);
        let a = serde_json::to_string(&once.messages).unwrap();
        let b = serde_json::to_string(&twice.messages).unwrap();
        assert_eq!(a, b);
        assert_eq!(twice.dropped_orphans, 0);
    }
}
