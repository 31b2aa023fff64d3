//! Rough token accounting for context-limit decisions.
//!
//! A real tokenizer is overkill here: the limit check only needs to be
//! conservative and monotone in text length. The estimate is chars/4
//! plus a fixed per-message overhead for role and framing tokens.

use crate::message::GraphMessage;
use crate::state::GraphState;

/// Framing overhead per message (role markers, separators).
const PER_MESSAGE_OVERHEAD: u32 = 4;
/// Estimated tokens per tool call entry beyond its serialized arguments.
const PER_TOOL_CALL_OVERHEAD: u32 = 8;

pub fn estimate_text(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

pub fn estimate_message(msg: &GraphMessage) -> u32 {
    let mut tokens = estimate_text(msg.content()) + PER_MESSAGE_OVERHEAD;
    if let GraphMessage::Assistant { tool_calls, .. } = msg {
        for call in tool_calls {
            tokens += PER_TOOL_CALL_OVERHEAD
                + estimate_text(&call.name)
                + estimate_text(&call.arguments.to_string());
        }
    }
    tokens
}

/// Total estimate for everything the assistant node would send: system
/// prompt, facts block, and the working message list.
pub fn estimate_state(state: &GraphState) -> u32 {
    let mut total = estimate_text(&state.system_prompt) + PER_MESSAGE_OVERHEAD;
    if let Some(ref facts) = state.user_facts_block {
        total += estimate_text(facts) + PER_MESSAGE_OVERHEAD;
    }
    total += state.messages.iter().map(estimate_message).sum::<u32>();
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_grows_with_length() {
        let short = GraphMessage::human("hi");
        let long = GraphMessage::human("hello ".repeat(100));
        assert!(estimate_message(&long) > estimate_message(&short));
    }

    #[test]
    fn tool_calls_add_overhead() {
        let plain = GraphMessage::assistant("ok");
        let with_call = GraphMessage::Assistant {
            content: "ok".into(),
            tool_calls: vec![domo_llm::ToolCallRequest {
                id: "call_1".into(),
                name: "time".into(),
                arguments: serde_json::json!({"timezone": "UTC"}),
            }],
            db_id: None,
        };
        assert!(estimate_message(&with_call) > estimate_message(&plain));
    }
}
