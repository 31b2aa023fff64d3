//! The assistant node — one LLM call with the bound tool set.

use tracing::debug;

use domo_core::{EventKind, RequestContext};
use domo_llm::{ChatMessage, ChatRequest, ChatResponse};
use domo_state::models::{MessageCreate, MessageRole, MessageStatus};

use crate::error::{GraphError, Result};
use crate::graph::{merge_delta, GraphDeps};
use crate::message::GraphMessage;
use crate::state::GraphState;

/// Invoke the LLM with the current context. The produced assistant turn
/// (text or tool request) is persisted and merged into the state; the raw
/// response is returned so the driver can route on `wants_tools`.
pub async fn run_assistant(
    deps: &GraphDeps,
    ctx: &RequestContext,
    state: &mut GraphState,
) -> Result<ChatResponse> {
    let request = build_request(deps, state);
    debug!(
        event = %EventKind::LlmCall,
        correlation_id = %ctx.correlation_id,
        model = %request.model,
        messages = request.messages.len(),
        tools = request.tools.len(),
        "assistant node calling LLM"
    );

    let chat = deps.chat.chat(&request);
    let response = tokio::select! {
        result = tokio::time::timeout(deps.llm_timeout, chat) => {
            result.map_err(|_| GraphError::AssistantTimeout {
                secs: deps.llm_timeout.as_secs(),
            })??
        }
        _ = deps.cancel.cancelled() => return Err(GraphError::Cancelled),
    };

    // Persist the turn before merging so the working message carries its
    // row id (summarization and pair checks key off db ids).
    let tool_calls_json = if response.tool_calls.is_empty() {
        None
    } else {
        Some(serde_json::to_value(&response.tool_calls).unwrap_or_default())
    };
    let stored = deps
        .state_client
        .create_message(
            ctx,
            &MessageCreate {
                user_id: state.user_id,
                assistant_id: state.assistant_id.clone(),
                role: MessageRole::Assistant,
                content: response.content.clone(),
                tool_call_id: None,
                tool_calls: tool_calls_json,
                status: MessageStatus::Processed,
            },
        )
        .await?;

    merge_delta(
        state,
        vec![GraphMessage::Assistant {
            content: response.content.clone(),
            tool_calls: response.tool_calls.clone(),
            db_id: Some(stored.id),
        }],
    )?;

    Ok(response)
}

/// Assemble the provider request: system prompt, facts block, then the
/// working message list (summary renders as a system message up front).
fn build_request(deps: &GraphDeps, state: &GraphState) -> ChatRequest {
    let mut messages: Vec<ChatMessage> =
        Vec::with_capacity(state.messages.len() + 2);
    messages.push(ChatMessage::system(state.system_prompt.clone()));
    if let Some(ref facts) = state.user_facts_block {
        messages.push(ChatMessage::system(facts.clone()));
    }
    messages.extend(state.messages.iter().map(|m| m.to_chat_message()));

    ChatRequest::new(deps.assistant.model.clone(), messages).with_tools(deps.tools.specs())
}
