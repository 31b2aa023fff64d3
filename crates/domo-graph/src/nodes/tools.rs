//! The tools node — execute the latest assistant turn's tool calls.

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use domo_core::{EventKind, RequestContext};
use domo_llm::ToolCallRequest;
use domo_state::models::{MessageCreate, MessageRole, MessageStatus};

use crate::error::Result;
use crate::graph::{merge_delta, GraphDeps};
use crate::message::GraphMessage;
use crate::state::GraphState;

/// Concurrent tool executions per turn.
const MAX_CONCURRENT_TOOLS: usize = 4;

/// Execute every requested call with bounded fan-out and merge the
/// responses in call order. A failing or timed-out tool produces an
/// error-text response — the LLM sees it and may recover; the graph never
/// aborts on tool failures.
pub async fn run_tools(
    deps: &GraphDeps,
    ctx: &RequestContext,
    state: &mut GraphState,
    calls: &[ToolCallRequest],
) -> Result<()> {
    let results: Vec<(String, String)> = stream::iter(calls.iter().cloned())
        .map(|call| async move {
            debug!(
                event = %EventKind::ToolCall,
                correlation_id = %ctx.correlation_id,
                tool = %call.name,
                call_id = %call.id,
                "executing tool"
            );
            let executed =
                tokio::time::timeout(deps.tool_timeout, deps.tools.execute(&call.name, &call.arguments))
                    .await;
            let content = match executed {
                Ok(Ok(text)) => text,
                Ok(Err(tool_err)) => {
                    warn!(
                        tool = %call.name,
                        call_id = %call.id,
                        error = %tool_err,
                        "tool execution failed"
                    );
                    tool_err.as_tool_response()
                }
                Err(_) => {
                    warn!(
                        tool = %call.name,
                        call_id = %call.id,
                        timeout_secs = deps.tool_timeout.as_secs(),
                        "tool execution timed out"
                    );
                    format!(
                        "Tool '{}' timed out after {}s",
                        call.name,
                        deps.tool_timeout.as_secs()
                    )
                }
            };
            debug!(
                event = %EventKind::ToolResult,
                correlation_id = %ctx.correlation_id,
                tool = %call.name,
                call_id = %call.id,
                bytes = content.len(),
                "tool finished"
            );
            (call.id, content)
        })
        // buffered (not buffer_unordered): responses come back in the same
        // order as the tool_calls, as the pair invariant expects.
        .buffered(MAX_CONCURRENT_TOOLS)
        .collect()
        .await;

    let mut delta = Vec::with_capacity(results.len());
    for (call_id, content) in results {
        let stored = deps
            .state_client
            .create_message(
                ctx,
                &MessageCreate {
                    user_id: state.user_id,
                    assistant_id: state.assistant_id.clone(),
                    role: MessageRole::ToolResponse,
                    content: content.clone(),
                    tool_call_id: Some(call_id.clone()),
                    tool_calls: None,
                    status: MessageStatus::Processed,
                },
            )
            .await?;
        delta.push(GraphMessage::ToolResponse {
            tool_call_id: call_id,
            content,
            db_id: Some(stored.id),
        });
    }

    merge_delta(state, delta)
}
