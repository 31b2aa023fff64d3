//! Finalize: persistence bookkeeping after the conversational part of the
//! run is done. Side effects only — the message list is not touched.

use tracing::{info, warn};

use domo_core::RequestContext;
use domo_state::models::{MessageStatus, MessageUpdate};

use crate::graph::GraphDeps;
use crate::state::GraphState;

/// Link newly summarized rows to the summary that covers them and settle
/// the inbound message's status. Failures here degrade bookkeeping, not
/// the user-visible turn, so they are logged and swallowed.
pub async fn finalize_processing(deps: &GraphDeps, ctx: &RequestContext, state: &mut GraphState) {
    if !state.newly_summarized_message_ids.is_empty() {
        match deps
            .state_client
            .get_latest_summary(ctx, state.user_id, &state.assistant_id)
            .await
        {
            Ok(Some(summary)) => {
                let mut updated = 0usize;
                for &message_id in &state.newly_summarized_message_ids {
                    let update = MessageUpdate {
                        status: Some(MessageStatus::Summarized),
                        summary_id: Some(summary.id),
                    };
                    match deps.state_client.update_message(ctx, message_id, &update).await {
                        Ok(()) => updated += 1,
                        Err(e) => {
                            warn!(message_id, error = %e, "failed to mark message summarized")
                        }
                    }
                }
                info!(
                    updated,
                    total = state.newly_summarized_message_ids.len(),
                    summary_id = summary.id,
                    "linked summarized messages"
                );
            }
            Ok(None) => {
                warn!("no latest summary found while finalizing summarized messages");
            }
            Err(e) => {
                warn!(error = %e, "failed to load latest summary during finalize");
            }
        }
    }

    if let Some(message_id) = state.initial_message_id {
        let status = if state.error_occurred {
            MessageStatus::Error
        } else {
            MessageStatus::Processed
        };
        let update = MessageUpdate {
            status: Some(status),
            summary_id: None,
        };
        if let Err(e) = deps.state_client.update_message(ctx, message_id, &update).await {
            warn!(
                message_id,
                status = ?status,
                error = %e,
                "failed to update inbound message status"
            );
        }
    }
}
