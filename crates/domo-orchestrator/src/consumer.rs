use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use domo_core::config::{MAX_RETRIES, RETRY_DELAYS_SECS};
use domo_core::{ErrorKind, EventKind, RequestContext};
use domo_graph::{
    Checkpointer, ConversationGraph, GraphDeps, GraphMessage, GraphState, ThreadLocks,
};
use domo_llm::{ChatProvider, EmbeddingProvider, ToolCallRequest};
use domo_protocol::{AssistantResponse, DlqEntry, InboundEvent, Trigger};
use domo_state::models::{
    MessageCreate, MessageRole, MessageStatus, QueueDirection, QueueLogEntry,
};
use domo_state::{SecretaryDirectory, StateCache, StateStoreClient};
use domo_stream::{MessageStream, RetryCounter, StreamEntry};
use domo_tools::{build_tool_set, SubAssistantRunner, ToolContext, WebSearchConfig};

use crate::error::ProcessError;
use crate::sub_runner::GraphSubRunner;

/// Tunables resolved from config at startup.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub consumers: usize,
    pub read_block_ms: u64,
    pub idle_reclaim_ms: u64,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
    pub summary_model: String,
    pub stream_in_name: String,
    pub stream_out_name: String,
    pub web_search: Option<WebSearchConfig>,
}

/// Shared wiring for all consumer tasks.
pub struct OrchestratorDeps {
    pub inbound: Arc<dyn MessageStream>,
    pub outbound: Arc<dyn MessageStream>,
    pub retries: Arc<dyn RetryCounter>,
    pub state: Arc<StateStoreClient>,
    pub cache: Arc<StateCache>,
    pub secretaries: Arc<SecretaryDirectory>,
    pub chat: Arc<dyn ChatProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub checkpointer: Arc<dyn Checkpointer>,
    pub settings: OrchestratorSettings,
    pub cancel: CancellationToken,
}

pub struct Orchestrator {
    deps: Arc<OrchestratorDeps>,
    thread_locks: Arc<ThreadLocks>,
}

/// What `poll_once` did, mostly for tests and backoff decisions.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing available within the blocking window.
    Idle,
    /// An entry was handled to completion (acked).
    Processed,
    /// An entry failed; sleep this long before the next read.
    Failed { backoff: Duration },
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            thread_locks: Arc::new(ThreadLocks::new()),
        }
    }

    /// Spawn the configured number of consumer tasks and wait for them.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::with_capacity(self.deps.settings.consumers);
        for index in 0..self.deps.settings.consumers {
            let orchestrator = self.clone_for_task();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.consumer_loop(index, shutdown).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn clone_for_task(&self) -> Self {
        Self {
            deps: Arc::clone(&self.deps),
            thread_locks: Arc::clone(&self.thread_locks),
        }
    }

    async fn consumer_loop(&self, index: usize, mut shutdown: watch::Receiver<bool>) {
        info!(consumer = index, "consumer loop started");
        loop {
            tokio::select! {
                outcome = self.poll_once() => {
                    match outcome {
                        PollOutcome::Failed { backoff } => tokio::time::sleep(backoff).await,
                        PollOutcome::Idle | PollOutcome::Processed => {}
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(consumer = index, "consumer loop shutting down");
                        self.deps.cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    /// Read and handle at most one inbound entry.
    pub async fn poll_once(&self) -> PollOutcome {
        let entry = match self
            .deps
            .inbound
            .read(
                1,
                self.deps.settings.read_block_ms,
                self.deps.settings.idle_reclaim_ms,
            )
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                error!(error = %e, "inbound read failed, backing off");
                return PollOutcome::Failed {
                    backoff: Duration::from_secs(RETRY_DELAYS_SECS[0]),
                };
            }
        };
        self.process_entry(entry).await
    }

    async fn process_entry(&self, entry: StreamEntry) -> PollOutcome {
        let ctx = RequestContext::new_root();
        debug!(
            event = %EventKind::QueuePop,
            correlation_id = %ctx.correlation_id,
            message_id = %entry.id,
            "processing inbound entry"
        );

        let payload = entry.payload().unwrap_or_default().to_vec();
        self.log_queue(&ctx, QueueDirection::Inbound, "inbound", &payload, None)
            .await;

        // Parse failures are dead-lettered straight away: a payload that
        // does not validate will not validate on retry either.
        let event = match InboundEvent::from_json(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %entry.id, error = %e, "unparseable envelope");
                return self
                    .dead_letter(&ctx, &entry, &payload, &ProcessError::Envelope(e), None, 0)
                    .await;
            }
        };

        let ctx = ctx.with_user(event.user_id());
        match self.handle_event(&ctx, &event).await {
            Ok(final_text) => {
                let response =
                    AssistantResponse::success(event.user_id(), "assistant", final_text);
                if let Err(e) = self.emit_response(&ctx, &response).await {
                    // The turn ran but the reply could not be published:
                    // leave the entry pending so a retry re-delivers.
                    error!(message_id = %entry.id, error = %e, "failed to emit response");
                    return self.handle_failure(&ctx, &entry, &payload, &event, e).await;
                }
                if let Err(e) = self.deps.inbound.ack(&entry.id).await {
                    error!(message_id = %entry.id, error = %e, "ack failed, entry stays pending");
                    return PollOutcome::Failed {
                        backoff: Duration::from_secs(RETRY_DELAYS_SECS[0]),
                    };
                }
                let _ = self.deps.retries.clear(&entry.id).await;
                PollOutcome::Processed
            }
            Err(e) => self.handle_failure(&ctx, &entry, &payload, &event, e).await,
        }
    }

    /// Route one parsed event through the graph; returns the final text.
    async fn handle_event(
        &self,
        ctx: &RequestContext,
        event: &InboundEvent,
    ) -> Result<String, ProcessError> {
        let user_id = event.user_id();
        let secretary = self
            .deps
            .secretaries
            .resolve(ctx, user_id)
            .await?
            .filter(|assistant| assistant.is_active)
            .ok_or(ProcessError::NoSecretaryAssigned { user_id })?;
        let ctx = ctx.clone().with_assistant(secretary.id.clone());

        let definitions = self.deps.cache.assistant_tools(&ctx, &secretary.id).await?;
        let settings = self.deps.cache.global_settings(&ctx).await?;
        let user = self.deps.state.get_user(&ctx, user_id).await?;

        let tool_ctx = ToolContext {
            request: ctx.clone(),
            user_id,
            assistant_id: secretary.id.clone(),
            user_timezone: user.and_then(|u| u.timezone),
            state: Arc::clone(&self.deps.state),
            embedder: Arc::clone(&self.deps.embedder),
            settings: settings.clone(),
            web_search: self.deps.settings.web_search.clone(),
        };
        let sub_runner: Arc<dyn SubAssistantRunner> = Arc::new(GraphSubRunner {
            state_client: Arc::clone(&self.deps.state),
            cache: Arc::clone(&self.deps.cache),
            chat: Arc::clone(&self.deps.chat),
            embedder: Arc::clone(&self.deps.embedder),
            summary_model: self.deps.settings.summary_model.clone(),
            llm_timeout: self.deps.settings.llm_timeout,
            tool_timeout: self.deps.settings.tool_timeout,
            web_search: self.deps.settings.web_search.clone(),
            cancel: self.deps.cancel.clone(),
        });
        let tools = build_tool_set(&definitions, &tool_ctx, Some(sub_runner));

        let state = match event {
            InboundEvent::UserMessage(msg) => {
                // Persist the inbound turn first; its id anchors the
                // status bookkeeping in finalize.
                let stored = self
                    .deps
                    .state
                    .create_message(
                        &ctx,
                        &MessageCreate {
                            user_id,
                            assistant_id: secretary.id.clone(),
                            role: MessageRole::Human,
                            content: msg.content.clone(),
                            tool_call_id: None,
                            tool_calls: None,
                            status: MessageStatus::Pending,
                        },
                    )
                    .await?;
                let mut state = GraphState::seed(
                    user_id,
                    secretary.id.clone(),
                    ctx.correlation_id.clone(),
                    GraphMessage::Human {
                        content: msg.content.clone(),
                        db_id: Some(stored.id),
                    },
                );
                state.initial_message_id = Some(stored.id);
                state
            }
            InboundEvent::Trigger(trigger) => {
                let (request_turn, response_turn) = synthesize_trigger_turn(trigger);
                let mut state = GraphState::seed(
                    user_id,
                    secretary.id.clone(),
                    ctx.correlation_id.clone(),
                    request_turn,
                );
                state.messages.push(response_turn);
                state.triggering_event = Some(trigger.clone());
                state
            }
        };

        let deps = GraphDeps {
            state_client: Arc::clone(&self.deps.state),
            chat: Arc::clone(&self.deps.chat),
            embedder: Arc::clone(&self.deps.embedder),
            assistant: secretary,
            tools,
            settings,
            summary_model: self.deps.settings.summary_model.clone(),
            llm_timeout: self.deps.settings.llm_timeout,
            tool_timeout: self.deps.settings.tool_timeout,
            history_limit: domo_graph::graph::DEFAULT_HISTORY_LIMIT,
            cancel: self.deps.cancel.clone(),
        };

        // One run per thread at a time; the broker's single-claim already
        // makes cross-process collisions rare, this closes the in-process
        // window.
        let thread_id = state.thread_id();
        let _guard = self.thread_locks.acquire(&thread_id).await;

        let graph = ConversationGraph::new(deps, Arc::clone(&self.deps.checkpointer));
        let outcome = graph.run(state).await?;
        Ok(outcome.final_text)
    }

    /// Apply the failure policy for one entry.
    async fn handle_failure(
        &self,
        ctx: &RequestContext,
        entry: &StreamEntry,
        payload: &[u8],
        event: &InboundEvent,
        error: ProcessError,
    ) -> PollOutcome {
        let kind = error.kind();
        warn!(
            event = %EventKind::Error,
            correlation_id = %ctx.correlation_id,
            message_id = %entry.id,
            error = %error,
            kind = %kind,
            "processing failed"
        );

        // Cooperative shutdown: leave the entry pending, untouched — the
        // next process instance reclaims it with its counter intact.
        if kind == ErrorKind::Cancelled {
            return PollOutcome::Failed {
                backoff: Duration::ZERO,
            };
        }

        // Non-retryable failures skip the counter dance entirely.
        if !kind.is_retryable() {
            let count = self.deps.retries.get(&entry.id).await.unwrap_or(0);
            return self
                .dead_letter(ctx, entry, payload, &error, Some(event.user_id()), count)
                .await;
        }

        let count = match self.deps.retries.incr(&entry.id).await {
            Ok(count) => count,
            Err(e) => {
                error!(message_id = %entry.id, error = %e, "retry counter unavailable");
                return PollOutcome::Failed {
                    backoff: Duration::from_secs(RETRY_DELAYS_SECS[0]),
                };
            }
        };

        // A reducer-invariant abort gets a single retry, everything else
        // the full budget.
        let budget = if kind == ErrorKind::GraphInvariant {
            2
        } else {
            MAX_RETRIES
        };
        if count >= budget {
            return self
                .dead_letter(ctx, entry, payload, &error, Some(event.user_id()), count)
                .await;
        }

        // Leave the entry pending; another consumer reclaims it after the
        // idle timeout. The delay is only a hint for this consumer's next
        // read.
        let delay_index =
            (count as usize).saturating_sub(1).min(RETRY_DELAYS_SECS.len() - 1);
        let delay = RETRY_DELAYS_SECS[delay_index];
        debug!(
            message_id = %entry.id,
            attempt = count,
            delay_secs = delay,
            "leaving entry pending for retry"
        );
        PollOutcome::Failed {
            backoff: Duration::from_secs(delay),
        }
    }

    /// DLQ + error response + ack + counter clear, in that order. A DLQ
    /// append failure leaves the entry pending (no ack) so nothing is
    /// lost.
    async fn dead_letter(
        &self,
        ctx: &RequestContext,
        entry: &StreamEntry,
        payload: &[u8],
        error: &ProcessError,
        user_id: Option<i64>,
        retry_count: u32,
    ) -> PollOutcome {
        let dlq_entry = DlqEntry::new(
            payload.to_vec(),
            entry.id.clone(),
            error.error_type(),
            &error.to_string(),
            retry_count,
            Utc::now(),
            user_id,
        );
        if let Err(e) = self.deps.inbound.send_to_dlq(dlq_entry).await {
            error!(message_id = %entry.id, error = %e, "DLQ append failed, entry stays pending");
            return PollOutcome::Failed {
                backoff: Duration::from_secs(RETRY_DELAYS_SECS[0]),
            };
        }

        // Tell the front-end the turn failed so the user is not left
        // hanging.
        if let Some(user_id) = user_id {
            let response = AssistantResponse::error(user_id, "Processing failed, please retry.");
            if let Err(e) = self.emit_response(ctx, &response).await {
                warn!(user_id, error = %e, "failed to emit error response");
            }
        }

        if let Err(e) = self.deps.inbound.ack(&entry.id).await {
            error!(message_id = %entry.id, error = %e, "ack after DLQ failed");
        }
        let _ = self.deps.retries.clear(&entry.id).await;
        info!(
            message_id = %entry.id,
            error_type = error.error_type(),
            retry_count,
            "entry dead-lettered"
        );
        PollOutcome::Processed
    }

    /// Append a response to `stream_out`, retrying transient failures
    /// inline. The outbound stream has no DLQ by design.
    async fn emit_response(
        &self,
        ctx: &RequestContext,
        response: &AssistantResponse,
    ) -> Result<(), ProcessError> {
        let payload = response
            .to_json()
            .map_err(ProcessError::Envelope)?
            .into_bytes();

        for attempt in 1..=MAX_RETRIES {
            match self.deps.outbound.add(&payload).await {
                Ok(id) => {
                    debug!(
                        event = %EventKind::QueuePush,
                        correlation_id = %ctx.correlation_id,
                        entry_id = %id,
                        user_id = response.user_id,
                        status = ?response.status,
                        "response emitted"
                    );
                    self.log_queue(
                        ctx,
                        QueueDirection::Outbound,
                        "response",
                        &payload,
                        Some(response.user_id),
                    )
                    .await;
                    return Ok(());
                }
                Err(e) if attempt == MAX_RETRIES => return Err(e.into()),
                Err(e) => {
                    warn!(attempt, error = %e, "outbound append failed");
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
        }
        unreachable!("outbound retry loop always returns")
    }

    async fn log_queue(
        &self,
        ctx: &RequestContext,
        direction: QueueDirection,
        message_type: &str,
        payload: &[u8],
        user_id: Option<i64>,
    ) {
        let queue_name = match direction {
            QueueDirection::Inbound => self.deps.settings.stream_in_name.clone(),
            QueueDirection::Outbound => self.deps.settings.stream_out_name.clone(),
        };
        self.deps
            .state
            .log_queue_message(
                ctx,
                &QueueLogEntry {
                    queue_name,
                    direction,
                    message_type: message_type.to_string(),
                    payload: String::from_utf8_lossy(payload).into_owned(),
                    correlation_id: Some(ctx.correlation_id.clone()),
                    user_id: user_id.or(ctx.user_id),
                    source: None,
                },
            )
            .await;
    }
}

/// Render a trigger as a tool-style turn: an assistant tool request plus
/// its response describing the fired event. The pair form keeps the
/// reducer's invariants intact while telling the model, in the voice it
/// expects tool output in, that something happened on the user's behalf.
fn synthesize_trigger_turn(trigger: &Trigger) -> (GraphMessage, GraphMessage) {
    let call_id = format!("trigger_{}", uuid::Uuid::new_v4().simple());
    let description = match serde_json::to_string_pretty(&trigger.payload) {
        Ok(json) => format!(
            "A scheduled event fired for this user ({:?}, source {:?}):\n{}\n\
             Compose a helpful message to the user about it.",
            trigger.trigger_type, trigger.source, json
        ),
        Err(_) => "A scheduled event fired for this user.".to_string(),
    };
    (
        GraphMessage::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: call_id.clone(),
                name: "scheduled_trigger".to_string(),
                arguments: trigger.payload.clone(),
            }],
            db_id: None,
        },
        GraphMessage::ToolResponse {
            tool_call_id: call_id,
            content: description,
            db_id: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domo_protocol::{EventSource, TriggerType};

    #[test]
    fn trigger_turn_is_a_valid_tool_pair() {
        let trigger = Trigger {
            trigger_type: TriggerType::ReminderTriggered,
            user_id: 7,
            source: EventSource::Cron,
            payload: serde_json::json!({"reminder_id": "r-1"}),
            timestamp: Utc::now(),
        };
        let (request_turn, response_turn) = synthesize_trigger_turn(&trigger);

        // The reducer must keep the pair intact.
        let outcome = domo_graph::reducer::reduce(&[], vec![request_turn, response_turn]);
        assert_eq!(outcome.dropped_orphans, 0);
        assert!(!outcome.trailing_orphan);
        assert_eq!(outcome.messages.len(), 2);
        assert!(outcome.messages[1].content().contains("r-1"));
    }
}
