use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use domo_core::RequestContext;
use domo_llm::{ChatProvider, EmbeddingProvider};
use domo_state::models::{Assistant, GlobalSettings};
use domo_state::StateStoreClient;
use domo_tools::ToolSet;

use crate::checkpoint::Checkpointer;
use crate::error::{GraphError, Result};
use crate::nodes;
use crate::reducer::reduce;
use crate::state::GraphState;
use crate::tokens;
use crate::GraphMessage;

/// Upper bound on assistant ↔ tools rounds in one run. A model stuck in a
/// tool loop ends the turn with whatever text it produced last.
pub const MAX_ROUNDS: usize = 10;

/// Past messages loaded into context per run.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Everything one graph run needs, bound per invocation.
pub struct GraphDeps {
    pub state_client: Arc<StateStoreClient>,
    pub chat: Arc<dyn ChatProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub assistant: Assistant,
    pub tools: ToolSet,
    pub settings: GlobalSettings,
    /// Model used by the summarizer node (typically cheaper than the
    /// assistant's own).
    pub summary_model: String,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
    pub history_limit: u32,
    pub cancel: CancellationToken,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct GraphOutcome {
    /// The assistant's final text for the user.
    pub final_text: String,
    pub state: GraphState,
}

/// The compiled conversation state machine.
pub struct ConversationGraph {
    deps: GraphDeps,
    checkpointer: Arc<dyn Checkpointer>,
}

impl ConversationGraph {
    pub fn new(deps: GraphDeps, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self { deps, checkpointer }
    }

    /// Run the graph to completion for one inbound event.
    ///
    /// `finalize_processing` runs on success AND on node failure (with the
    /// error flag set), so the inbound message's status always settles.
    /// After a clean finish the thread's checkpoint is cleared; a failed
    /// run keeps it for the retry.
    pub async fn run(&self, mut state: GraphState) -> Result<GraphOutcome> {
        let thread_id = state.thread_id();
        let ctx = RequestContext::from_correlation_id(state.correlation_id.clone())
            .with_user(state.user_id)
            .with_assistant(state.assistant_id.clone());

        match self.drive(&ctx, &thread_id, &mut state).await {
            Ok(final_text) => {
                nodes::finalize::finalize_processing(&self.deps, &ctx, &mut state).await;
                self.checkpointer.clear(&thread_id).await;
                info!(
                    thread_id = %thread_id,
                    tokens = state.current_token_count,
                    "graph run complete"
                );
                Ok(GraphOutcome { final_text, state })
            }
            Err(GraphError::Cancelled) => {
                // Shutdown mid-run: touch nothing, the entry will be
                // redelivered and reprocessed from scratch.
                self.checkpointer.save(&thread_id, &state).await;
                Err(GraphError::Cancelled)
            }
            Err(e) => {
                state.error_occurred = true;
                nodes::finalize::finalize_processing(&self.deps, &ctx, &mut state).await;
                self.checkpointer.save(&thread_id, &state).await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        state: &mut GraphState,
    ) -> Result<String> {
        // Preamble: context assembly, run once per invocation.
        nodes::load::init_state(&self.deps, state);
        nodes::load::load_context(&self.deps, ctx, state).await?;
        nodes::memories::retrieve_memories(&self.deps, ctx, state).await;
        nodes::memories::load_user_facts(state);
        self.checkpointer.save(thread_id, state).await;

        let mut rounds = 0usize;
        loop {
            if self.deps.cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            rounds += 1;
            if rounds > MAX_ROUNDS {
                warn!(thread_id = %thread_id, rounds, "tool loop hit maximum rounds");
                return Ok(String::new());
            }

            // should_summarize → summarize_history | ensure_context_limit
            if nodes::limit::should_summarize(&self.deps, state) {
                nodes::summarize::summarize_history(&self.deps, ctx, state).await?;
                self.checkpointer.save(thread_id, state).await;
            }
            nodes::limit::ensure_context_limit(&self.deps, state);

            let response = nodes::assistant::run_assistant(&self.deps, ctx, state).await?;
            self.checkpointer.save(thread_id, state).await;

            if response.wants_tools() {
                nodes::tools::run_tools(&self.deps, ctx, state, &response.tool_calls).await?;
                self.checkpointer.save(thread_id, state).await;
                // Loop back through the summary check (long tool outputs
                // can blow the context on their own).
                continue;
            }

            return Ok(response.content);
        }
    }
}

/// Merge a node's message delta into the state through the reducer.
///
/// A trailing orphan tool response is unrecoverable mid-turn state and
/// aborts the run; older orphans are dropped with a warning inside the
/// reducer.
pub(crate) fn merge_delta(state: &mut GraphState, delta: Vec<GraphMessage>) -> Result<()> {
    let outcome = reduce(&state.messages, delta);
    if outcome.trailing_orphan {
        return Err(GraphError::Invariant(
            "trailing orphan tool response after merge".to_string(),
        ));
    }
    if outcome.dropped_orphans > 0 {
        debug!(dropped = outcome.dropped_orphans, "reducer dropped orphan tool responses");
    }
    state.messages = outcome.messages;
    state.current_token_count = tokens::estimate_state(state);
    Ok(())
}

/// Rebuild the full message list (used when history must precede the
/// already-present incoming turn).
pub(crate) fn rebuild_messages(state: &mut GraphState, full: Vec<GraphMessage>) -> Result<()> {
    state.messages.clear();
    merge_delta(state, full)
}
