//! Delegation seam: runs a sub-assistant's graph for the `sub_assistant`
//! tool kind.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use domo_core::RequestContext;
use domo_graph::{ConversationGraph, GraphDeps, GraphMessage, GraphState, MemoryCheckpointer};
use domo_llm::{ChatProvider, EmbeddingProvider};
use domo_state::{StateCache, StateStoreClient};
use domo_tools::{build_tool_set, SubAssistantRunner, ToolContext, WebSearchConfig};

/// Builds and runs a fresh graph for the delegated assistant.
///
/// The delegate starts from an empty, non-persistent state (throwaway
/// in-memory checkpointer) and its tool set is built without a delegation
/// runner, so a sub-assistant cannot fan out further sub-assistants.
pub struct GraphSubRunner {
    pub state_client: Arc<StateStoreClient>,
    pub cache: Arc<StateCache>,
    pub chat: Arc<dyn ChatProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub summary_model: String,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
    pub web_search: Option<WebSearchConfig>,
    pub cancel: CancellationToken,
}

#[async_trait]
impl SubAssistantRunner for GraphSubRunner {
    async fn run_delegated(
        &self,
        ctx: &RequestContext,
        assistant_id: &str,
        user_id: i64,
        message: &str,
    ) -> Result<String, String> {
        let assistant = self
            .cache
            .assistant(ctx, assistant_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("sub-assistant {assistant_id} not found"))?;
        if !assistant.is_active {
            return Err(format!("sub-assistant {assistant_id} is inactive"));
        }

        let definitions = self
            .cache
            .assistant_tools(ctx, assistant_id)
            .await
            .map_err(|e| e.to_string())?;
        let settings = self
            .cache
            .global_settings(ctx)
            .await
            .map_err(|e| e.to_string())?;

        let tool_ctx = ToolContext {
            request: ctx.clone(),
            user_id,
            assistant_id: assistant_id.to_string(),
            user_timezone: None,
            state: Arc::clone(&self.state_client),
            embedder: Arc::clone(&self.embedder),
            settings: settings.clone(),
            web_search: self.web_search.clone(),
        };
        // No runner handed down: delegation is one level deep.
        let tools = build_tool_set(&definitions, &tool_ctx, None);

        let deps = GraphDeps {
            state_client: Arc::clone(&self.state_client),
            chat: Arc::clone(&self.chat),
            embedder: Arc::clone(&self.embedder),
            assistant,
            tools,
            settings,
            summary_model: self.summary_model.clone(),
            llm_timeout: self.llm_timeout,
            tool_timeout: self.tool_timeout,
            history_limit: domo_graph::graph::DEFAULT_HISTORY_LIMIT,
            cancel: self.cancel.clone(),
        };

        // Fresh ephemeral state: the delegate never sees the parent's
        // messages and leaves no checkpoint behind.
        let state = GraphState::seed(
            user_id,
            assistant_id,
            ctx.correlation_id.clone(),
            GraphMessage::human(message),
        );
        let graph = ConversationGraph::new(deps, Arc::new(MemoryCheckpointer::new()));
        let outcome = graph.run(state).await.map_err(|e| e.to_string())?;

        info!(
            delegate = %assistant_id,
            user_id,
            chars = outcome.final_text.len(),
            "sub-assistant run complete"
        );
        Ok(outcome.final_text)
    }
}
