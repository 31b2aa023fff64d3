use std::sync::Arc;

use domo_core::RequestContext;
use domo_llm::EmbeddingProvider;
use domo_state::models::GlobalSettings;
use domo_state::StateStoreClient;

/// External web-search endpoint settings. Absent config makes the
/// `web_search` tool fail with `CONFIGURATION_ERROR` instead of at build
/// time — other tools on the same assistant keep working.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Per-invocation binding handed to every tool: who is asking, which
/// assistant they are talking to, and the clients tools reach through.
#[derive(Clone)]
pub struct ToolContext {
    pub request: RequestContext,
    pub user_id: i64,
    pub assistant_id: String,
    /// User's IANA timezone, when known. The `time` tool and reminder
    /// rendering default to it.
    pub user_timezone: Option<String>,
    pub state: Arc<StateStoreClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub settings: GlobalSettings,
    pub web_search: Option<WebSearchConfig>,
}

impl ToolContext {
    pub fn thread_label(&self) -> String {
        format!("user_{}_assistant_{}", self.user_id, self.assistant_id)
    }
}
