//! `web_search` tool — query an external search API and return a short
//! result digest.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ToolError, ToolErrorCode};
use crate::{AssistantTool, ToolContext, WebSearchConfig};

/// Results beyond this count add tokens without adding signal.
const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    name: String,
    description: String,
    config: Option<WebSearchConfig>,
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(name: &str, description: &str, ctx: &ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            config: ctx.web_search.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl AssistantTool for WebSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let Some(ref config) = self.config else {
            return Err(ToolError::new(
                &self.name,
                ToolErrorCode::ConfigurationError,
                "web search endpoint is not configured",
            ));
        };

        let query = args
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'query' is required"))?;

        let resp = self
            .client
            .post(format!("{}/search", config.base_url.trim_end_matches('/')))
            .bearer_auth(&config.api_key)
            .json(&serde_json::json!({ "query": query, "max_results": MAX_RESULTS }))
            .send()
            .await
            .map_err(|e| ToolError::new(&self.name, ToolErrorCode::NetworkError, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(ToolError::new(
                &self.name,
                ToolErrorCode::ApiError,
                format!("search API returned {status}"),
            ));
        }

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::new(&self.name, ToolErrorCode::ApiError, e.to_string()))?;

        if body.results.is_empty() {
            return Ok("No results found.".to_string());
        }
        let lines: Vec<String> = body
            .results
            .iter()
            .take(MAX_RESULTS)
            .map(|r| format!("- {} — {}\n  {}", r.title, r.url, r.snippet))
            .collect();
        Ok(lines.join("\n"))
    }
}
