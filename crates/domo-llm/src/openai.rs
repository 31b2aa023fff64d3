use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use domo_core::EventKind;

use crate::batch::{BatchProvider, BatchRequestItem, BatchResultItem, BatchStatus};
use crate::error::LlmError;
use crate::provider::{
    ChatMessage, ChatProvider, ChatRequest, ChatResponse, ChatRole, EmbeddingProvider,
    StopReason, ToolCallRequest,
};

/// OpenAI-compatible HTTP provider (chat, embeddings, batches).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            embedding_model: embedding_model.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5_000);
            return Err(LlmError::RateLimited { retry_after_ms });
        }
        if status >= 400 {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, body = %message, "LLM API error");
            return Err(LlmError::Api { status, message });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<Value, LlmError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError> {
        debug!(event = %EventKind::LlmCall, model = %req.model, messages = req.messages.len(), "sending chat request");

        let body = build_chat_body(req);
        let value = self.post("/v1/chat/completions", &body).await?;
        let api: ApiResponse =
            serde_json::from_value(value).map_err(|e| LlmError::Parse(e.to_string()))?;
        let response = parse_chat_response(api);

        debug!(
            event = %EventKind::LlmResponse,
            model = %response.model,
            tokens_in = response.tokens_in,
            tokens_out = response.tokens_out,
            tool_calls = response.tool_calls.len(),
            "chat response received"
        );
        Ok(response)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
        });
        let value = self.post("/v1/embeddings", &body).await?;
        let embedding = value
            .pointer("/data/0/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::Parse("embedding response missing data[0]".into()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        Ok(embedding)
    }
}

#[async_trait]
impl BatchProvider for OpenAiProvider {
    async fn submit_batch(&self, items: Vec<BatchRequestItem>) -> Result<String, LlmError> {
        let requests: Vec<Value> = items
            .iter()
            .map(|item| {
                serde_json::json!({
                    "custom_id": item.custom_id,
                    "body": build_chat_body(&item.request),
                })
            })
            .collect();
        let body = serde_json::json!({
            "endpoint": "/v1/chat/completions",
            "completion_window": "24h",
            "requests": requests,
        });
        let value = self.post("/v1/batches", &body).await?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| LlmError::Parse("batch response missing id".into()))
    }

    async fn poll_batch(&self, batch_id: &str) -> Result<BatchStatus, LlmError> {
        let value = self.get(&format!("/v1/batches/{batch_id}")).await?;
        let status = value.get("status").and_then(Value::as_str).unwrap_or("");
        Ok(match status {
            "completed" => BatchStatus::Completed,
            "failed" | "expired" | "cancelled" => BatchStatus::Failed {
                message: value
                    .pointer("/errors/0/message")
                    .and_then(Value::as_str)
                    .unwrap_or(status)
                    .to_string(),
            },
            _ => BatchStatus::InProgress,
        })
    }

    async fn collect_batch(&self, batch_id: &str) -> Result<Vec<BatchResultItem>, LlmError> {
        let value = self.get(&format!("/v1/batches/{batch_id}/results")).await?;
        let results = value
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::Parse("batch results missing array".into()))?;

        let mut items = Vec::with_capacity(results.len());
        for result in results {
            let custom_id = result
                .get("custom_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let content = result
                .pointer("/response/choices/0/message/content")
                .and_then(Value::as_str)
                .map(String::from);
            let error = result
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(String::from);
            items.push(BatchResultItem {
                custom_id,
                content,
                error,
            });
        }
        Ok(items)
    }
}

fn build_chat_body(req: &ChatRequest) -> Value {
    let messages: Vec<Value> = req.messages.iter().map(message_to_json).collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
    });
    if let Some(temperature) = req.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }
    body
}

fn message_to_json(msg: &ChatMessage) -> Value {
    match msg.role {
        ChatRole::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or_default(),
            "content": msg.content,
        }),
        ChatRole::Assistant if !msg.tool_calls.is_empty() => {
            let tool_calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                Value::String(msg.content.clone())
            };
            serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            })
        }
        _ => serde_json::json!({
            "role": msg.role,
            "content": msg.content,
        }),
    }
}

fn parse_chat_response(resp: ApiResponse) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let content = choice
        .as_ref()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or("")
        .to_string();

    let tool_calls: Vec<ToolCallRequest> = choice
        .as_ref()
        .and_then(|c| c.message.tool_calls.as_ref())
        .map(|calls| {
            calls
                .iter()
                .map(|tc| ToolCallRequest {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    // Arguments arrive as a JSON string; a model emitting
                    // malformed JSON becomes an empty object the schema
                    // validator will reject downstream.
                    arguments: serde_json::from_str(&tc.function.arguments)
                        .unwrap_or_else(|_| serde_json::json!({})),
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = choice
        .and_then(|c| c.finish_reason)
        .map(|r| StopReason::from_finish_reason(&r))
        .unwrap_or(StopReason::Other);

    ChatResponse {
        content,
        tool_calls,
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        stop_reason,
    }
}

// OpenAI-dialect response types.

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_serialize_in_openai_shape() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: vec![ToolCallRequest {
                id: "call_1".into(),
                name: "time".into(),
                arguments: serde_json::json!({"timezone": "UTC"}),
            }],
        };
        let json = message_to_json(&msg);
        assert_eq!(json["tool_calls"][0]["function"]["name"], "time");
        assert!(json["content"].is_null());
        // Arguments are a string on the wire.
        assert!(json["tool_calls"][0]["function"]["arguments"].is_string());
    }

    #[test]
    fn tool_response_serializes_with_call_id() {
        let msg = ChatMessage::tool("call_1", "12:00");
        let json = message_to_json(&msg);
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
    }

    #[test]
    fn parse_response_maps_tool_calls() {
        let api: ApiResponse = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "function": {"name": "time", "arguments": "{\"timezone\":\"UTC\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        }))
        .unwrap();

        let resp = parse_chat_response(api);
        assert!(resp.wants_tools());
        assert_eq!(resp.tool_calls[0].arguments["timezone"], "UTC");
        assert_eq!(resp.tokens_in, 10);
    }
}
