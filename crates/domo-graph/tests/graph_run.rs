// End-to-end graph runs against a scripted LLM and a stubbed state store.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use domo_graph::{ConversationGraph, GraphDeps, GraphMessage, GraphState, MemoryCheckpointer};
use domo_llm::testing::{HashEmbedder, ScriptedProvider};
use domo_state::models::{Assistant, GlobalSettings, ToolDefinition, ToolKind};
use domo_state::StateStoreClient;
use domo_tools::{build_tool_set, ToolContext};

/// Mints ids for POST /api/messages and echoes the body back as the
/// created row.
struct CreateMessageResponder {
    next_id: AtomicI64,
}

impl Respond for CreateMessageResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        body["id"] = serde_json::json!(id);
        body["summary_id"] = serde_json::Value::Null;
        body["timestamp"] = serde_json::json!("2025-01-01T00:00:00Z");
        ResponseTemplate::new(200).set_body_json(body)
    }
}

struct CreateSummaryResponder;

impl Respond for CreateSummaryResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        body["id"] = serde_json::json!(900);
        body["created_at"] = serde_json::json!("2025-01-01T00:00:00Z");
        ResponseTemplate::new(200).set_body_json(body)
    }
}

async fn mount_state_store(server: &MockServer, history: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/user-summaries/latest"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(history))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/users/\d+/facts$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/memory/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/messages"))
        .respond_with(CreateMessageResponder {
            next_id: AtomicI64::new(100),
        })
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/user-summaries"))
        .respond_with(CreateSummaryResponder)
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path_regex(r"^/api/messages/\d+$"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/checkpoints/.+$"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

fn test_assistant(context_size: u32) -> Assistant {
    Assistant {
        id: "sec-1".into(),
        name: "Secretary".into(),
        is_secretary: true,
        model: "gpt-4o".into(),
        instructions: "You are the user's secretary.".into(),
        tool_ids: vec![],
        is_active: true,
        llm_context_size: context_size,
    }
}

fn time_tool_definition() -> ToolDefinition {
    ToolDefinition {
        id: "def-time".into(),
        name: "time".into(),
        kind: ToolKind::Time,
        description: "Current time".into(),
        input_schema: r#"{"type":"object","properties":{"timezone":{"type":"string"}},"additionalProperties":false}"#.into(),
        delegate_assistant_id: None,
        is_active: true,
    }
}

fn deps_for(
    server: &MockServer,
    provider: Arc<ScriptedProvider>,
    assistant: Assistant,
    settings: GlobalSettings,
    with_time_tool: bool,
) -> GraphDeps {
    let state_client = Arc::new(StateStoreClient::new(server.uri(), 5).unwrap());
    let embedder = Arc::new(HashEmbedder::new(8));
    let tool_ctx = ToolContext {
        request: domo_core::RequestContext::new_root(),
        user_id: 42,
        assistant_id: assistant.id.clone(),
        user_timezone: None,
        state: Arc::clone(&state_client),
        embedder: embedder.clone(),
        settings: settings.clone(),
        web_search: None,
    };
    let definitions = if with_time_tool {
        vec![time_tool_definition()]
    } else {
        vec![]
    };
    let tools = build_tool_set(&definitions, &tool_ctx, None);

    GraphDeps {
        state_client,
        chat: provider,
        embedder,
        assistant,
        tools,
        settings,
        summary_model: "gpt-4o-mini".into(),
        llm_timeout: Duration::from_secs(5),
        tool_timeout: Duration::from_secs(5),
        history_limit: 50,
        cancel: CancellationToken::new(),
    }
}

fn seed_state() -> GraphState {
    let mut state = GraphState::seed(
        42,
        "sec-1",
        "corr-test",
        GraphMessage::Human {
            content: "what time is it".into(),
            db_id: Some(99),
        },
    );
    state.initial_message_id = Some(99);
    state
}

#[tokio::test]
async fn happy_turn_produces_final_text_and_marks_processed() {
    let server = MockServer::start().await;
    mount_state_store(&server, serde_json::json!([])).await;

    let provider = Arc::new(ScriptedProvider::new().then_text("Hello there."));
    let deps = deps_for(
        &server,
        Arc::clone(&provider),
        test_assistant(16_384),
        GlobalSettings::default(),
        false,
    );
    let graph = ConversationGraph::new(deps, Arc::new(MemoryCheckpointer::new()));

    let outcome = graph.run(seed_state()).await.unwrap();
    assert_eq!(outcome.final_text, "Hello there.");

    // The assistant turn was persisted, and the inbound row was settled.
    let requests = server.received_requests().await.unwrap();
    let creates: Vec<_> = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/api/messages")
        .collect();
    assert_eq!(creates.len(), 1);
    let patched = requests
        .iter()
        .any(|r| r.method.as_str() == "PATCH" && r.url.path() == "/api/messages/99");
    assert!(patched, "inbound message status must be updated");
}

#[tokio::test]
async fn tool_round_persists_request_response_and_final_text() {
    // Scenario: LLM asks for the `time` tool, then answers with text.
    let server = MockServer::start().await;
    mount_state_store(&server, serde_json::json!([])).await;

    let provider = Arc::new(
        ScriptedProvider::new()
            .then_tool_call("call_1", "time", serde_json::json!({"timezone": "UTC"}))
            .then_text("It is noon."),
    );
    let deps = deps_for(
        &server,
        Arc::clone(&provider),
        test_assistant(16_384),
        GlobalSettings::default(),
        true,
    );
    let graph = ConversationGraph::new(deps, Arc::new(MemoryCheckpointer::new()));

    let outcome = graph.run(seed_state()).await.unwrap();
    assert_eq!(outcome.final_text, "It is noon.");
    assert_eq!(provider.calls_made(), 2);

    // Persisted rows: assistant-with-tool_calls, tool_response, final assistant.
    let requests = server.received_requests().await.unwrap();
    let create_bodies: Vec<serde_json::Value> = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/api/messages")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(create_bodies.len(), 3);
    assert_eq!(create_bodies[0]["role"], "assistant");
    assert_eq!(create_bodies[0]["tool_calls"][0]["id"], "call_1");
    assert_eq!(create_bodies[1]["role"], "tool_response");
    assert_eq!(create_bodies[1]["tool_call_id"], "call_1");
    assert!(create_bodies[1]["content"].as_str().unwrap().contains("UTC"));
    assert_eq!(create_bodies[2]["role"], "assistant");
    assert_eq!(create_bodies[2]["content"], "It is noon.");

    // The second LLM request carried the tool response back to the model.
    let second = &provider.requests()[1];
    assert!(second
        .messages
        .iter()
        .any(|m| m.tool_call_id.as_deref() == Some("call_1")));
}

#[tokio::test]
async fn oversized_history_is_truncated_without_splitting_pairs() {
    // Scenario: history greatly exceeds the context budget; the LLM input
    // must fit and no tool pair may be split.
    let big = "word ".repeat(300);
    let mut rows = Vec::new();
    let mut id = 1;
    for pair in 0..10 {
        rows.push(serde_json::json!({
            "id": id, "user_id": 42, "assistant_id": "sec-1", "role": "assistant",
            "content": big, "tool_calls": [{"id": format!("call_{pair}"), "name": "time", "arguments": {}}],
            "status": "processed", "timestamp": "2025-01-01T00:00:00Z"
        }));
        id += 1;
        rows.push(serde_json::json!({
            "id": id, "user_id": 42, "assistant_id": "sec-1", "role": "tool_response",
            "content": big, "tool_call_id": format!("call_{pair}"),
            "status": "processed", "timestamp": "2025-01-01T00:00:00Z"
        }));
        id += 1;
    }

    let server = MockServer::start().await;
    mount_state_store(&server, serde_json::Value::Array(rows)).await;

    let provider = Arc::new(ScriptedProvider::new().then_text("ok"));
    // Tiny budget, but summarization disabled via a huge message limit so
    // truncation is the only lever.
    let settings: GlobalSettings = serde_json::from_value(serde_json::json!({
        "messages_since_summary_limit": 10_000,
        "summarize_ratio": 100.0,
    }))
    .unwrap();
    let deps = deps_for(
        &server,
        Arc::clone(&provider),
        test_assistant(600),
        settings,
        false,
    );
    let graph = ConversationGraph::new(deps, Arc::new(MemoryCheckpointer::new()));

    let outcome = graph.run(seed_state()).await.unwrap();
    assert_eq!(outcome.final_text, "ok");

    let request = &provider.requests()[0];
    // No split pairs: every tool message is directly preceded by an
    // assistant message carrying its call id.
    for (i, msg) in request.messages.iter().enumerate() {
        if let Some(ref call_id) = msg.tool_call_id {
            let head = request.messages[..i]
                .iter()
                .rev()
                .find(|m| m.tool_call_id.is_none());
            let paired = head
                .map(|m| m.tool_calls.iter().any(|tc| &tc.id == call_id))
                .unwrap_or(false);
            assert!(paired, "tool message {call_id} lost its request");
        }
    }
    // The estimate the graph enforces is conservative; the request itself
    // must be far below the untruncated ~15k tokens.
    let total_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
    assert!(
        total_chars / 4 < 1_200,
        "history was not truncated (chars={total_chars})"
    );
}

/// First call (history load) sees no summary; once one was created,
/// later calls (finalize) see it.
struct LatestSummarySequence {
    calls: AtomicI64,
}

impl Respond for LatestSummarySequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            ResponseTemplate::new(404)
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 900, "user_id": 42, "assistant_id": "sec-1",
                "summary_text": "User and assistant discussed forty topics.",
                "last_message_id_covered": 35,
                "created_at": "2025-01-01T00:00:00Z"
            }))
        }
    }
}

#[tokio::test]
async fn long_history_triggers_summarization() {
    let mut rows = Vec::new();
    for id in 1..=40 {
        rows.push(serde_json::json!({
            "id": id, "user_id": 42, "assistant_id": "sec-1",
            "role": if id % 2 == 0 { "assistant" } else { "human" },
            "content": format!("turn {id}"),
            "status": "processed", "timestamp": "2025-01-01T00:00:00Z"
        }));
    }

    let server = MockServer::start().await;
    mount_state_store(&server, serde_json::Value::Array(rows)).await;
    Mock::given(method("GET"))
        .and(path("/api/user-summaries/latest"))
        .respond_with(LatestSummarySequence {
            calls: AtomicI64::new(0),
        })
        .with_priority(1)
        .mount(&server)
        .await;

    // First scripted response answers the summarizer, second the user.
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_text("User and assistant discussed forty topics.")
            .then_text("final answer"),
    );
    let deps = deps_for(
        &server,
        Arc::clone(&provider),
        test_assistant(16_384),
        GlobalSettings::default(),
        false,
    );
    let graph = ConversationGraph::new(deps, Arc::new(MemoryCheckpointer::new()));

    let outcome = graph.run(seed_state()).await.unwrap();
    assert_eq!(outcome.final_text, "final answer");

    // A summary row was created covering the oldest block…
    let requests = server.received_requests().await.unwrap();
    let summary_posts: Vec<serde_json::Value> = requests
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/api/user-summaries")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(summary_posts.len(), 1);
    let covered = summary_posts[0]["last_message_id_covered"].as_i64().unwrap();
    assert!(covered > 0 && covered < 40);

    // …covered messages were linked to it…
    let summarize_patches = requests
        .iter()
        .filter(|r| {
            r.method.as_str() == "PATCH"
                && r.url.path().starts_with("/api/messages/")
                && String::from_utf8_lossy(&r.body).contains("summarized")
        })
        .count();
    assert!(summarize_patches > 0);

    // …and the user-facing request started with the summary context.
    let final_request = provider.requests().pop().unwrap();
    assert!(final_request
        .messages
        .iter()
        .any(|m| m.content.contains("forty topics")));
    assert_eq!(outcome.state.current_summary_text.as_deref(), Some("User and assistant discussed forty topics."));
}

#[tokio::test]
async fn llm_failure_propagates_for_retry() {
    let server = MockServer::start().await;
    mount_state_store(&server, serde_json::json!([])).await;

    let provider = Arc::new(ScriptedProvider::new().then_error(domo_llm::LlmError::Api {
        status: 503,
        message: "overloaded".into(),
    }));
    let deps = deps_for(
        &server,
        provider,
        test_assistant(16_384),
        GlobalSettings::default(),
        false,
    );
    let graph = ConversationGraph::new(deps, Arc::new(MemoryCheckpointer::new()));

    let err = graph.run(seed_state()).await.unwrap_err();
    assert!(err.kind().is_retryable());
}
