// HTTP contract tests for the state-store client: correlation header,
// 404 normalization, bounded retry, circuit breaking, cache coherence.

use std::sync::Arc;

use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use domo_core::RequestContext;
use domo_state::models::MessageQuery;
use domo_state::{StateCache, StateStoreClient, StateStoreError};

fn assistant_json(name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "sec-1",
        "name": name,
        "is_secretary": true,
        "model": "gpt-4o",
        "instructions": "You are a helpful secretary.",
        "tool_ids": [],
        "is_active": true,
    })
}

#[tokio::test]
async fn requests_carry_correlation_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/assistants/sec-1"))
        .and(header_exists("X-Correlation-Id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(assistant_json("Ada")))
        .expect(1)
        .mount(&server)
        .await;

    let client = StateStoreClient::new(server.uri(), 5).unwrap();
    let ctx = RequestContext::new_root();
    let assistant = client.get_assistant(&ctx, "sec-1").await.unwrap().unwrap();
    assert_eq!(assistant.name, "Ada");
}

#[tokio::test]
async fn get_404_normalizes_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/99/secretary"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = StateStoreClient::new(server.uri(), 5).unwrap();
    let ctx = RequestContext::new_root();
    let secretary = client.get_user_secretary(&ctx, 99).await.unwrap();
    assert!(secretary.is_none());
}

#[tokio::test]
async fn mutating_404_surfaces_as_http_4xx() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/messages/123"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = StateStoreClient::new(server.uri(), 5).unwrap();
    let ctx = RequestContext::new_root();
    let err = client
        .update_message(&ctx, 123, &Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StateStoreError::Http4xx { status: 404, .. }));
}

#[tokio::test]
async fn retries_5xx_then_succeeds() {
    let server = MockServer::start().await;
    // First attempt fails, the retry lands on the healthy mock.
    Mock::given(method("GET"))
        .and(path("/api/assistants/sec-1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/assistants/sec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(assistant_json("Ada")))
        .mount(&server)
        .await;

    let client = StateStoreClient::new(server.uri(), 5).unwrap();
    let ctx = RequestContext::new_root();
    let assistant = client.get_assistant(&ctx, "sec-1").await.unwrap();
    assert!(assistant.is_some());
}

#[tokio::test]
async fn does_not_retry_4xx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1) // a second attempt would trip this
        .mount(&server)
        .await;

    let client = StateStoreClient::new(server.uri(), 5).unwrap();
    let ctx = RequestContext::new_root();
    let query = MessageQuery {
        user_id: 1,
        assistant_id: "sec-1".into(),
        ..Default::default()
    };
    let err = client.list_messages(&ctx, &query).await.unwrap_err();
    assert!(matches!(err, StateStoreError::Http4xx { status: 422, .. }));
}

#[tokio::test]
async fn circuit_opens_after_consecutive_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = StateStoreClient::new(server.uri(), 5).unwrap();
    let ctx = RequestContext::new_root();

    // Two exhausted requests = 6 consecutive failures — past the threshold.
    let _ = client.get_assistant(&ctx, "a").await;
    let _ = client.get_assistant(&ctx, "b").await;

    let err = client.get_assistant(&ctx, "c").await.unwrap_err();
    assert!(matches!(err, StateStoreError::CircuitOpen { .. }));
}

#[tokio::test]
async fn cache_serves_reads_and_invalidation_restores_coherence() {
    let server = MockServer::start().await;
    let client = Arc::new(StateStoreClient::new(server.uri(), 5).unwrap());
    let cache = StateCache::new(client);
    let ctx = RequestContext::new_root();

    {
        let _v1 = Mock::given(method("GET"))
            .and(path("/api/assistants/sec-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(assistant_json("Ada")))
            .mount_as_scoped(&server)
            .await;
        let first = cache.assistant(&ctx, "sec-1").await.unwrap().unwrap();
        assert_eq!(first.name, "Ada");
    }

    // The store now holds a newer version.
    Mock::given(method("GET"))
        .and(path("/api/assistants/sec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(assistant_json("Ada v2")))
        .mount(&server)
        .await;

    // Within the TTL the stale value is served…
    let cached = cache.assistant(&ctx, "sec-1").await.unwrap().unwrap();
    assert_eq!(cached.name, "Ada");

    // …until the mutation path invalidates the pattern.
    cache.invalidate_pattern("assistant:");
    let fresh = cache.assistant(&ctx, "sec-1").await.unwrap().unwrap();
    assert_eq!(fresh.name, "Ada v2");
}
