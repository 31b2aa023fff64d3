// One extraction cycle end to end: settings gate, batch submission,
// dedup decisions, persistence, bookkeeping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use domo_extractor::MemoryExtractor;
use domo_llm::testing::{HashEmbedder, ScriptedBatch};
use domo_llm::BatchResultItem;
use domo_state::StateStoreClient;

/// First search finds a very close match (update), the second finds
/// nothing (insert).
struct SearchSequence {
    calls: AtomicUsize,
}

impl Respond for SearchSequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": 4, "user_id": 42, "text": "lives in Lisbon",
                "memory_type": "user_fact", "importance": 6,
                "created_at": "2025-01-01T00:00:00Z",
                "similarity": 0.97
            }]))
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!([]))
        }
    }
}

async fn mount_store(server: &MockServer, extraction_enabled: bool) {
    Mock::given(method("GET"))
        .and(path("/api/global-settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "memory_extraction_enabled": extraction_enabled,
            "memory_extraction_min_messages": 2,
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/batch-jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "user_id": 42,
            "assistant_id": "sec-1",
            "messages": [
                {"role": "human", "content": "I just moved to Porto"},
                {"role": "assistant", "content": "Exciting! Noted."}
            ],
            "message_count": 2
        }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/memory/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/memory/search"))
        .respond_with(SearchSequence {
            calls: AtomicUsize::new(0),
        })
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/memory/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 77, "user_id": 42, "text": "prefers tea over coffee",
            "memory_type": "preference", "importance": 4,
            "created_at": "2025-01-01T00:00:00Z"
        })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/memory/4"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/batch-jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 300, "provider_batch_id": "batch-1", "status": "submitted",
            "conversation_count": 1
        })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/batch-jobs/300"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

fn extractor(server: &MockServer, batch: Arc<ScriptedBatch>) -> MemoryExtractor {
    MemoryExtractor::new(
        Arc::new(StateStoreClient::new(server.uri(), 5).unwrap()),
        batch,
        Arc::new(HashEmbedder::new(8)),
        "gpt-4o-mini",
        Duration::from_secs(3600),
    )
}

#[tokio::test]
async fn cycle_extracts_dedups_and_persists() {
    let server = MockServer::start().await;
    mount_store(&server, true).await;

    let batch = Arc::new(ScriptedBatch::new());
    // The batch completes immediately with two facts: one near-duplicate
    // of memory #4 (update), one novel (insert).
    batch.complete(vec![BatchResultItem {
        custom_id: "conv_42_sec-1".into(),
        content: Some(
            r#"[
                {"text": "lives in Lisbon, Portugal", "memory_type": "user_fact", "importance": 7},
                {"text": "prefers tea over coffee", "memory_type": "preference", "importance": 4}
            ]"#
            .into(),
        ),
        error: None,
    }]);

    extractor(&server, Arc::clone(&batch)).run_once().await.unwrap();
    assert_eq!(batch.submissions(), 1);

    let requests = server.received_requests().await.unwrap();
    // Near-duplicate became an update of the stored row…
    assert!(requests
        .iter()
        .any(|r| r.method.as_str() == "PATCH" && r.url.path() == "/api/memory/4"));
    // …the novel fact became an insert…
    assert!(requests
        .iter()
        .any(|r| r.method.as_str() == "POST" && r.url.path() == "/api/memory/"));
    // …and the batch job was closed out with both counts.
    let job_patch = requests
        .iter()
        .find(|r| r.method.as_str() == "PATCH" && r.url.path() == "/api/batch-jobs/300")
        .expect("batch job must be updated");
    let body = String::from_utf8_lossy(&job_patch.body);
    assert!(body.contains("completed"));
    assert!(body.contains("\"extracted_count\":2"));
    assert!(body.contains("\"saved_count\":2"));
}

#[tokio::test]
async fn disabled_settings_skip_the_cycle() {
    let server = MockServer::start().await;
    mount_store(&server, false).await;

    let batch = Arc::new(ScriptedBatch::new());
    extractor(&server, Arc::clone(&batch)).run_once().await.unwrap();

    assert_eq!(batch.submissions(), 0, "nothing may be submitted when disabled");
    let requests = server.received_requests().await.unwrap();
    assert!(!requests.iter().any(|r| r.url.path() == "/api/conversations"));
}
