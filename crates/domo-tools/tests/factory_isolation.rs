// Factory behavior: per-definition isolation, schema gating, dispatch.

use std::sync::Arc;

use domo_core::RequestContext;
use domo_llm::testing::HashEmbedder;
use domo_state::models::{GlobalSettings, ToolDefinition, ToolKind};
use domo_state::StateStoreClient;
use domo_tools::{build_tool_set, ToolContext, ToolErrorCode};

fn test_context() -> ToolContext {
    ToolContext {
        request: RequestContext::new_root(),
        user_id: 42,
        assistant_id: "sec-1".into(),
        user_timezone: Some("Europe/Berlin".into()),
        state: Arc::new(StateStoreClient::new("http://127.0.0.1:1", 1).unwrap()),
        embedder: Arc::new(HashEmbedder::new(8)),
        settings: GlobalSettings::default(),
        web_search: None,
    }
}

fn definition(name: &str, kind: ToolKind, schema: &str) -> ToolDefinition {
    ToolDefinition {
        id: format!("def-{name}"),
        name: name.to_string(),
        kind,
        description: format!("{name} tool"),
        input_schema: schema.to_string(),
        delegate_assistant_id: None,
        is_active: true,
    }
}

const TIME_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {"timezone": {"type": "string"}},
    "additionalProperties": false
}"#;

#[tokio::test]
async fn broken_definition_does_not_disable_the_rest() {
    let mut broken = definition("broken", ToolKind::Time, "{this is not json");
    broken.id = "def-broken".into();
    let mut inactive = definition("dormant", ToolKind::Time, TIME_SCHEMA);
    inactive.is_active = false;

    let defs = vec![
        broken,
        definition("time", ToolKind::Time, TIME_SCHEMA),
        inactive,
    ];
    let set = build_tool_set(&defs, &test_context(), None);

    assert_eq!(set.names(), vec!["time"]);
    let out = set
        .execute("time", &serde_json::json!({"timezone": "UTC"}))
        .await
        .unwrap();
    assert!(out.contains("UTC"));
}

#[tokio::test]
async fn schema_violations_are_invalid_input() {
    let defs = vec![definition("time", ToolKind::Time, TIME_SCHEMA)];
    let set = build_tool_set(&defs, &test_context(), None);

    let err = set
        .execute("time", &serde_json::json!({"timezone": 5}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ToolErrorCode::InvalidInput);

    let err = set
        .execute("time", &serde_json::json!({"surprise": true}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ToolErrorCode::InvalidInput);
}

#[tokio::test]
async fn unknown_tool_is_reported_not_panicked() {
    let set = build_tool_set(&[], &test_context(), None);
    let err = set
        .execute("ghost", &serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ToolErrorCode::UnexpectedError);
}

#[tokio::test]
async fn sub_assistant_without_runner_is_skipped() {
    let mut def = definition(
        "research_helper",
        ToolKind::SubAssistant,
        r#"{"type":"object","properties":{"message":{"type":"string"}},"required":["message"]}"#,
    );
    def.delegate_assistant_id = Some("asst-research".into());

    let set = build_tool_set(&[def], &test_context(), None);
    assert!(set.is_empty(), "delegation requires a runner seam");
}

#[tokio::test]
async fn specs_expose_schema_to_the_llm() {
    let defs = vec![definition("time", ToolKind::Time, TIME_SCHEMA)];
    let set = build_tool_set(&defs, &test_context(), None);
    let specs = set.specs();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].name, "time");
    assert_eq!(specs[0].input_schema["type"], "object");
}
