// Verify wire format matches what front-end producers and consumers expect.
// These tests ensure stream compatibility is never broken.

use domo_protocol::{
    AssistantResponse, EventSource, InboundEvent, ResponseStatus, TriggerType,
};

#[test]
fn user_message_round_trip() {
    let json = r#"{"kind":"user_message","user_id":42,"content":"Hi","metadata":{"source":"telegram","chat_id":100},"timestamp":"2025-01-01T00:00:00Z"}"#;
    let event: InboundEvent = serde_json::from_str(json).unwrap();

    let InboundEvent::UserMessage(msg) = &event else {
        panic!("expected user_message variant");
    };
    assert_eq!(msg.user_id, 42);
    assert_eq!(msg.content, "Hi");
    assert_eq!(msg.metadata.chat_id, Some(100));
    assert_eq!(msg.metadata.source, Some(EventSource::Telegram));

    let back = serde_json::to_string(&event).unwrap();
    assert!(back.contains(r#""kind":"user_message""#));
    let reparsed: InboundEvent = serde_json::from_str(&back).unwrap();
    assert_eq!(reparsed.user_id(), 42);
}

#[test]
fn trigger_round_trip() {
    let json = r#"{"kind":"trigger","trigger_type":"reminder_triggered","user_id":7,"source":"cron","payload":{"reminder_id":"r-1"},"timestamp":"2025-06-01T08:30:00Z"}"#;
    let event: InboundEvent = serde_json::from_str(json).unwrap();

    let InboundEvent::Trigger(trigger) = &event else {
        panic!("expected trigger variant");
    };
    assert_eq!(trigger.trigger_type, TriggerType::ReminderTriggered);
    assert_eq!(trigger.source, EventSource::Cron);
    assert_eq!(trigger.payload["reminder_id"], "r-1");

    let back = serde_json::to_string(&event).unwrap();
    assert!(back.contains(r#""trigger_type":"reminder_triggered""#));
}

#[test]
fn unknown_kind_is_rejected() {
    let json = r#"{"kind":"carrier_pigeon","user_id":1,"timestamp":"2025-01-01T00:00:00Z"}"#;
    assert!(serde_json::from_str::<InboundEvent>(json).is_err());
}

#[test]
fn unknown_fields_are_rejected() {
    let json = r#"{"kind":"user_message","user_id":1,"content":"x","timestamp":"2025-01-01T00:00:00Z","debug":true}"#;
    assert!(
        serde_json::from_str::<InboundEvent>(json).is_err(),
        "extra fields must fail validation"
    );
}

#[test]
fn missing_content_is_rejected() {
    let json = r#"{"kind":"user_message","user_id":1,"timestamp":"2025-01-01T00:00:00Z"}"#;
    assert!(serde_json::from_str::<InboundEvent>(json).is_err());
}

#[test]
fn response_success_serialization() {
    let resp = AssistantResponse::success(42, "assistant", "hello there");
    let json = serde_json::to_string(&resp).unwrap();

    assert!(json.contains(r#""status":"success""#));
    assert!(json.contains(r#""response":"hello there""#));
    // error field must be absent on success
    assert!(!json.contains(r#""error""#));
}

#[test]
fn response_error_serialization() {
    let resp = AssistantResponse::error(42, "processing failed");
    let json = serde_json::to_string(&resp).unwrap();

    assert!(json.contains(r#""status":"error""#));
    assert!(json.contains(r#""error":"processing failed""#));
    // response field must be absent on error
    assert!(!json.contains(r#""response""#));
}

#[test]
fn response_wire_validation() {
    let ok: AssistantResponse =
        serde_json::from_str(r#"{"user_id":5,"status":"success"}"#).unwrap();
    assert_eq!(ok.status, ResponseStatus::Success);
    assert!(ok.validate().is_ok(), "empty success response is allowed");

    let bad: AssistantResponse =
        serde_json::from_str(r#"{"user_id":5,"status":"error"}"#).unwrap();
    assert!(bad.validate().is_err());
}
