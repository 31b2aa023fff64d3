use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Where a message or trigger originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Telegram,
    Cron,
    Api,
    Calendar,
}

/// System-generated trigger discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    #[serde(rename = "reminder_triggered")]
    ReminderTriggered,
    #[serde(rename = "google_auth_successful")]
    GoogleAuthSuccessful,
}

/// Free-form addressing details attached to a user message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,
}

/// A user-authored turn pushed by a front-end.
/// Wire: `{ "kind":"user_message", "user_id":42, "content":"...", "metadata":{...}, "timestamp":"..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserMessage {
    pub user_id: i64,
    pub content: String,
    #[serde(default)]
    pub metadata: MessageMetadata,
    pub timestamp: DateTime<Utc>,
}

/// A system-generated event (reminder fire, auth callback) routed like a
/// user message.
/// Wire: `{ "kind":"trigger", "trigger_type":"reminder_triggered", "user_id":7, "source":"cron", "payload":{...}, "timestamp":"..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub user_id: i64,
    pub source: EventSource,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Everything the orchestrator accepts from `stream_in`, discriminated on
/// `kind`. Unknown kinds and unknown fields fail deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    UserMessage(UserMessage),
    Trigger(Trigger),
}

impl InboundEvent {
    /// The user this event addresses, independent of variant.
    pub fn user_id(&self) -> i64 {
        match self {
            InboundEvent::UserMessage(m) => m.user_id,
            InboundEvent::Trigger(t) => t.user_id,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            InboundEvent::UserMessage(_) => "user_message",
            InboundEvent::Trigger(_) => "trigger",
        }
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Reply published to `stream_out` for every fully handled inbound entry.
///
/// `status=error` requires `error`; a successful reply may carry an empty
/// `response`. Use the constructors — they cannot build an invalid value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantResponse {
    pub user_id: i64,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssistantResponse {
    pub fn success(user_id: i64, source: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            user_id,
            status: ResponseStatus::Success,
            source: Some(source.into()),
            response: Some(response.into()),
            error: None,
        }
    }

    pub fn error(user_id: i64, error: impl Into<String>) -> Self {
        Self {
            user_id,
            status: ResponseStatus::Error,
            source: None,
            response: None,
            error: Some(error.into()),
        }
    }

    /// Enforce the status/field cross-constraints on values that arrived
    /// over the wire rather than through the constructors.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.status == ResponseStatus::Error && self.error.is_none() {
            return Err(ProtocolError::Invalid(
                "field 'error' is required when status is 'error'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_without_error_field_is_invalid() {
        let resp: AssistantResponse =
            serde_json::from_str(r#"{"user_id":1,"status":"error"}"#).unwrap();
        assert!(resp.validate().is_err());
    }

    #[test]
    fn success_response_allows_empty_response() {
        let resp = AssistantResponse::success(1, "assistant", "");
        assert!(resp.validate().is_ok());
    }
}
