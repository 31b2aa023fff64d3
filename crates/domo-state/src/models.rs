//! Entity types mirroring the state-store API. Storage layout is owned by
//! the collaborator; these are the wire shapes the core reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Stable messaging-platform id.
    pub external_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// IANA timezone name, e.g. "Europe/Berlin".
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    pub name: String,
    pub is_secretary: bool,
    pub model: String,
    pub instructions: String,
    #[serde(default)]
    pub tool_ids: Vec<String>,
    pub is_active: bool,
    /// Token budget for this assistant's LLM context.
    #[serde(default = "default_context_size")]
    pub llm_context_size: u32,
}

fn default_context_size() -> u32 {
    16_384
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Time,
    CalendarCreate,
    CalendarList,
    ReminderCreate,
    ReminderList,
    ReminderDelete,
    MemorySave,
    MemorySearch,
    UserFactSave,
    WebSearch,
    SubAssistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub kind: ToolKind,
    pub description: String,
    /// JSON Schema source text; compiled at tool-build time.
    pub input_schema: String,
    /// For `sub_assistant` tools: the assistant the call is delegated to.
    #[serde(default)]
    pub delegate_assistant_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Human,
    Assistant,
    ToolRequest,
    ToolResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processed,
    Summarized,
    Error,
}

/// A persisted conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub user_id: i64,
    pub assistant_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// For assistant turns that requested tools: the raw tool_calls array.
    #[serde(default)]
    pub tool_calls: Option<Value>,
    pub status: MessageStatus,
    #[serde(default)]
    pub summary_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageCreate {
    pub user_id: i64,
    pub assistant_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_id: Option<i64>,
}

/// Filter for `GET /api/messages`. Results are always requested in
/// ascending id order — history reconstruction depends on it.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub user_id: i64,
    pub assistant_id: String,
    pub status: Option<MessageStatus>,
    /// Exclusive lower bound, usually a summary's `last_message_id_covered`.
    pub id_gt: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: i64,
    pub user_id: i64,
    pub assistant_id: String,
    pub summary_text: String,
    /// Exclusive lower bound for subsequent history loads. Strictly
    /// increasing across summaries of one (user, assistant) pair.
    pub last_message_id_covered: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryCreate {
    pub user_id: i64,
    pub assistant_id: String,
    pub summary_text: String,
    pub last_message_id_covered: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    UserFact,
    Preference,
    Event,
    ConversationInsight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub assistant_id: Option<String>,
    pub text: String,
    pub memory_type: MemoryType,
    /// 1 (trivia) to 10 (identity-defining).
    pub importance: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryCreate {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    pub text: String,
    pub memory_type: MemoryType,
    pub importance: u8,
    pub embedding: Vec<f32>,
}

/// Body for `POST /api/memory/search`. Either a text query (the server
/// embeds it) or a pre-computed embedding.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub user_id: i64,
    pub limit: u32,
    pub threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemorySearchHit {
    #[serde(flatten)]
    pub memory: Memory,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFact {
    pub id: i64,
    pub user_id: i64,
    pub fact: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    OneShot,
    Recurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

/// A user-owned rule producing scheduled trigger events.
///
/// One-shot reminders carry `trigger_at`; recurring reminders carry
/// `cron_expression` + `timezone`. The two are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: i64,
    pub assistant_id: String,
    #[serde(default)]
    pub created_by_assistant_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    #[serde(default)]
    pub trigger_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub status: ReminderStatus,
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderCreate {
    pub user_id: i64,
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_assistant_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReminderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// An event in the user's external calendar, proxied by the calendar
/// collaborator (which owns the OAuth flow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarEventCreate {
    pub user_id: i64,
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Flat settings map from `GET /api/global-settings`, with typed accessors
/// and the documented defaults for absent keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSettings(pub serde_json::Map<String, Value>);

impl GlobalSettings {
    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.0.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn memory_extraction_enabled(&self) -> bool {
        self.0
            .get("memory_extraction_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn memory_extraction_interval_hours(&self) -> u64 {
        self.u64_or("memory_extraction_interval_hours", 24)
    }

    pub fn memory_extraction_min_messages(&self) -> u64 {
        self.u64_or("memory_extraction_min_messages", 4)
    }

    pub fn memory_dedup_threshold(&self) -> f64 {
        self.f64_or("memory_dedup_threshold", 0.85)
    }

    pub fn memory_update_threshold(&self) -> f64 {
        self.f64_or("memory_update_threshold", 0.95)
    }

    pub fn memory_user_cap(&self) -> u64 {
        self.u64_or("memory_user_cap", 1000)
    }

    pub fn memory_retrieve_limit(&self) -> u64 {
        self.u64_or("memory_retrieve_limit", 5)
    }

    pub fn memory_retrieve_threshold(&self) -> f64 {
        self.f64_or("memory_retrieve_threshold", 0.6)
    }

    pub fn summarize_ratio(&self) -> f64 {
        self.f64_or("summarize_ratio", 0.7)
    }

    pub fn messages_since_summary_limit(&self) -> u64 {
        self.u64_or("messages_since_summary_limit", 30)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobExecutionStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
}

/// Append-only record of one scheduler/extractor job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: i64,
    pub job_id: String,
    pub job_type: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobExecutionStatus,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobExecutionCreate {
    pub job_id: String,
    pub job_type: String,
    pub scheduled_at: DateTime<Utc>,
}

/// One (user, assistant) dialog slice since the extraction watermark, as
/// served by `GET /api/conversations`.
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub user_id: i64,
    pub assistant_id: String,
    pub messages: Vec<ConversationTurn>,
    pub message_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: i64,
    pub provider_batch_id: String,
    pub status: String,
    #[serde(default)]
    pub conversation_count: u32,
    #[serde(default)]
    pub extracted_count: u32,
    #[serde(default)]
    pub saved_count: u32,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDirection {
    Inbound,
    Outbound,
}

/// Best-effort observability record for every stream message touched.
#[derive(Debug, Clone, Serialize)]
pub struct QueueLogEntry {
    pub queue_name: String,
    pub direction: QueueDirection,
    pub message_type: String,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_settings_defaults() {
        let settings = GlobalSettings::default();
        assert!(!settings.memory_extraction_enabled());
        assert_eq!(settings.memory_retrieve_limit(), 5);
        assert!((settings.memory_retrieve_threshold() - 0.6).abs() < f64::EPSILON);
        assert!((settings.summarize_ratio() - 0.7).abs() < f64::EPSILON);
        assert_eq!(settings.messages_since_summary_limit(), 30);
        assert_eq!(settings.memory_user_cap(), 1000);
    }

    #[test]
    fn global_settings_overrides() {
        let settings: GlobalSettings = serde_json::from_value(serde_json::json!({
            "memory_extraction_enabled": true,
            "summarize_ratio": 0.5,
            "memory_retrieve_limit": 8,
        }))
        .unwrap();
        assert!(settings.memory_extraction_enabled());
        assert!((settings.summarize_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.memory_retrieve_limit(), 8);
    }

    #[test]
    fn reminder_kind_wire_names() {
        let reminder: Reminder = serde_json::from_value(serde_json::json!({
            "id": "r-1",
            "user_id": 7,
            "assistant_id": "sec-1",
            "type": "one_shot",
            "trigger_at": "2025-06-01T08:00:00Z",
            "payload": {"text": "stand up"},
            "status": "active",
        }))
        .unwrap();
        assert_eq!(reminder.kind, ReminderKind::OneShot);
        assert_eq!(reminder.status, ReminderStatus::Active);
        assert!(reminder.cron_expression.is_none());
    }
}
