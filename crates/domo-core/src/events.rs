use serde::{Deserialize, Serialize};

/// Closed vocabulary for the `event` field on structured log lines.
///
/// Log consumers alert on these strings; free-form event names are not
/// allowed anywhere in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RequestIn,
    RequestOut,
    JobStart,
    JobEnd,
    JobError,
    QueuePush,
    QueuePop,
    ToolCall,
    ToolResult,
    LlmCall,
    LlmResponse,
    MemorySaved,
    MemorySearch,
    MessageSaved,
    MessageUpdated,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RequestIn => "request_in",
            EventKind::RequestOut => "request_out",
            EventKind::JobStart => "job_start",
            EventKind::JobEnd => "job_end",
            EventKind::JobError => "job_error",
            EventKind::QueuePush => "queue_push",
            EventKind::QueuePop => "queue_pop",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::LlmCall => "llm_call",
            EventKind::LlmResponse => "llm_response",
            EventKind::MemorySaved => "memory_saved",
            EventKind::MemorySearch => "memory_search",
            EventKind::MessageSaved => "message_saved",
            EventKind::MessageUpdated => "message_updated",
            EventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_match_as_str() {
        for kind in [
            EventKind::RequestIn,
            EventKind::QueuePop,
            EventKind::ToolResult,
            EventKind::MemorySaved,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.as_str());
        }
    }
}
