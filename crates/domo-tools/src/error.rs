use thiserror::Error;

/// Failure classification carried inside every tool error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorCode {
    UserIdRequired,
    InvalidInput,
    ConfigurationError,
    NetworkError,
    ApiError,
    UnexpectedError,
}

impl ToolErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolErrorCode::UserIdRequired => "USER_ID_REQUIRED",
            ToolErrorCode::InvalidInput => "INVALID_INPUT",
            ToolErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ToolErrorCode::NetworkError => "NETWORK_ERROR",
            ToolErrorCode::ApiError => "API_ERROR",
            ToolErrorCode::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }
}

/// Structured tool failure. Rendered into tool-response content so the LLM
/// can see what went wrong and recover; never aborts the conversation.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {tool_name}: {message}", code = .code.as_str())]
pub struct ToolError {
    pub tool_name: String,
    pub code: ToolErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(
        tool_name: impl Into<String>,
        code: ToolErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(tool_name, ToolErrorCode::InvalidInput, message)
    }

    /// The text placed in the tool response when execution fails.
    pub fn as_tool_response(&self) -> String {
        format!("Tool '{}' failed ({}): {}", self.tool_name, self.code.as_str(), self.message)
    }
}

/// Map a state-store failure onto the tool error vocabulary.
pub(crate) fn from_state_error(tool_name: &str, err: domo_state::StateStoreError) -> ToolError {
    use domo_state::StateStoreError::*;
    let code = match err {
        Network(_) => ToolErrorCode::NetworkError,
        Http4xx { .. } => ToolErrorCode::InvalidInput,
        Http5xx { .. } | CircuitOpen { .. } => ToolErrorCode::ApiError,
        Decode(_) => ToolErrorCode::ApiError,
    };
    ToolError::new(tool_name, code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_tool() {
        let err = ToolError::invalid_input("reminder_create", "cron expression has 4 fields");
        let text = err.to_string();
        assert!(text.contains("INVALID_INPUT"));
        assert!(text.contains("reminder_create"));
    }
}
