use thiserror::Error;

/// Cross-component error classification.
///
/// Every error that reaches the orchestrator's failure handler is mapped to
/// one of these kinds; the kind decides between retry, immediate dead-letter,
/// and silent requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection-level failure talking to a collaborator. Retryable.
    TransientNetwork,
    /// Malformed payload or schema mismatch. Dead-lettered immediately —
    /// retrying cannot make a bad payload parse.
    PermanentValidation,
    /// Collaborator returned 5xx or its circuit is open. Retryable.
    DependencyUnavailable,
    /// A per-call deadline elapsed. Retryable.
    Timeout,
    /// Tool execution failed. Never fails the graph — surfaced to the LLM
    /// as a tool response instead.
    Tool,
    /// The reducer detected an unrecoverable message-stream violation.
    GraphInvariant,
    /// Cooperative shutdown interrupted the operation. Requeued with no
    /// retry-count bump.
    Cancelled,
}

impl ErrorKind {
    /// Whether the orchestrator's bounded-retry policy applies.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork
                | ErrorKind::DependencyUnavailable
                | ErrorKind::Timeout
                | ErrorKind::GraphInvariant
        )
    }

    /// Stable string used as `error_type` in DLQ entries and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "TransientNetwork",
            ErrorKind::PermanentValidation => "PermanentValidation",
            ErrorKind::DependencyUnavailable => "DependencyUnavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Tool => "ToolError",
            ErrorKind::GraphInvariant => "GraphInvariant",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the shared foundation itself.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::TransientNetwork.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::DependencyUnavailable.is_retryable());
        assert!(!ErrorKind::PermanentValidation.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
        assert!(!ErrorKind::Tool.is_retryable());
    }

    #[test]
    fn kind_strings_are_stable() {
        // DLQ entries persist these strings; renaming breaks operator tooling.
        assert_eq!(ErrorKind::PermanentValidation.as_str(), "PermanentValidation");
        assert_eq!(ErrorKind::Tool.as_str(), "ToolError");
    }
}
