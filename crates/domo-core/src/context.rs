use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the correlation id on every state-store call.
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Per-request context threaded through every downstream call.
///
/// Born at the stream-consumer boundary (one id per inbound entry) and
/// handed, by value, to the graph, tools, and HTTP clients. There is no
/// global; a component without a context cannot make an attributed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub correlation_id: String,
    pub user_id: Option<i64>,
    pub assistant_id: Option<String>,
}

impl RequestContext {
    /// Fresh root context with a new correlation id.
    pub fn new_root() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            user_id: None,
            assistant_id: None,
        }
    }

    /// Adopt a correlation id that arrived on an inbound message.
    pub fn from_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            user_id: None,
            assistant_id: None,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_assistant(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    /// Conversation thread id: `user_<user>_assistant_<assistant>`.
    ///
    /// Returns `None` until both ids are bound.
    pub fn thread_id(&self) -> Option<String> {
        match (self.user_id, self.assistant_id.as_deref()) {
            (Some(user), Some(assistant)) => Some(format!("user_{user}_assistant_{assistant}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_contexts_get_distinct_ids() {
        let a = RequestContext::new_root();
        let b = RequestContext::new_root();
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn thread_id_requires_both_ids() {
        let ctx = RequestContext::new_root().with_user(42);
        assert!(ctx.thread_id().is_none());

        let ctx = ctx.with_assistant("sec-1");
        assert_eq!(ctx.thread_id().unwrap(), "user_42_assistant_sec-1");
    }
}
