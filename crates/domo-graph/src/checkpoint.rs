use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use domo_core::RequestContext;
use domo_state::StateStoreClient;

use crate::state::GraphState;

/// Persistence seam for graph state, keyed by thread id
/// (`user_<user>_assistant_<assistant>`). Saves happen after every node so
/// an interrupted run resumes from the last completed step.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, thread_id: &str, state: &GraphState);

    async fn load(&self, thread_id: &str) -> Option<GraphState>;

    /// Remove a thread's checkpoint after a clean finish.
    async fn clear(&self, thread_id: &str);
}

/// In-memory checkpointer for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryCheckpointer {
    states: DashMap<String, GraphState>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, thread_id: &str, state: &GraphState) {
        self.states.insert(thread_id.to_string(), state.clone());
    }

    async fn load(&self, thread_id: &str) -> Option<GraphState> {
        self.states.get(thread_id).map(|s| s.clone())
    }

    async fn clear(&self, thread_id: &str) {
        self.states.remove(thread_id);
    }
}

/// Durable checkpointer backed by the state store. Save/clear failures are
/// logged, not raised — losing a checkpoint degrades resumability, it must
/// not fail the turn.
pub struct StoreCheckpointer {
    client: Arc<StateStoreClient>,
}

impl StoreCheckpointer {
    pub fn new(client: Arc<StateStoreClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checkpointer for StoreCheckpointer {
    async fn save(&self, thread_id: &str, state: &GraphState) {
        let ctx = RequestContext::from_correlation_id(state.correlation_id.clone());
        let value = match serde_json::to_value(state) {
            Ok(value) => value,
            Err(e) => {
                warn!(thread_id, error = %e, "checkpoint serialization failed");
                return;
            }
        };
        if let Err(e) = self.client.put_checkpoint(&ctx, thread_id, &value).await {
            warn!(thread_id, error = %e, "checkpoint save failed");
        }
    }

    async fn load(&self, thread_id: &str) -> Option<GraphState> {
        let ctx = RequestContext::new_root();
        match self.client.get_checkpoint(&ctx, thread_id).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(thread_id, error = %e, "checkpoint deserialization failed");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(thread_id, error = %e, "checkpoint load failed");
                None
            }
        }
    }

    async fn clear(&self, thread_id: &str) {
        let ctx = RequestContext::new_root();
        if let Err(e) = self.client.delete_checkpoint(&ctx, thread_id).await {
            warn!(thread_id, error = %e, "checkpoint clear failed");
        }
    }
}

/// Per-thread run locks: no two concurrent graph runs may share a thread
/// id. The broker's at-most-one-claim semantics already make collisions
/// rare; this closes the in-process window.
#[derive(Default)]
pub struct ThreadLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::GraphMessage;

    #[tokio::test]
    async fn memory_checkpointer_round_trip() {
        let cp = MemoryCheckpointer::new();
        let state = GraphState::seed(1, "sec", "corr", GraphMessage::human("hi"));
        cp.save(&state.thread_id(), &state).await;

        let loaded = cp.load("user_1_assistant_sec").await.unwrap();
        assert_eq!(loaded.user_id, 1);
        assert_eq!(loaded.messages.len(), 1);

        cp.clear("user_1_assistant_sec").await;
        assert!(cp.load("user_1_assistant_sec").await.is_none());
    }

    #[tokio::test]
    async fn thread_locks_serialize_same_thread() {
        let locks = Arc::new(ThreadLocks::new());
        let guard = locks.acquire("t1").await;

        let locks2 = Arc::clone(&locks);
        let contended = tokio::spawn(async move {
            let _guard = locks2.acquire("t1").await;
        });

        // The second acquire must not complete while the first is held.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contended.is_finished());

        drop(guard);
        contended.await.unwrap();
    }
}
