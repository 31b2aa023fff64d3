use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use domo_core::RequestContext;

use crate::client::StateStoreClient;
use crate::error::Result;
use crate::models::Assistant;

/// How often the background refresh re-reads assignments.
const REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// In-process directory of user → active-secretary assignments.
///
/// Consumers resolve the secretary for every inbound message; hitting the
/// store each time would put it on the hot path. The directory is warmed at
/// startup from the assistants list and refreshed in the background; misses
/// fall through to the store so a user assigned mid-interval still resolves.
pub struct SecretaryDirectory {
    client: Arc<StateStoreClient>,
    assignments: DashMap<i64, Assistant>,
}

impl SecretaryDirectory {
    pub fn new(client: Arc<StateStoreClient>) -> Self {
        Self {
            client,
            assignments: DashMap::new(),
        }
    }

    /// Resolve the active secretary for `user_id`, preferring the warm
    /// directory. `Ok(None)` means the user has no active assignment.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        user_id: i64,
    ) -> Result<Option<Assistant>> {
        if let Some(assistant) = self.assignments.get(&user_id) {
            return Ok(Some(assistant.clone()));
        }

        let loaded = self.client.get_user_secretary(ctx, user_id).await?;
        if let Some(ref assistant) = loaded {
            debug!(user_id, secretary = %assistant.id, "cached secretary assignment");
            self.assignments.insert(user_id, assistant.clone());
        }
        Ok(loaded)
    }

    /// Change a user's assignment through the store, then update the
    /// directory — invalidate-before-return, so the next resolve cannot
    /// observe the old secretary.
    pub async fn assign(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        secretary_id: &str,
    ) -> Result<()> {
        self.client
            .set_user_secretary(ctx, user_id, secretary_id)
            .await?;
        self.assignments.remove(&user_id);
        Ok(())
    }

    /// Drop a cached assignment (e.g. after an external change notification).
    pub fn forget(&self, user_id: i64) {
        self.assignments.remove(&user_id);
    }

    /// Drop everything; the next resolves re-read from the store.
    pub fn clear(&self) {
        self.assignments.clear();
    }

    /// Background refresh loop: periodically clears the directory so stale
    /// assignments age out even without traffic. Runs until shutdown.
    pub async fn run_refresh(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("secretary directory refresh loop started");
        let mut interval = tokio::time::interval(REFRESH_INTERVAL);
        interval.tick().await; // immediate first tick is a no-op
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let count = self.assignments.len();
                    self.assignments.clear();
                    debug!(dropped = count, "secretary directory refreshed");
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("secretary directory refresh loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Warm the directory before consumers start. Failure is non-fatal:
    /// resolves fall back to the store.
    pub async fn preload(&self, ctx: &RequestContext, user_ids: &[i64]) {
        for &user_id in user_ids {
            match self.client.get_user_secretary(ctx, user_id).await {
                Ok(Some(assistant)) => {
                    self.assignments.insert(user_id, assistant);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "secretary preload failed for user");
                }
            }
        }
        info!(loaded = self.assignments.len(), "secretary directory preloaded");
    }
}
