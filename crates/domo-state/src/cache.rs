use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use domo_core::RequestContext;

use crate::client::StateStoreClient;
use crate::error::Result;
use crate::models::{Assistant, GlobalSettings, ToolDefinition};

/// Cache entries expire after 5 minutes.
const CACHE_TTL: Duration = Duration::from_secs(300);
/// Maximum cache entries before wholesale eviction of expired slots.
const MAX_CACHE_ENTRIES: usize = 1024;

#[derive(Clone)]
enum Cached {
    Assistant(Assistant),
    Tools(Vec<ToolDefinition>),
    Settings(GlobalSettings),
}

struct Slot {
    inserted: Instant,
    value: Cached,
}

impl Slot {
    fn fresh(&self) -> bool {
        self.inserted.elapsed() < CACHE_TTL
    }
}

/// Read-through cache for the three hot read paths: assistant-by-id,
/// tools-for-assistant, and global settings.
///
/// Keys follow the `assistant:<id>` / `tools:<id>` / `settings:global`
/// pattern so mutations can invalidate by prefix. Stale-after-write is not
/// tolerated: any code path that mutates one of these resources must call
/// [`StateCache::invalidate_pattern`] before reporting success.
pub struct StateCache {
    client: Arc<StateStoreClient>,
    entries: DashMap<String, Slot>,
}

impl StateCache {
    pub fn new(client: Arc<StateStoreClient>) -> Self {
        Self {
            client,
            entries: DashMap::new(),
        }
    }

    pub fn client(&self) -> &StateStoreClient {
        &self.client
    }

    pub async fn assistant(
        &self,
        ctx: &RequestContext,
        assistant_id: &str,
    ) -> Result<Option<Assistant>> {
        let key = format!("assistant:{assistant_id}");
        if let Some(slot) = self.entries.get(&key) {
            if slot.fresh() {
                if let Cached::Assistant(ref assistant) = slot.value {
                    debug!(%key, "cache hit");
                    return Ok(Some(assistant.clone()));
                }
            }
        }

        let loaded = self.client.get_assistant(ctx, assistant_id).await?;
        if let Some(ref assistant) = loaded {
            self.insert(key, Cached::Assistant(assistant.clone()));
        }
        Ok(loaded)
    }

    pub async fn assistant_tools(
        &self,
        ctx: &RequestContext,
        assistant_id: &str,
    ) -> Result<Vec<ToolDefinition>> {
        let key = format!("tools:{assistant_id}");
        if let Some(slot) = self.entries.get(&key) {
            if slot.fresh() {
                if let Cached::Tools(ref tools) = slot.value {
                    debug!(%key, "cache hit");
                    return Ok(tools.clone());
                }
            }
        }

        let tools = self.client.get_assistant_tools(ctx, assistant_id).await?;
        self.insert(key, Cached::Tools(tools.clone()));
        Ok(tools)
    }

    pub async fn global_settings(&self, ctx: &RequestContext) -> Result<GlobalSettings> {
        let key = "settings:global".to_string();
        if let Some(slot) = self.entries.get(&key) {
            if slot.fresh() {
                if let Cached::Settings(ref settings) = slot.value {
                    debug!(%key, "cache hit");
                    return Ok(settings.clone());
                }
            }
        }

        let settings = self.client.get_global_settings(ctx).await?;
        self.insert(key, Cached::Settings(settings.clone()));
        Ok(settings)
    }

    /// Drop every entry whose key starts with `prefix` ("assistant:",
    /// "tools:", "settings:", or a fully qualified key).
    pub fn invalidate_pattern(&self, prefix: &str) {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(prefix, dropped, "invalidated cache entries");
        }
    }

    fn insert(&self, key: String, value: Cached) {
        if self.entries.len() >= MAX_CACHE_ENTRIES {
            self.entries.retain(|_, slot| slot.fresh());
        }
        self.entries.insert(
            key,
            Slot {
                inserted: Instant::now(),
                value,
            },
        );
    }
}
