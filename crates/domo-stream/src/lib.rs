//! `domo-stream` — consumer-group access to the Redis stream broker.
//!
//! The orchestrator reads inbound envelopes through [`MessageStream`] and
//! counts delivery attempts through [`RetryCounter`]; both traits have Redis
//! implementations here and in-memory fakes in consumer tests. The concrete
//! [`StreamClient`] additionally exposes the dead-letter inspection surface
//! used by the operator CLI.
//!
//! Delivery contract: every entry handed out by `read` is either acked or
//! left pending for another consumer to reclaim after its idle timeout.
//! Nothing is dropped client-side.

pub mod client;
pub mod error;
pub mod retry;
pub mod testing;

use std::collections::HashMap;

use async_trait::async_trait;

pub use client::StreamClient;
pub use error::{Result, StreamError};
pub use retry::{RedisRetryStore, RETRY_KEY_PREFIX};

/// One delivered stream entry: broker-assigned id plus raw field map.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, Vec<u8>>,
}

impl StreamEntry {
    /// The serialized envelope, when the producer used the standard layout.
    pub fn payload(&self) -> Option<&[u8]> {
        self.fields
            .get(domo_protocol::PAYLOAD_FIELD)
            .map(|v| v.as_slice())
    }
}

/// Consumer-group operations on a single stream.
#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Next available entry: new entries first, then stale pending entries
    /// idle longer than `idle_reclaim_ms`. `None` when the blocking read
    /// times out with nothing to do.
    async fn read(
        &self,
        count: usize,
        block_ms: u64,
        idle_reclaim_ms: u64,
    ) -> Result<Option<StreamEntry>>;

    /// Remove an entry from this consumer group's pending list.
    async fn ack(&self, message_id: &str) -> Result<()>;

    /// Append a payload; returns the broker-assigned entry id.
    async fn add(&self, payload: &[u8]) -> Result<String>;

    /// Append a dead-letter record to the paired `<stream>:dlq`.
    async fn send_to_dlq(&self, entry: domo_protocol::DlqEntry) -> Result<String>;
}

/// Per-message delivery-attempt counter, external to the stream so it
/// survives consumer crashes and reclaims.
#[async_trait]
pub trait RetryCounter: Send + Sync {
    /// Atomically increment and return the new count. Resets the TTL.
    async fn incr(&self, message_id: &str) -> Result<u32>;

    /// Current count; zero when the key is absent or expired.
    async fn get(&self, message_id: &str) -> Result<u32>;

    /// Drop the counter (after success or dead-lettering).
    async fn clear(&self, message_id: &str) -> Result<()>;
}
