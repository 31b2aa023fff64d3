use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamRangeReply, StreamReadOptions,
    StreamReadReply,
};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use domo_core::config::DLQ_SUFFIX;
use domo_core::EventKind;
use domo_protocol::{DlqEntry, PAYLOAD_FIELD};

use crate::error::{Result, StreamError};
use crate::{MessageStream, StreamEntry};

/// Consumer-group client for one stream and its paired dead-letter stream.
///
/// The multiplexed connection is cheap to clone; each call clones it rather
/// than holding a lock across awaits.
#[derive(Clone)]
pub struct StreamClient {
    conn: MultiplexedConnection,
    stream: String,
    group: String,
    consumer: String,
}

impl StreamClient {
    pub async fn connect(
        url: &str,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
        })
    }

    /// Build a client for a different stream over the same connection.
    pub fn for_stream(&self, stream: impl Into<String>) -> Self {
        Self {
            conn: self.conn.clone(),
            stream: stream.into(),
            group: self.group.clone(),
            consumer: self.consumer.clone(),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    pub fn dlq_name(&self) -> String {
        format!("{}{}", self.stream, DLQ_SUFFIX)
    }

    /// Create the consumer group if it does not exist yet (MKSTREAM).
    /// "BUSYGROUP" from a concurrent or earlier creation is fine.
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: std::result::Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "0")
            .await;
        match created {
            Ok(()) => {
                info!(stream = %self.stream, group = %self.group, "created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Oldest `count` dead-letter entries, parsed into [`DlqEntry`] records.
    pub async fn read_dlq(&self, count: usize) -> Result<Vec<(String, DlqEntry)>> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn
            .xrange_count(self.dlq_name(), "-", "+", count)
            .await?;

        let mut entries = Vec::with_capacity(reply.ids.len());
        for id in reply.ids {
            let fields = field_map(&id)?;
            entries.push((id.id.clone(), DlqEntry::from_fields(&fields)?));
        }
        Ok(entries)
    }

    /// Drop a dead-letter entry without reprocessing it.
    pub async fn delete_from_dlq(&self, dlq_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.xdel(self.dlq_name(), &[dlq_id]).await?;
        if removed == 0 {
            return Err(StreamError::NotFound {
                id: dlq_id.to_string(),
            });
        }
        info!(dlq_id, stream = %self.stream, "deleted DLQ entry");
        Ok(())
    }

    /// Re-append a dead-letter entry's original payload to the main stream,
    /// then remove it from the DLQ. Returns the new inbound entry id.
    pub async fn requeue_from_dlq(&self, dlq_id: &str) -> Result<String> {
        let mut conn = self.conn.clone();
        let reply: StreamRangeReply = conn.xrange_count(self.dlq_name(), dlq_id, dlq_id, 1).await?;
        let Some(raw) = reply.ids.into_iter().next() else {
            return Err(StreamError::NotFound {
                id: dlq_id.to_string(),
            });
        };
        let entry = DlqEntry::from_fields(&field_map(&raw)?)?;

        let new_id: String = conn
            .xadd(
                &self.stream,
                "*",
                &[(PAYLOAD_FIELD, entry.payload.as_slice())],
            )
            .await?;
        let _removed: u64 = conn.xdel(self.dlq_name(), &[dlq_id]).await?;
        info!(
            dlq_id,
            new_id = %new_id,
            original_id = %entry.original_message_id,
            "requeued DLQ entry"
        );
        Ok(new_id)
    }

    pub async fn get_dlq_length(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.xlen(self.dlq_name()).await?)
    }

    fn first_entry(reply: StreamReadReply) -> Option<Result<StreamEntry>> {
        let id = reply.keys.into_iter().next()?.ids.into_iter().next()?;
        Some(stream_entry(&id))
    }
}

#[async_trait]
impl MessageStream for StreamClient {
    async fn read(
        &self,
        count: usize,
        block_ms: u64,
        idle_reclaim_ms: u64,
    ) -> Result<Option<StreamEntry>> {
        let mut conn = self.conn.clone();

        // New entries first.
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count)
            .block(block_ms as usize);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &opts)
            .await?;
        if let Some(entry) = Self::first_entry(reply) {
            let entry = entry?;
            debug!(
                event = %EventKind::QueuePop,
                stream = %self.stream,
                message_id = %entry.id,
                "read new entry"
            );
            return Ok(Some(entry));
        }

        // Nothing new — try to claim a stale pending entry from a dead or
        // stuck consumer.
        let claim: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.stream,
                &self.group,
                &self.consumer,
                idle_reclaim_ms as usize,
                "0-0",
                StreamAutoClaimOptions::default().count(count),
            )
            .await?;
        let Some(id) = claim.claimed.into_iter().next() else {
            return Ok(None);
        };
        let entry = stream_entry(&id)?;
        warn!(
            event = %EventKind::QueuePop,
            stream = %self.stream,
            message_id = %entry.id,
            idle_reclaim_ms,
            "reclaimed stale pending entry"
        );
        Ok(Some(entry))
    }

    async fn ack(&self, message_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _acked: u64 = conn.xack(&self.stream, &self.group, &[message_id]).await?;
        debug!(stream = %self.stream, message_id, "acked entry");
        Ok(())
    }

    async fn add(&self, payload: &[u8]) -> Result<String> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(&self.stream, "*", &[(PAYLOAD_FIELD, payload)])
            .await?;
        debug!(
            event = %EventKind::QueuePush,
            stream = %self.stream,
            message_id = %id,
            bytes = payload.len(),
            "appended entry"
        );
        Ok(id)
    }

    async fn send_to_dlq(&self, entry: DlqEntry) -> Result<String> {
        let mut conn = self.conn.clone();
        let fields = entry.to_fields();
        let pairs: Vec<(&str, &[u8])> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        let id: String = conn.xadd(self.dlq_name(), "*", &pairs).await?;
        warn!(
            stream = %self.stream,
            dlq_id = %id,
            original_id = %entry.original_message_id,
            error_type = %entry.error_type,
            retry_count = entry.retry_count,
            "sent entry to DLQ"
        );
        Ok(id)
    }
}

fn stream_entry(id: &StreamId) -> Result<StreamEntry> {
    Ok(StreamEntry {
        id: id.id.clone(),
        fields: field_map(id)?,
    })
}

fn field_map(id: &StreamId) -> Result<HashMap<String, Vec<u8>>> {
    let mut fields = HashMap::with_capacity(id.map.len());
    for (key, value) in &id.map {
        let bytes: Vec<u8> = redis::from_redis_value(value)?;
        fields.insert(key.clone(), bytes);
    }
    Ok(fields)
}
