//! In-memory stream and counter fakes for consumer tests. Deterministic,
//! inspectable, no broker required.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use domo_protocol::{DlqEntry, PAYLOAD_FIELD};

use crate::error::Result;
use crate::{MessageStream, RetryCounter, StreamEntry};

/// In-memory [`MessageStream`]: appended entries are delivered in order;
/// un-acked reads go to a pending list that `read` re-delivers (the fake's
/// stand-in for idle reclamation).
#[derive(Default)]
pub struct InMemoryStream {
    inner: Mutex<StreamInner>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct StreamInner {
    queue: VecDeque<StreamEntry>,
    pending: HashMap<String, StreamEntry>,
    acked: Vec<String>,
    appended: Vec<Vec<u8>>,
    dlq: Vec<DlqEntry>,
}

impl InMemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an inbound entry, as a producer would. Returns its id.
    pub fn push(&self, payload: &[u8]) -> String {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut fields = HashMap::new();
        fields.insert(PAYLOAD_FIELD.to_string(), payload.to_vec());
        self.inner.lock().unwrap().queue.push_back(StreamEntry {
            id: id.clone(),
            fields,
        });
        id
    }

    /// Put a previously delivered, un-acked entry back up for delivery —
    /// the test's explicit "idle long enough, reclaimed" step.
    pub fn reclaim(&self, message_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.pending.remove(message_id) {
            inner.queue.push_back(entry);
        }
    }

    pub fn acked(&self) -> Vec<String> {
        self.inner.lock().unwrap().acked.clone()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().pending.keys().cloned().collect()
    }

    /// Payloads appended via `add` (i.e. what a producer/responder wrote).
    pub fn appended(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().appended.clone()
    }

    pub fn dlq_entries(&self) -> Vec<DlqEntry> {
        self.inner.lock().unwrap().dlq.clone()
    }
}

#[async_trait]
impl MessageStream for InMemoryStream {
    async fn read(
        &self,
        _count: usize,
        _block_ms: u64,
        _idle_reclaim_ms: u64,
    ) -> Result<Option<StreamEntry>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.queue.pop_front() {
            Some(entry) => {
                inner.pending.insert(entry.id.clone(), entry.clone());
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, message_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.remove(message_id);
        inner.acked.push(message_id.to_string());
        Ok(())
    }

    async fn add(&self, payload: &[u8]) -> Result<String> {
        self.inner.lock().unwrap().appended.push(payload.to_vec());
        Ok(format!("out-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn send_to_dlq(&self, entry: DlqEntry) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.dlq.push(entry);
        Ok(format!("dlq-{}", inner.dlq.len()))
    }
}

/// In-memory [`RetryCounter`] with the same atomic semantics as the Redis
/// implementation (minus expiry).
#[derive(Default)]
pub struct InMemoryRetryCounter {
    counts: Mutex<HashMap<String, u32>>,
    /// Every count observed by `incr`, for transition assertions.
    transitions: Mutex<Vec<(String, u32)>>,
}

impl InMemoryRetryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(String, u32)> {
        self.transitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetryCounter for InMemoryRetryCounter {
    async fn incr(&self, message_id: &str) -> Result<u32> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        self.transitions
            .lock()
            .unwrap()
            .push((message_id.to_string(), *count));
        Ok(*count)
    }

    async fn get(&self, message_id: &str) -> Result<u32> {
        Ok(*self
            .counts
            .lock()
            .unwrap()
            .get(message_id)
            .unwrap_or(&0))
    }

    async fn clear(&self, message_id: &str) -> Result<()> {
        self.counts.lock().unwrap().remove(message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_moves_entries_to_pending_until_acked() {
        let stream = InMemoryStream::new();
        let id = stream.push(b"{}");

        let entry = stream.read(1, 0, 0).await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(stream.pending_ids(), vec![id.clone()]);

        // Nothing new to read, but the entry is still pending (not lost).
        assert!(stream.read(1, 0, 0).await.unwrap().is_none());

        stream.reclaim(&id);
        let again = stream.read(1, 0, 0).await.unwrap().unwrap();
        assert_eq!(again.id, id);

        stream.ack(&id).await.unwrap();
        assert!(stream.pending_ids().is_empty());
        assert_eq!(stream.acked(), vec![id]);
    }
}
