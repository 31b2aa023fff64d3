use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use domo_core::{EventKind, RequestContext};
use domo_llm::{
    BatchProvider, BatchRequestItem, BatchResultItem, BatchStatus, ChatMessage, ChatRequest,
    EmbeddingProvider,
};
use domo_state::models::{GlobalSettings, MemoryCreate, MemorySearchRequest};
use domo_state::StateStoreClient;

use crate::error::{ExtractorError, Result};
use crate::facts::{
    build_prompt, decide_dedup, parse_facts, DedupAction, EXTRACTION_INSTRUCTIONS,
};

/// How often a submitted batch is polled.
const POLL_PERIOD: Duration = Duration::from_secs(30);
/// Give up waiting for a batch after this long; the BatchJob row stays
/// `submitted` and the next cycle resumes polling.
const POLL_BUDGET: Duration = Duration::from_secs(1800);

/// Periodic dialog → facts batch worker.
pub struct MemoryExtractor {
    state: Arc<StateStoreClient>,
    batch: Arc<dyn BatchProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    /// Model named in each batch request (from config; settings may
    /// override per cycle).
    model: String,
    fallback_interval: Duration,
}

impl MemoryExtractor {
    pub fn new(
        state: Arc<StateStoreClient>,
        batch: Arc<dyn BatchProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: impl Into<String>,
        fallback_interval: Duration,
    ) -> Self {
        Self {
            state,
            batch,
            embedder,
            model: model.into(),
            fallback_interval,
        }
    }

    /// Periodic loop. A failed cycle is logged and retried next interval;
    /// the loop itself never dies.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("memory extractor started");
        loop {
            let interval = self.cycle_interval().await;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(event = %EventKind::JobError, error = %e, "memory extraction cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("memory extractor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn cycle_interval(&self) -> Duration {
        let ctx = RequestContext::new_root();
        match self.state.get_global_settings(&ctx).await {
            Ok(settings) => Duration::from_secs(settings.memory_extraction_interval_hours() * 3600),
            Err(_) => self.fallback_interval,
        }
    }

    /// One full extraction cycle.
    pub async fn run_once(&self) -> Result<()> {
        let ctx = RequestContext::new_root();
        let settings = self.state.get_global_settings(&ctx).await?;
        if !settings.memory_extraction_enabled() {
            debug!("memory extraction disabled, skipping cycle");
            return Ok(());
        }

        // Resume anything a previous process left behind before starting
        // new work.
        self.resume_unfinished(&ctx, &settings).await;

        let since = Utc::now()
            - chrono::Duration::hours(settings.memory_extraction_interval_hours() as i64);
        let conversations = self
            .state
            .list_conversations(&ctx, since, settings.memory_extraction_min_messages())
            .await?;
        if conversations.is_empty() {
            info!("no conversations eligible for extraction");
            return Ok(());
        }

        // One batch item per conversation, listing known facts so the
        // model does not re-extract them.
        let mut items = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let existing = self
                .state
                .list_memories(&ctx, conversation.user_id)
                .await
                .unwrap_or_default();
            let request = ChatRequest::new(
                self.model.clone(),
                vec![
                    ChatMessage::system(EXTRACTION_INSTRUCTIONS),
                    ChatMessage::user(build_prompt(conversation, &existing)),
                ],
            );
            items.push(BatchRequestItem {
                custom_id: format!(
                    "conv_{}_{}",
                    conversation.user_id, conversation.assistant_id
                ),
                request,
            });
        }

        let batch_id = self.batch.submit_batch(items).await?;
        let job = self
            .state
            .create_batch_job(&ctx, &batch_id, conversations.len() as u32)
            .await?;
        info!(
            event = %EventKind::JobStart,
            batch_id = %batch_id,
            conversations = conversations.len(),
            "extraction batch submitted"
        );

        match self.wait_for_batch(&batch_id).await? {
            Some(results) => {
                let (extracted, saved) = self.process_results(&ctx, &settings, &results).await;
                self.state
                    .update_batch_job(&ctx, job.id, "completed", extracted, saved, None)
                    .await?;
                info!(
                    event = %EventKind::JobEnd,
                    batch_id = %batch_id,
                    extracted,
                    saved,
                    "extraction batch processed"
                );
            }
            None => {
                // Budget exhausted; leave the row `submitted` for resume.
                warn!(batch_id = %batch_id, "batch still in progress, will resume next cycle");
            }
        }
        Ok(())
    }

    /// Poll unfinished BatchJob rows left by earlier runs.
    async fn resume_unfinished(&self, ctx: &RequestContext, settings: &GlobalSettings) {
        let unfinished = match self.state.list_unfinished_batch_jobs(ctx).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "failed to list unfinished batch jobs");
                return;
            }
        };
        for job in unfinished {
            debug!(batch_id = %job.provider_batch_id, "resuming unfinished batch job");
            match self.batch.poll_batch(&job.provider_batch_id).await {
                Ok(BatchStatus::Completed) => {
                    match self.batch.collect_batch(&job.provider_batch_id).await {
                        Ok(results) => {
                            let (extracted, saved) =
                                self.process_results(ctx, settings, &results).await;
                            let _ = self
                                .state
                                .update_batch_job(ctx, job.id, "completed", extracted, saved, None)
                                .await;
                        }
                        Err(e) => {
                            warn!(batch_id = %job.provider_batch_id, error = %e, "collect failed on resume");
                        }
                    }
                }
                Ok(BatchStatus::Failed { message }) => {
                    let _ = self
                        .state
                        .update_batch_job(ctx, job.id, "failed", 0, 0, Some(&message))
                        .await;
                }
                Ok(BatchStatus::InProgress) => {}
                Err(e) => {
                    warn!(batch_id = %job.provider_batch_id, error = %e, "poll failed on resume");
                }
            }
        }
    }

    /// Poll until terminal or budget exhausted. `None` = still running.
    async fn wait_for_batch(&self, batch_id: &str) -> Result<Option<Vec<BatchResultItem>>> {
        let deadline = tokio::time::Instant::now() + POLL_BUDGET;
        loop {
            match self.batch.poll_batch(batch_id).await? {
                BatchStatus::Completed => {
                    return Ok(Some(self.batch.collect_batch(batch_id).await?));
                }
                BatchStatus::Failed { message } => {
                    return Err(ExtractorError::BatchFailed {
                        batch_id: batch_id.to_string(),
                        message,
                    });
                }
                BatchStatus::InProgress => {
                    if tokio::time::Instant::now() >= deadline {
                        return Ok(None);
                    }
                    tokio::time::sleep(POLL_PERIOD).await;
                }
            }
        }
    }

    /// Dedup and persist every extracted fact. Returns (extracted, saved).
    async fn process_results(
        &self,
        ctx: &RequestContext,
        settings: &GlobalSettings,
        results: &[BatchResultItem],
    ) -> (u32, u32) {
        let mut extracted = 0u32;
        let mut saved = 0u32;

        for result in results {
            let Some(user_id) = parse_custom_id(&result.custom_id) else {
                warn!(custom_id = %result.custom_id, "unparseable batch custom id");
                continue;
            };
            if let Some(ref error) = result.error {
                warn!(custom_id = %result.custom_id, error = %error, "batch item failed");
                continue;
            }
            let facts = parse_facts(result.content.as_deref().unwrap_or(""));
            extracted += facts.len() as u32;

            for fact in facts {
                match self.save_fact(ctx, settings, user_id, &fact).await {
                    Ok(true) => saved += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(user_id, error = %e, "failed to persist extracted fact");
                    }
                }
            }
            self.enforce_cap(ctx, settings, user_id).await;
        }
        (extracted, saved)
    }

    /// Returns `Ok(true)` when a row was inserted or updated.
    async fn save_fact(
        &self,
        ctx: &RequestContext,
        settings: &GlobalSettings,
        user_id: i64,
        fact: &crate::facts::ExtractedFact,
    ) -> Result<bool> {
        let embedding = self.embedder.embed(&fact.text).await?;
        let hits = self
            .state
            .search_memories(
                ctx,
                &MemorySearchRequest {
                    query: None,
                    embedding: Some(embedding.clone()),
                    user_id,
                    limit: 1,
                    threshold: settings.memory_dedup_threshold() as f32,
                },
            )
            .await?;
        let best = hits
            .first()
            .map(|hit| (hit.memory.id, hit.similarity as f64));

        match decide_dedup(
            best,
            settings.memory_update_threshold(),
            settings.memory_dedup_threshold(),
        ) {
            DedupAction::Skip => {
                debug!(user_id, text = %fact.text, "near-duplicate fact skipped");
                Ok(false)
            }
            DedupAction::Update { memory_id } => {
                self.state
                    .update_memory(ctx, memory_id, &fact.text, fact.importance, &embedding)
                    .await?;
                debug!(
                    event = %EventKind::MemorySaved,
                    user_id,
                    memory_id,
                    "memory refreshed from extraction"
                );
                Ok(true)
            }
            DedupAction::Insert => {
                let memory = self
                    .state
                    .create_memory(
                        ctx,
                        &MemoryCreate {
                            user_id,
                            assistant_id: None,
                            text: fact.text.clone(),
                            memory_type: fact.memory_type,
                            importance: fact.importance,
                            embedding,
                        },
                    )
                    .await?;
                debug!(
                    event = %EventKind::MemorySaved,
                    user_id,
                    memory_id = memory.id,
                    "memory inserted from extraction"
                );
                Ok(true)
            }
        }
    }

    /// Evict lowest-importance, oldest memories above the per-user cap.
    async fn enforce_cap(&self, ctx: &RequestContext, settings: &GlobalSettings, user_id: i64) {
        let cap = settings.memory_user_cap() as usize;
        let mut memories = match self.state.list_memories(ctx, user_id).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!(user_id, error = %e, "failed to list memories for cap check");
                return;
            }
        };
        if memories.len() <= cap {
            return;
        }

        memories.sort_by(|a, b| {
            a.importance
                .cmp(&b.importance)
                .then(a.created_at.cmp(&b.created_at))
        });
        let excess = memories.len() - cap;
        for memory in memories.into_iter().take(excess) {
            if let Err(e) = self.state.delete_memory(ctx, memory.id).await {
                warn!(memory_id = memory.id, error = %e, "failed to evict memory");
            } else {
                info!(user_id, memory_id = memory.id, "evicted memory over cap");
            }
        }
    }
}

/// `conv_<user>_<assistant>` → user id.
fn parse_custom_id(custom_id: &str) -> Option<i64> {
    custom_id
        .strip_prefix("conv_")?
        .split('_')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_id_parsing() {
        assert_eq!(parse_custom_id("conv_42_sec-1"), Some(42));
        assert_eq!(parse_custom_id("conv_9_a_b_c"), Some(9));
        assert_eq!(parse_custom_id("nope"), None);
        assert_eq!(parse_custom_id("conv_x_y"), None);
    }
}
