use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use domo_core::context::CORRELATION_HEADER;
use domo_core::{EventKind, RequestContext};

use crate::breaker::CircuitBreaker;
use crate::error::{Result, StateStoreError};
use crate::models::*;

/// Retry budget per request: first try plus two re-tries.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff before re-try N (seconds), doubling, capped at 10.
const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 10;

/// Typed client for the state-store REST API.
///
/// Cheap to clone; the breaker is shared across clones so every consumer
/// task sees the same open/closed decision.
#[derive(Clone)]
pub struct StateStoreClient {
    http: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
}

impl StateStoreClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StateStoreError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            breaker: Arc::new(CircuitBreaker::new()),
        })
    }

    // --- users -------------------------------------------------------------

    pub async fn get_user(&self, ctx: &RequestContext, user_id: i64) -> Result<Option<User>> {
        self.get_optional(ctx, &format!("/api/users/{user_id}")).await
    }

    // --- assistants --------------------------------------------------------

    pub async fn list_assistants(&self, ctx: &RequestContext) -> Result<Vec<Assistant>> {
        self.get_required(ctx, "/api/assistants/").await
    }

    pub async fn get_assistant(
        &self,
        ctx: &RequestContext,
        assistant_id: &str,
    ) -> Result<Option<Assistant>> {
        self.get_optional(ctx, &format!("/api/assistants/{assistant_id}"))
            .await
    }

    pub async fn get_assistant_tools(
        &self,
        ctx: &RequestContext,
        assistant_id: &str,
    ) -> Result<Vec<ToolDefinition>> {
        self.get_required(ctx, &format!("/api/assistants/{assistant_id}/tools"))
            .await
    }

    // --- secretary assignment ----------------------------------------------

    pub async fn get_user_secretary(
        &self,
        ctx: &RequestContext,
        user_id: i64,
    ) -> Result<Option<Assistant>> {
        self.get_optional(ctx, &format!("/api/users/{user_id}/secretary"))
            .await
    }

    pub async fn set_user_secretary(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        secretary_id: &str,
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::POST,
            &format!("/api/users/{user_id}/secretary"),
            Some(serde_json::json!({ "secretary_id": secretary_id })),
        )
        .await
        .map(|_| ())
    }

    // --- messages ----------------------------------------------------------

    pub async fn list_messages(
        &self,
        ctx: &RequestContext,
        query: &MessageQuery,
    ) -> Result<Vec<StoredMessage>> {
        let mut path = format!(
            "/api/messages?user_id={}&assistant_id={}&sort_by=id&sort_order=asc",
            query.user_id, query.assistant_id
        );
        if let Some(status) = query.status {
            path.push_str(&format!(
                "&status={}",
                serde_json::to_value(status)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default()
            ));
        }
        if let Some(id_gt) = query.id_gt {
            path.push_str(&format!("&id_gt={id_gt}"));
        }
        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={limit}"));
        }
        self.get_required(ctx, &path).await
    }

    pub async fn create_message(
        &self,
        ctx: &RequestContext,
        message: &MessageCreate,
    ) -> Result<StoredMessage> {
        let body = self
            .mutate(ctx, Method::POST, "/api/messages", Some(serde_json::to_value(message).map_err(decode_err)?))
            .await?;
        let created: StoredMessage = parse_body(body)?;
        debug!(
            event = %EventKind::MessageSaved,
            correlation_id = %ctx.correlation_id,
            message_id = created.id,
            role = ?created.role,
            "persisted message"
        );
        Ok(created)
    }

    pub async fn update_message(
        &self,
        ctx: &RequestContext,
        message_id: i64,
        update: &MessageUpdate,
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::PATCH,
            &format!("/api/messages/{message_id}"),
            Some(serde_json::to_value(update).map_err(decode_err)?),
        )
        .await?;
        debug!(
            event = %EventKind::MessageUpdated,
            correlation_id = %ctx.correlation_id,
            message_id,
            "updated message"
        );
        Ok(())
    }

    // --- summaries ----------------------------------------------------------

    pub async fn get_latest_summary(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        assistant_id: &str,
    ) -> Result<Option<Summary>> {
        self.get_optional(
            ctx,
            &format!("/api/user-summaries/latest?user_id={user_id}&assistant_id={assistant_id}"),
        )
        .await
    }

    /// Creates a new summary history entry — never an upsert.
    pub async fn create_summary(
        &self,
        ctx: &RequestContext,
        summary: &SummaryCreate,
    ) -> Result<Summary> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                "/api/user-summaries",
                Some(serde_json::to_value(summary).map_err(decode_err)?),
            )
            .await?;
        parse_body(body)
    }

    // --- user facts ---------------------------------------------------------

    pub async fn get_user_facts(
        &self,
        ctx: &RequestContext,
        user_id: i64,
    ) -> Result<Vec<UserFact>> {
        self.get_required(ctx, &format!("/api/users/{user_id}/facts")).await
    }

    pub async fn create_user_fact(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        fact: &str,
    ) -> Result<UserFact> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                &format!("/api/users/{user_id}/facts"),
                Some(serde_json::json!({ "fact": fact })),
            )
            .await?;
        parse_body(body)
    }

    pub async fn delete_fact(&self, ctx: &RequestContext, fact_id: i64) -> Result<()> {
        self.mutate(ctx, Method::DELETE, &format!("/api/facts/{fact_id}"), None)
            .await
            .map(|_| ())
    }

    // --- memories -----------------------------------------------------------

    pub async fn search_memories(
        &self,
        ctx: &RequestContext,
        request: &MemorySearchRequest,
    ) -> Result<Vec<MemorySearchHit>> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                "/api/memory/search",
                Some(serde_json::to_value(request).map_err(decode_err)?),
            )
            .await?;
        debug!(
            event = %EventKind::MemorySearch,
            correlation_id = %ctx.correlation_id,
            user_id = request.user_id,
            "searched memories"
        );
        parse_body(body)
    }

    pub async fn create_memory(
        &self,
        ctx: &RequestContext,
        memory: &MemoryCreate,
    ) -> Result<Memory> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                "/api/memory/",
                Some(serde_json::to_value(memory).map_err(decode_err)?),
            )
            .await?;
        debug!(
            event = %EventKind::MemorySaved,
            correlation_id = %ctx.correlation_id,
            user_id = memory.user_id,
            "saved memory"
        );
        parse_body(body)
    }

    pub async fn update_memory(
        &self,
        ctx: &RequestContext,
        memory_id: i64,
        text: &str,
        importance: u8,
        embedding: &[f32],
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::PATCH,
            &format!("/api/memory/{memory_id}"),
            Some(serde_json::json!({
                "text": text,
                "importance": importance,
                "embedding": embedding,
            })),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_memory(&self, ctx: &RequestContext, memory_id: i64) -> Result<()> {
        self.mutate(ctx, Method::DELETE, &format!("/api/memory/{memory_id}"), None)
            .await
            .map(|_| ())
    }

    pub async fn list_memories(
        &self,
        ctx: &RequestContext,
        user_id: i64,
    ) -> Result<Vec<Memory>> {
        self.get_required(ctx, &format!("/api/memory/?user_id={user_id}"))
            .await
    }

    // --- reminders ----------------------------------------------------------

    /// All reminders the scheduler should consider (status = active).
    pub async fn list_scheduled_reminders(&self, ctx: &RequestContext) -> Result<Vec<Reminder>> {
        self.get_required(ctx, "/api/reminders/scheduled").await
    }

    pub async fn create_reminder(
        &self,
        ctx: &RequestContext,
        reminder: &ReminderCreate,
    ) -> Result<Reminder> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                "/api/reminders/",
                Some(serde_json::to_value(reminder).map_err(decode_err)?),
            )
            .await?;
        parse_body(body)
    }

    pub async fn list_user_reminders(
        &self,
        ctx: &RequestContext,
        user_id: i64,
    ) -> Result<Vec<Reminder>> {
        self.get_required(ctx, &format!("/api/reminders/?user_id={user_id}"))
            .await
    }

    pub async fn update_reminder(
        &self,
        ctx: &RequestContext,
        reminder_id: &str,
        update: &ReminderUpdate,
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::PATCH,
            &format!("/api/reminders/{reminder_id}"),
            Some(serde_json::to_value(update).map_err(decode_err)?),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_reminder(&self, ctx: &RequestContext, reminder_id: &str) -> Result<()> {
        self.mutate(
            ctx,
            Method::DELETE,
            &format!("/api/reminders/{reminder_id}"),
            None,
        )
        .await
        .map(|_| ())
    }

    // --- calendar -----------------------------------------------------------

    pub async fn create_calendar_event(
        &self,
        ctx: &RequestContext,
        event: &CalendarEventCreate,
    ) -> Result<CalendarEvent> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                "/api/calendar/events",
                Some(serde_json::to_value(event).map_err(decode_err)?),
            )
            .await?;
        parse_body(body)
    }

    pub async fn list_calendar_events(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        time_min: Option<chrono::DateTime<chrono::Utc>>,
        time_max: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<CalendarEvent>> {
        let mut path = format!("/api/calendar/events?user_id={user_id}");
        if let Some(time_min) = time_min {
            path.push_str(&format!("&time_min={}", time_min.to_rfc3339()));
        }
        if let Some(time_max) = time_max {
            path.push_str(&format!("&time_max={}", time_max.to_rfc3339()));
        }
        self.get_required(ctx, &path).await
    }

    // --- global settings ----------------------------------------------------

    pub async fn get_global_settings(&self, ctx: &RequestContext) -> Result<GlobalSettings> {
        self.get_required(ctx, "/api/global-settings").await
    }

    // --- job executions -----------------------------------------------------

    pub async fn create_job_execution(
        &self,
        ctx: &RequestContext,
        job: &JobExecutionCreate,
    ) -> Result<JobExecution> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                "/api/job-executions",
                Some(serde_json::to_value(job).map_err(decode_err)?),
            )
            .await?;
        parse_body(body)
    }

    pub async fn job_execution_started(&self, ctx: &RequestContext, id: i64) -> Result<()> {
        self.mutate(
            ctx,
            Method::PATCH,
            &format!("/api/job-executions/{id}/start"),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn job_execution_completed(
        &self,
        ctx: &RequestContext,
        id: i64,
        result: Option<&str>,
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::PATCH,
            &format!("/api/job-executions/{id}/complete"),
            Some(serde_json::json!({ "result": result })),
        )
        .await
        .map(|_| ())
    }

    pub async fn job_execution_failed(
        &self,
        ctx: &RequestContext,
        id: i64,
        error: &str,
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::PATCH,
            &format!("/api/job-executions/{id}/fail"),
            Some(serde_json::json!({ "error": error })),
        )
        .await
        .map(|_| ())
    }

    // --- conversations -------------------------------------------------------

    /// Dialog slices accumulated since `since`, grouped by
    /// (user, assistant), with at least `min_messages` turns each.
    pub async fn list_conversations(
        &self,
        ctx: &RequestContext,
        since: chrono::DateTime<chrono::Utc>,
        min_messages: u64,
    ) -> Result<Vec<Conversation>> {
        self.get_required(
            ctx,
            &format!(
                "/api/conversations?since={}&min_messages={min_messages}",
                since.to_rfc3339()
            ),
        )
        .await
    }

    // --- batch jobs ---------------------------------------------------------

    pub async fn create_batch_job(
        &self,
        ctx: &RequestContext,
        provider_batch_id: &str,
        conversation_count: u32,
    ) -> Result<BatchJob> {
        let body = self
            .mutate(
                ctx,
                Method::POST,
                "/api/batch-jobs",
                Some(serde_json::json!({
                    "provider_batch_id": provider_batch_id,
                    "status": "submitted",
                    "conversation_count": conversation_count,
                })),
            )
            .await?;
        parse_body(body)
    }

    pub async fn update_batch_job(
        &self,
        ctx: &RequestContext,
        id: i64,
        status: &str,
        extracted: u32,
        saved: u32,
        error: Option<&str>,
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::PATCH,
            &format!("/api/batch-jobs/{id}"),
            Some(serde_json::json!({
                "status": status,
                "extracted_count": extracted,
                "saved_count": saved,
                "error": error,
            })),
        )
        .await
        .map(|_| ())
    }

    pub async fn list_unfinished_batch_jobs(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<BatchJob>> {
        self.get_required(ctx, "/api/batch-jobs?status=submitted").await
    }

    // --- graph checkpoints ---------------------------------------------------

    pub async fn get_checkpoint(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
    ) -> Result<Option<Value>> {
        self.get_optional(ctx, &format!("/api/checkpoints/{thread_id}"))
            .await
    }

    pub async fn put_checkpoint(
        &self,
        ctx: &RequestContext,
        thread_id: &str,
        state: &Value,
    ) -> Result<()> {
        self.mutate(
            ctx,
            Method::PUT,
            &format!("/api/checkpoints/{thread_id}"),
            Some(state.clone()),
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_checkpoint(&self, ctx: &RequestContext, thread_id: &str) -> Result<()> {
        self.mutate(
            ctx,
            Method::DELETE,
            &format!("/api/checkpoints/{thread_id}"),
            None,
        )
        .await
        .map(|_| ())
    }

    // --- queue logs ---------------------------------------------------------

    /// Best-effort observability record. Failure is logged and swallowed —
    /// queue logging must never block message processing.
    pub async fn log_queue_message(&self, ctx: &RequestContext, entry: &QueueLogEntry) {
        let body = match serde_json::to_value(entry) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to serialize queue log entry");
                return;
            }
        };
        if let Err(e) = self
            .mutate(ctx, Method::POST, "/api/queue-stats/log", Some(body))
            .await
        {
            warn!(
                error = %e,
                queue = %entry.queue_name,
                "failed to log queue message"
            );
        }
    }

    // --- request plumbing ----------------------------------------------------

    /// GET with 404 normalized to `Ok(None)`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Option<T>> {
        match self.request(ctx, Method::GET, path, None, true).await? {
            Some(body) => Ok(Some(parse_body(Some(body))?)),
            None => Ok(None),
        }
    }

    /// GET where 404 is a contract violation.
    async fn get_required<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<T> {
        let body = self.request(ctx, Method::GET, path, None, false).await?;
        parse_body(body)
    }

    /// Mutating call; 404 surfaces as `Http4xx`. Returns the response body
    /// when the store sent one (mutated resource) and `None` on 204.
    async fn mutate(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        self.request(ctx, method, path, body, false).await
    }

    /// One logical request: breaker gate, correlation header, bounded retry
    /// with exponential backoff on connect errors and 5xx.
    async fn request(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        body: Option<Value>,
        none_on_404: bool,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<StateStoreError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            self.breaker.check()?;

            if attempt > 1 {
                let delay =
                    (BACKOFF_BASE_SECS << (attempt - 2)).min(BACKOFF_CAP_SECS);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .http
                .request(method.clone(), &url)
                .header(CORRELATION_HEADER, &ctx.correlation_id);
            if let Some(ref body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Err(e) => {
                    self.breaker.record_failure();
                    warn!(
                        attempt,
                        max = MAX_ATTEMPTS,
                        error = %e,
                        %url,
                        "state store request failed, will retry"
                    );
                    last_error = Some(StateStoreError::Network(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.breaker.record_success();
                        if status == StatusCode::NO_CONTENT {
                            return Ok(None);
                        }
                        let value = resp
                            .json::<Value>()
                            .await
                            .map_err(|e| StateStoreError::Decode(e.to_string()))?;
                        return Ok(Some(value));
                    }

                    if status == StatusCode::NOT_FOUND && none_on_404 {
                        // The store answered; a missing row is not a failure.
                        self.breaker.record_success();
                        return Ok(None);
                    }

                    let message = resp.text().await.unwrap_or_default();
                    if status.is_server_error() {
                        self.breaker.record_failure();
                        warn!(
                            attempt,
                            max = MAX_ATTEMPTS,
                            status = status.as_u16(),
                            %url,
                            "state store returned 5xx, will retry"
                        );
                        last_error = Some(StateStoreError::Http5xx {
                            status: status.as_u16(),
                            message,
                        });
                    } else {
                        // 4xx: the store is healthy, our request is wrong.
                        self.breaker.record_success();
                        return Err(StateStoreError::Http4xx {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StateStoreError::Network("retries exhausted".into())))
    }
}

fn parse_body<T: DeserializeOwned>(body: Option<Value>) -> Result<T> {
    let value = body.ok_or_else(|| StateStoreError::Decode("expected a response body".into()))?;
    serde_json::from_value(value).map_err(|e| StateStoreError::Decode(e.to_string()))
}

fn decode_err(e: serde_json::Error) -> StateStoreError {
    StateStoreError::Decode(e.to_string())
}
