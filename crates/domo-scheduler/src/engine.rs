use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use domo_core::{EventKind, RequestContext};
use domo_protocol::{EventSource, InboundEvent, Trigger, TriggerType};
use domo_state::models::{
    JobExecutionCreate, QueueDirection, QueueLogEntry, Reminder, ReminderKind, ReminderStatus,
    ReminderUpdate,
};
use domo_state::StateStoreClient;
use domo_stream::MessageStream;

use crate::cron_eval;
use crate::error::{Result, SchedulerError};
use crate::wheel::TimeWheel;

/// How often due entries are checked.
const DISPATCH_PERIOD: Duration = Duration::from_secs(1);

/// Reconciles durable reminders against the in-process time wheel and
/// fires due entries into the inbound stream.
pub struct SchedulerEngine {
    state: Arc<StateStoreClient>,
    stream: Arc<dyn MessageStream>,
    stream_name: String,
    wheel: TimeWheel,
    /// Snapshot of each armed reminder, refreshed on every reconcile.
    known: Mutex<HashMap<String, Reminder>>,
    reconcile_period: Duration,
}

impl SchedulerEngine {
    pub fn new(
        state: Arc<StateStoreClient>,
        stream: Arc<dyn MessageStream>,
        stream_name: impl Into<String>,
        reconcile_period: Duration,
    ) -> Self {
        Self {
            state,
            stream,
            stream_name: stream_name.into(),
            wheel: TimeWheel::new(),
            known: Mutex::new(HashMap::new()),
            reconcile_period,
        }
    }

    pub fn wheel(&self) -> &TimeWheel {
        &self.wheel
    }

    /// Main loop: reconcile on the configured period, dispatch every
    /// second, until `shutdown` broadcasts `true`. Shutdown disarms all
    /// pending wheel entries.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(period_secs = self.reconcile_period.as_secs(), "scheduler engine started");

        let mut reconcile = tokio::time::interval(self.reconcile_period);
        let mut dispatch = tokio::time::interval(DISPATCH_PERIOD);
        loop {
            tokio::select! {
                _ = reconcile.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        error!(error = %e, "scheduler reconcile failed");
                    }
                }
                _ = dispatch.tick() => {
                    self.dispatch_due().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(pending = self.wheel.len(), "scheduler engine shutting down");
                        self.wheel.clear();
                        break;
                    }
                }
            }
        }
    }

    /// One reconciliation pass: after it returns, the wheel's entry set
    /// equals the store's active-reminder set (modulo in-flight fires).
    pub async fn reconcile_once(&self) -> Result<()> {
        let ctx = RequestContext::new_root();
        let reminders = self.state.list_scheduled_reminders(&ctx).await?;
        let now = Utc::now();

        let mut active_ids: Vec<String> = Vec::with_capacity(reminders.len());
        for reminder in &reminders {
            if reminder.status != ReminderStatus::Active {
                continue;
            }
            active_ids.push(reminder.id.clone());
            self.known
                .lock()
                .unwrap()
                .insert(reminder.id.clone(), reminder.clone());

            if self.wheel.contains(&reminder.id) {
                continue;
            }
            match next_fire(reminder, now) {
                Ok(Some(fire_at)) => {
                    debug!(reminder_id = %reminder.id, %fire_at, "armed reminder");
                    self.wheel.arm(&reminder.id, fire_at);
                }
                Ok(None) => {
                    warn!(reminder_id = %reminder.id, "reminder has no future occurrence, skipping");
                }
                Err(e) => {
                    warn!(reminder_id = %reminder.id, error = %e, "unschedulable reminder, skipping");
                }
            }
        }

        // Disarm wheel entries whose reminder vanished or went inactive.
        for armed in self.wheel.armed_ids() {
            if !active_ids.contains(&armed) {
                debug!(reminder_id = %armed, "disarming removed reminder");
                self.wheel.disarm(&armed);
                self.known.lock().unwrap().remove(&armed);
            }
        }

        debug!(armed = self.wheel.len(), fetched = active_ids.len(), "reconcile complete");
        Ok(())
    }

    /// Fire everything due. Failures are logged per entry; the loop (and
    /// the other due entries) always proceed.
    pub async fn dispatch_due(&self) {
        let now = Utc::now();
        for (reminder_id, fire_at) in self.wheel.take_due(now) {
            let snapshot = self.known.lock().unwrap().get(&reminder_id).cloned();
            let Some(reminder) = snapshot else {
                warn!(reminder_id = %reminder_id, "due entry has no snapshot, skipping");
                continue;
            };
            if let Err(e) = self.fire(&reminder, fire_at).await {
                error!(
                    event = %EventKind::JobError,
                    reminder_id = %reminder_id,
                    error = %e,
                    "reminder fire failed"
                );
            }
        }
    }

    async fn fire(&self, reminder: &Reminder, fire_at: chrono::DateTime<Utc>) -> Result<()> {
        let ctx = RequestContext::new_root().with_user(reminder.user_id);
        let started = Utc::now();
        info!(
            event = %EventKind::JobStart,
            reminder_id = %reminder.id,
            user_id = reminder.user_id,
            kind = ?reminder.kind,
            "firing reminder"
        );

        // Observability row; a failed insert must not block the fire.
        let execution = self
            .state
            .create_job_execution(
                &ctx,
                &JobExecutionCreate {
                    job_id: format!("reminder_{}", reminder.id),
                    job_type: "reminder".to_string(),
                    scheduled_at: fire_at,
                },
            )
            .await;
        let execution_id = match execution {
            Ok(row) => {
                let _ = self.state.job_execution_started(&ctx, row.id).await;
                Some(row.id)
            }
            Err(e) => {
                warn!(reminder_id = %reminder.id, error = %e, "job execution insert failed");
                None
            }
        };

        let result = self.emit_and_transition(&ctx, reminder).await;
        let duration_ms = (Utc::now() - started).num_milliseconds();

        match (&result, execution_id) {
            (Ok(()), Some(id)) => {
                let _ = self
                    .state
                    .job_execution_completed(&ctx, id, Some(&format!("fired in {duration_ms}ms")))
                    .await;
            }
            (Err(e), Some(id)) => {
                let _ = self.state.job_execution_failed(&ctx, id, &e.to_string()).await;
            }
            _ => {}
        }

        if result.is_ok() {
            info!(
                event = %EventKind::JobEnd,
                reminder_id = %reminder.id,
                duration_ms,
                "reminder fired"
            );
        }
        result
    }

    async fn emit_and_transition(&self, ctx: &RequestContext, reminder: &Reminder) -> Result<()> {
        let now = Utc::now();
        let trigger = InboundEvent::Trigger(Trigger {
            trigger_type: TriggerType::ReminderTriggered,
            user_id: reminder.user_id,
            source: EventSource::Cron,
            payload: serde_json::json!({
                "reminder_id": reminder.id,
                "type": reminder.kind,
                "user_id": reminder.user_id,
                "assistant_id": reminder.assistant_id,
                "details": reminder.payload,
            }),
            timestamp: now,
        });
        let payload = serde_json::to_vec(&trigger)?;
        let entry_id = self.stream.add(&payload).await?;
        debug!(
            event = %EventKind::QueuePush,
            reminder_id = %reminder.id,
            entry_id = %entry_id,
            "trigger appended to inbound stream"
        );
        self.state
            .log_queue_message(
                ctx,
                &QueueLogEntry {
                    queue_name: self.stream_name.clone(),
                    direction: QueueDirection::Inbound,
                    message_type: "trigger".to_string(),
                    payload: String::from_utf8_lossy(&payload).into_owned(),
                    correlation_id: Some(ctx.correlation_id.clone()),
                    user_id: Some(reminder.user_id),
                    source: Some("cron".to_string()),
                },
            )
            .await;

        match reminder.kind {
            ReminderKind::OneShot => {
                // Completed exactly once; the next reconcile drops it.
                self.state
                    .update_reminder(
                        ctx,
                        &reminder.id,
                        &ReminderUpdate {
                            status: Some(ReminderStatus::Completed),
                            last_triggered_at: Some(now),
                        },
                    )
                    .await?;
                self.known.lock().unwrap().remove(&reminder.id);
            }
            ReminderKind::Recurring => {
                self.state
                    .update_reminder(
                        ctx,
                        &reminder.id,
                        &ReminderUpdate {
                            status: None,
                            last_triggered_at: Some(now),
                        },
                    )
                    .await?;
                // Re-arm at the next occurrence.
                match next_fire(reminder, now) {
                    Ok(Some(next)) => {
                        self.wheel.arm(&reminder.id, next);
                    }
                    Ok(None) => {
                        warn!(reminder_id = %reminder.id, "recurring reminder has no next occurrence");
                    }
                    Err(e) => {
                        warn!(reminder_id = %reminder.id, error = %e, "failed to re-arm recurring reminder");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Next fire instant for a reminder, strictly in the future except for
/// overdue one-shots, which fire immediately.
fn next_fire(
    reminder: &Reminder,
    now: chrono::DateTime<Utc>,
) -> Result<Option<chrono::DateTime<Utc>>> {
    match reminder.kind {
        ReminderKind::OneShot => {
            let at = reminder
                .trigger_at
                .ok_or_else(|| SchedulerError::InvalidSchedule {
                    reminder_id: reminder.id.clone(),
                    reason: "one_shot reminder without trigger_at".to_string(),
                })?;
            // Overdue while the process was down: fire now rather than never.
            Ok(Some(at.max(now)))
        }
        ReminderKind::Recurring => {
            let expr = reminder
                .cron_expression
                .as_deref()
                .ok_or_else(|| SchedulerError::InvalidSchedule {
                    reminder_id: reminder.id.clone(),
                    reason: "recurring reminder without cron_expression".to_string(),
                })?;
            let schedule = cron_eval::parse_expression(&reminder.id, expr)?;
            let tz = cron_eval::parse_timezone(&reminder.id, reminder.timezone.as_deref())?;
            Ok(cron_eval::next_occurrence(&schedule, tz, now))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn one_shot(id: &str, at: chrono::DateTime<Utc>) -> Reminder {
        Reminder {
            id: id.to_string(),
            user_id: 7,
            assistant_id: "sec-1".into(),
            created_by_assistant_id: None,
            kind: ReminderKind::OneShot,
            trigger_at: Some(at),
            cron_expression: None,
            timezone: None,
            payload: serde_json::json!({"text": "stretch"}),
            status: ReminderStatus::Active,
            last_triggered_at: None,
        }
    }

    #[test]
    fn overdue_one_shot_fires_immediately() {
        let now = Utc::now();
        let reminder = one_shot("r1", now - ChronoDuration::minutes(10));
        let next = next_fire(&reminder, now).unwrap().unwrap();
        assert_eq!(next, now);
    }

    #[test]
    fn future_one_shot_keeps_its_instant() {
        let now = Utc::now();
        let at = now + ChronoDuration::minutes(5);
        let reminder = one_shot("r1", at);
        assert_eq!(next_fire(&reminder, now).unwrap().unwrap(), at);
    }

    #[test]
    fn one_shot_without_instant_is_invalid() {
        let mut reminder = one_shot("r1", Utc::now());
        reminder.trigger_at = None;
        assert!(next_fire(&reminder, Utc::now()).is_err());
    }

    #[test]
    fn recurring_without_expression_is_invalid() {
        let mut reminder = one_shot("r1", Utc::now());
        reminder.kind = ReminderKind::Recurring;
        reminder.trigger_at = None;
        assert!(next_fire(&reminder, Utc::now()).is_err());
    }
}
