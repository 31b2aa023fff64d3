//! Reminder tools — create, list, and delete scheduled reminders.
//!
//! The assistant calls these when the user asks "remind me tomorrow at 9"
//! or "stop the daily report". Reminders persist in the state store; the
//! scheduler turns them into inbound trigger events at fire time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use domo_state::models::{Reminder, ReminderCreate, ReminderKind, ReminderStatus, ReminderUpdate};

use crate::error::{from_state_error, ToolError, ToolErrorCode};
use crate::{AssistantTool, ToolContext};

pub struct ReminderCreateTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

pub struct ReminderListTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

pub struct ReminderDeleteTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

impl ReminderCreateTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for ReminderCreateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let payload = args.get("payload").cloned().unwrap_or_else(|| {
            serde_json::json!({
                "text": args.get("message").and_then(Value::as_str).unwrap_or(""),
            })
        });

        let trigger_at = args
            .get("trigger_at")
            .and_then(Value::as_str)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        ToolError::invalid_input(&self.name, format!("invalid trigger_at: {e}"))
                    })
            })
            .transpose()?;
        let cron_expression = args
            .get("cron_expression")
            .and_then(Value::as_str)
            .map(String::from);

        // One-shot XOR recurring; exactly one of the two must be present.
        let kind = match (&trigger_at, &cron_expression) {
            (Some(_), None) => ReminderKind::OneShot,
            (None, Some(expr)) => {
                validate_cron(&self.name, expr)?;
                ReminderKind::Recurring
            }
            _ => {
                return Err(ToolError::invalid_input(
                    &self.name,
                    "exactly one of 'trigger_at' or 'cron_expression' is required",
                ))
            }
        };

        if kind == ReminderKind::OneShot {
            if let Some(at) = trigger_at {
                if at <= Utc::now() {
                    return Err(ToolError::invalid_input(
                        &self.name,
                        "trigger_at must be in the future",
                    ));
                }
            }
        }

        let timezone = args
            .get("timezone")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| self.ctx.user_timezone.clone());

        let create = ReminderCreate {
            user_id: self.ctx.user_id,
            assistant_id: self.ctx.assistant_id.clone(),
            created_by_assistant_id: Some(self.ctx.assistant_id.clone()),
            kind,
            trigger_at,
            cron_expression,
            timezone,
            payload,
        };

        let reminder = self
            .ctx
            .state
            .create_reminder(&self.ctx.request, &create)
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        info!(
            reminder_id = %reminder.id,
            user_id = self.ctx.user_id,
            kind = ?reminder.kind,
            "reminder created"
        );
        Ok(render_created(&reminder))
    }
}

impl ReminderListTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for ReminderListTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, _args: Value) -> Result<String, ToolError> {
        let reminders = self
            .ctx
            .state
            .list_user_reminders(&self.ctx.request, self.ctx.user_id)
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        let active: Vec<&Reminder> = reminders
            .iter()
            .filter(|r| r.status == ReminderStatus::Active)
            .collect();
        if active.is_empty() {
            return Ok("No active reminders.".to_string());
        }

        let mut lines = Vec::with_capacity(active.len());
        for reminder in active {
            lines.push(render_line(reminder));
        }
        Ok(lines.join("\n"))
    }
}

impl ReminderDeleteTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for ReminderDeleteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let reminder_id = args
            .get("reminder_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'reminder_id' is required"))?;

        // Cancellation is a status transition, not a row delete — the
        // scheduler drops the wheel entry on its next reconcile pass.
        self.ctx
            .state
            .update_reminder(
                &self.ctx.request,
                reminder_id,
                &ReminderUpdate {
                    status: Some(ReminderStatus::Cancelled),
                    last_triggered_at: None,
                },
            )
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        info!(reminder_id, user_id = self.ctx.user_id, "reminder cancelled");
        Ok(format!("Reminder {reminder_id} cancelled."))
    }
}

/// Check a 5-field cron expression by normalizing to the 6-field form the
/// scheduler evaluates (seconds prepended).
fn validate_cron(tool_name: &str, expr: &str) -> Result<(), ToolError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(ToolError::invalid_input(
            tool_name,
            format!("cron expression must have 5 fields, got {fields}"),
        ));
    }
    let normalized = format!("0 {expr}");
    normalized
        .parse::<cron::Schedule>()
        .map(|_| ())
        .map_err(|e| ToolError::invalid_input(tool_name, format!("invalid cron expression: {e}")))
}

fn render_created(reminder: &Reminder) -> String {
    match reminder.kind {
        ReminderKind::OneShot => format!(
            "Reminder {} created, fires at {}.",
            reminder.id,
            reminder
                .trigger_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        ),
        ReminderKind::Recurring => format!(
            "Recurring reminder {} created ({} {}).",
            reminder.id,
            reminder.cron_expression.as_deref().unwrap_or(""),
            reminder.timezone.as_deref().unwrap_or("UTC"),
        ),
    }
}

fn render_line(reminder: &Reminder) -> String {
    let when = match reminder.kind {
        ReminderKind::OneShot => reminder
            .trigger_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "?".into()),
        ReminderKind::Recurring => format!(
            "cron '{}' ({})",
            reminder.cron_expression.as_deref().unwrap_or("?"),
            reminder.timezone.as_deref().unwrap_or("UTC"),
        ),
    };
    let text = reminder
        .payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or("");
    format!("- {} | {} | {}", reminder.id, when, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_cron_accepted() {
        assert!(validate_cron("t", "0 10 * * *").is_ok());
        assert!(validate_cron("t", "*/5 9-17 * * 1-5").is_ok());
    }

    #[test]
    fn wrong_field_count_rejected() {
        assert!(validate_cron("t", "* * * *").is_err());
        assert!(validate_cron("t", "0 0 10 * * *").is_err());
    }

    #[test]
    fn garbage_cron_rejected() {
        assert!(validate_cron("t", "not a cron at all!").is_err());
    }
}
