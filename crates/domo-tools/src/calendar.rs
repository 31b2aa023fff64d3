//! Calendar tools — create and list events through the calendar
//! collaborator (which owns the OAuth flow and provider access).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use domo_state::models::CalendarEventCreate;

use crate::error::{from_state_error, ToolError};
use crate::{AssistantTool, ToolContext};

pub struct CalendarCreateTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

pub struct CalendarListTool {
    name: String,
    description: String,
    ctx: ToolContext,
}

impl CalendarCreateTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for CalendarCreateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'title' is required"))?;

        let start = parse_instant(&self.name, &args, "start")?
            .ok_or_else(|| ToolError::invalid_input(&self.name, "'start' is required"))?;
        let end = parse_instant(&self.name, &args, "end")?;
        if let Some(end) = end {
            if end <= start {
                return Err(ToolError::invalid_input(&self.name, "'end' must be after 'start'"));
            }
        }

        let event = self
            .ctx
            .state
            .create_calendar_event(
                &self.ctx.request,
                &CalendarEventCreate {
                    user_id: self.ctx.user_id,
                    title: title.to_string(),
                    start,
                    end,
                    description: args
                        .get("description")
                        .and_then(Value::as_str)
                        .map(String::from),
                },
            )
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        Ok(format!(
            "Event '{}' created for {} (id {}).",
            event.title,
            event.start.to_rfc3339(),
            event.id
        ))
    }
}

impl CalendarListTool {
    pub fn new(name: &str, description: &str, ctx: ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ctx,
        }
    }
}

#[async_trait]
impl AssistantTool for CalendarListTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let time_min = parse_instant(&self.name, &args, "time_min")?
            .unwrap_or_else(Utc::now);
        // Default window: the next 7 days.
        let time_max = parse_instant(&self.name, &args, "time_max")?
            .unwrap_or_else(|| time_min + Duration::days(7));

        let events = self
            .ctx
            .state
            .list_calendar_events(&self.ctx.request, self.ctx.user_id, Some(time_min), Some(time_max))
            .await
            .map_err(|e| from_state_error(&self.name, e))?;

        if events.is_empty() {
            return Ok("No events in that window.".to_string());
        }
        let lines: Vec<String> = events
            .iter()
            .map(|e| format!("- {} — {}", e.start.to_rfc3339(), e.title))
            .collect();
        Ok(lines.join("\n"))
    }
}

fn parse_instant(
    tool_name: &str,
    args: &Value,
    field: &str,
) -> Result<Option<DateTime<Utc>>, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    ToolError::invalid_input(tool_name, format!("invalid '{field}': {e}"))
                })
        })
        .transpose()
}
