//! `time` tool — current date and time in the user's timezone.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::error::{ToolError, ToolErrorCode};
use crate::{AssistantTool, ToolContext};

pub struct TimeTool {
    name: String,
    description: String,
    user_timezone: Option<String>,
}

impl TimeTool {
    pub fn new(name: &str, description: &str, ctx: &ToolContext) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            user_timezone: ctx.user_timezone.clone(),
        }
    }
}

#[async_trait]
impl AssistantTool for TimeTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        // Explicit argument wins over the user's profile timezone.
        let tz_name = args
            .get("timezone")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| self.user_timezone.clone())
            .unwrap_or_else(|| "UTC".to_string());

        let tz: chrono_tz::Tz = tz_name.parse().map_err(|_| {
            ToolError::new(
                &self.name,
                ToolErrorCode::InvalidInput,
                format!("unknown timezone: {tz_name}"),
            )
        })?;

        let now = Utc::now().with_timezone(&tz);
        Ok(format!(
            "{} ({})",
            now.format("%Y-%m-%d %H:%M:%S %Z"),
            tz_name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(user_tz: Option<&str>) -> TimeTool {
        TimeTool {
            name: "time".into(),
            description: "current time".into(),
            user_timezone: user_tz.map(String::from),
        }
    }

    #[tokio::test]
    async fn argument_timezone_wins() {
        let result = tool(Some("Europe/Berlin"))
            .execute(serde_json::json!({"timezone": "Asia/Tokyo"}))
            .await
            .unwrap();
        assert!(result.contains("Asia/Tokyo"));
    }

    #[tokio::test]
    async fn falls_back_to_user_timezone_then_utc() {
        let result = tool(Some("Europe/Berlin"))
            .execute(serde_json::json!({}))
            .await
            .unwrap();
        assert!(result.contains("Europe/Berlin"));

        let result = tool(None).execute(serde_json::json!({})).await.unwrap();
        assert!(result.contains("UTC"));
    }

    #[tokio::test]
    async fn unknown_timezone_is_invalid_input() {
        let err = tool(None)
            .execute(serde_json::json!({"timezone": "Mars/Olympus"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ToolErrorCode::InvalidInput);
    }
}
