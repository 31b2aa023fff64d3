//! Materializes invocable tools from declarative definitions.
//!
//! Build failures are isolated per definition: one misconfigured tool is
//! skipped with an error log while the rest of the assistant's tool set
//! stays available.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use domo_llm::ToolSpec;
use domo_state::models::{ToolDefinition, ToolKind};

use crate::calendar::{CalendarCreateTool, CalendarListTool};
use crate::error::{ToolError, ToolErrorCode};
use crate::memory::{MemorySaveTool, MemorySearchTool};
use crate::reminder::{ReminderCreateTool, ReminderDeleteTool, ReminderListTool};
use crate::schema::CompiledSchema;
use crate::sub_assistant::{SubAssistantRunner, SubAssistantTool};
use crate::time::TimeTool;
use crate::user_fact::UserFactTool;
use crate::web_search::WebSearchTool;
use crate::{AssistantTool, ToolContext};

/// One built tool plus its compiled input schema.
pub struct BoundTool {
    tool: Box<dyn AssistantTool>,
    schema: CompiledSchema,
}

/// The assistant's invocable tools for one graph run.
pub struct ToolSet {
    tools: Vec<BoundTool>,
}

impl ToolSet {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|b| b.tool.name()).collect()
    }

    /// Definitions in LLM-binding form.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|b| ToolSpec {
                name: b.tool.name().to_string(),
                description: b.tool.description().to_string(),
                input_schema: b.schema.as_value().clone(),
            })
            .collect()
    }

    /// Validate `args` against the tool's schema, then execute. Unknown
    /// names and schema violations come back as tool errors, not panics —
    /// the model sees them and can retry with corrected arguments.
    pub async fn execute(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let Some(bound) = self.tools.iter().find(|b| b.tool.name() == name) else {
            return Err(ToolError::new(
                name,
                ToolErrorCode::UnexpectedError,
                "unknown tool",
            ));
        };
        bound.schema.validate(name, args)?;
        bound.tool.execute(args.clone()).await
    }
}

/// Valid tool names: letters, digits, underscore, dash.
fn name_is_valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Build the tool set for one invocation.
///
/// `sub_runner` is the graph seam for `sub_assistant` definitions; passing
/// `None` (as the delegated invocation itself does) skips those tools,
/// which is what prevents unbounded delegation chains.
pub fn build_tool_set(
    definitions: &[ToolDefinition],
    ctx: &ToolContext,
    sub_runner: Option<Arc<dyn SubAssistantRunner>>,
) -> ToolSet {
    let mut tools: Vec<BoundTool> = Vec::with_capacity(definitions.len());

    for def in definitions {
        if !def.is_active {
            continue;
        }
        match build_one(def, ctx, sub_runner.as_ref()) {
            Ok(Some(bound)) => tools.push(bound),
            Ok(None) => {}
            Err(e) => {
                // Isolation: a broken definition must not take down the
                // assistant's other tools.
                error!(
                    tool = %def.name,
                    kind = ?def.kind,
                    error = %e,
                    "failed to build tool, skipping"
                );
            }
        }
    }

    ToolSet { tools }
}

fn build_one(
    def: &ToolDefinition,
    ctx: &ToolContext,
    sub_runner: Option<&Arc<dyn SubAssistantRunner>>,
) -> Result<Option<BoundTool>, ToolError> {
    if !name_is_valid(&def.name) {
        return Err(ToolError::new(
            &def.name,
            ToolErrorCode::ConfigurationError,
            "tool name must match [A-Za-z0-9_-]+",
        ));
    }

    let schema = CompiledSchema::compile(&def.name, &def.input_schema)?;

    let tool: Box<dyn AssistantTool> = match def.kind {
        ToolKind::Time => Box::new(TimeTool::new(&def.name, &def.description, ctx)),
        ToolKind::ReminderCreate => Box::new(ReminderCreateTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::ReminderList => Box::new(ReminderListTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::ReminderDelete => Box::new(ReminderDeleteTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::MemorySave => Box::new(MemorySaveTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::MemorySearch => Box::new(MemorySearchTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::UserFactSave => Box::new(UserFactTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::WebSearch => Box::new(WebSearchTool::new(&def.name, &def.description, ctx)),
        ToolKind::CalendarCreate => Box::new(CalendarCreateTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::CalendarList => Box::new(CalendarListTool::new(
            &def.name,
            &def.description,
            ctx.clone(),
        )),
        ToolKind::SubAssistant => {
            let Some(runner) = sub_runner else {
                warn!(tool = %def.name, "no delegation runner in this context, skipping sub-assistant tool");
                return Ok(None);
            };
            let delegate = def.delegate_assistant_id.as_deref().ok_or_else(|| {
                ToolError::new(
                    &def.name,
                    ToolErrorCode::ConfigurationError,
                    "sub_assistant tool has no delegate_assistant_id",
                )
            })?;
            Box::new(SubAssistantTool::new(
                &def.name,
                &def.description,
                delegate,
                ctx.user_id,
                ctx.request.clone(),
                Arc::clone(runner),
            ))
        }
    };

    Ok(Some(BoundTool { tool, schema }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(name_is_valid("time"));
        assert!(name_is_valid("reminder_create"));
        assert!(name_is_valid("calendar-list-2"));
        assert!(!name_is_valid(""));
        assert!(!name_is_valid("bad name"));
        assert!(!name_is_valid("emoji🙂"));
    }
}
