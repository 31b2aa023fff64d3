//! JSON-schema gate between the LLM's tool-call arguments and execution.
//!
//! Definitions store their input schema as JSON text; it is compiled once
//! per tool build and every call is validated before dispatch. Bad model
//! output becomes an `INVALID_INPUT` tool error the LLM can correct.

use jsonschema::Validator;
use serde_json::Value;

use crate::error::{ToolError, ToolErrorCode};

#[derive(Debug)]
pub struct CompiledSchema {
    schema: Value,
    validator: Validator,
}

impl CompiledSchema {
    /// Compile schema source text. Fails the tool build (not the whole
    /// tool set) when the text is not a valid schema.
    pub fn compile(tool_name: &str, schema_text: &str) -> Result<Self, ToolError> {
        let schema: Value = serde_json::from_str(schema_text).map_err(|e| {
            ToolError::new(
                tool_name,
                ToolErrorCode::ConfigurationError,
                format!("input schema is not valid JSON: {e}"),
            )
        })?;
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            ToolError::new(
                tool_name,
                ToolErrorCode::ConfigurationError,
                format!("input schema does not compile: {e}"),
            )
        })?;
        Ok(Self { schema, validator })
    }

    /// The schema value forwarded to the LLM as the tool's parameters.
    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    pub fn validate(&self, tool_name: &str, args: &Value) -> Result<(), ToolError> {
        if let Err(error) = self.validator.validate(args) {
            return Err(ToolError::invalid_input(
                tool_name,
                format!("arguments do not match schema: {error}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "message": {"type": "string"}
        },
        "required": ["message"],
        "additionalProperties": false
    }"#;

    #[test]
    fn valid_arguments_pass() {
        let schema = CompiledSchema::compile("t", SCHEMA).unwrap();
        assert!(schema
            .validate("t", &serde_json::json!({"message": "hi"}))
            .is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let schema = CompiledSchema::compile("t", SCHEMA).unwrap();
        let err = schema.validate("t", &serde_json::json!({})).unwrap_err();
        assert_eq!(err.code, ToolErrorCode::InvalidInput);
    }

    #[test]
    fn extra_field_fails_closed_schema() {
        let schema = CompiledSchema::compile("t", SCHEMA).unwrap();
        let err = schema
            .validate("t", &serde_json::json!({"message": "hi", "x": 1}))
            .unwrap_err();
        assert_eq!(err.code, ToolErrorCode::InvalidInput);
    }

    #[test]
    fn invalid_schema_text_is_a_configuration_error() {
        let err = CompiledSchema::compile("t", "{not json").unwrap_err();
        assert_eq!(err.code, ToolErrorCode::ConfigurationError);
    }
}
