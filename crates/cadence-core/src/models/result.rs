//! Executor result contract.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Outcome reported by an executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
    /// Any other reported status; treated as failure
    #[serde(other)]
    Other,
}

/// Result returned by a step executor.
///
/// Mirrors the JSON contract `{status, message, data, requiresAcknowledgment}`.
/// `status` is required; an object without it is not a result. Missing `data` becomes an empty object and a missing `message` is replaced
/// by a generic placeholder when the result is normalized for a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub status: ResultStatus,

    #[serde(default)]
    pub message: String,

    #[serde(default = "empty_object", deserialize_with = "null_as_empty_object")]
    pub data: Value,

    /// Executor asks for a human acknowledgment even if the catalog does not
    #[serde(default, alias = "requires_acknowledgment")]
    pub requires_acknowledgment: bool,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn null_as_empty_object<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(if value.is_null() { empty_object() } else { value })
}

impl StepResult {
    /// Successful result with a payload.
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: ResultStatus::Success,
            message: message.into(),
            data,
            requires_acknowledgment: false,
        }
    }

    /// Failed result with an explanation.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            message: message.into(),
            data: empty_object(),
            requires_acknowledgment: false,
        }
    }

    /// Whether the executor reported success.
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// Fills in defaults that depend on the step id.
    pub fn normalized(mut self, step_id: &str) -> Self {
        if self.message.trim().is_empty() {
            self.message = format!("Execution of {step_id} completed");
        }
        if self.data.is_null() {
            self.data = empty_object();
        }
        self
    }

    /// Parses executor output that should contain a result object.
    ///
    /// Output is tried as JSON first; when other text surrounds the object the
    /// outermost `{...}` span is tried next. Unparseable output yields a
    /// failed result carrying the raw text.
    pub fn from_output(step_id: &str, output: &str) -> Self {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Self::error("Empty output from step command").normalized(step_id);
        }

        if let Ok(result) = serde_json::from_str::<StepResult>(trimmed) {
            return result.normalized(step_id);
        }

        if let Some(span) = outermost_object(trimmed) {
            if let Ok(result) = serde_json::from_str::<StepResult>(span) {
                log::debug!("extracted result object from mixed output of '{step_id}'");
                return result.normalized(step_id);
            }
        }

        log::error!("could not parse a result object from output of '{step_id}'");
        Self {
            status: ResultStatus::Error,
            message: "Could not parse JSON output from step".to_string(),
            data: json!({ "raw_output": trimmed }),
            requires_acknowledgment: false,
        }
    }
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
