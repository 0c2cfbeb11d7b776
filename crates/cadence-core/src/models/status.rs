//! Persisted per-step status record.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StepState;
use crate::display::LocalDateTime;

/// Current status of one step as recorded in the status store.
///
/// The field names match the JSON status file shared with other processes:
/// `{"status": ..., "message": ..., "data": ..., "requiresUserInput": ...,
/// "lastUpdated": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    /// Current state of the step
    #[serde(rename = "status")]
    pub state: StepState,

    /// Last human-readable status line
    #[serde(default)]
    pub message: String,

    /// Payload most recently produced by the executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Whether the step is blocked on a human
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_user_input: Option<bool>,

    /// Timestamp of the last transition (UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

impl StepStatus {
    /// Creates a status stamped with the current time.
    pub fn new(state: StepState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            data: None,
            requires_user_input: None,
            last_updated: Some(Timestamp::now()),
        }
    }

    /// Status reported for steps with no recorded entry.
    pub fn pending() -> Self {
        Self::default()
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state.with_icon())?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(updated) = &self.last_updated {
            write!(f, " ({})", LocalDateTime(updated))?;
        }
        Ok(())
    }
}
