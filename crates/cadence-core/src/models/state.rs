//! Step state enumeration.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Type-safe enumeration of step states.
///
/// Serialized in snake_case, matching the persisted status file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Step has not been evaluated yet
    #[default]
    Pending,

    /// At least one dependency is not completed
    WaitingDependency,

    /// Executor is running
    InProgress,

    /// Executor succeeded, waiting for human approval
    WaitingInput,

    /// Step finished successfully
    Completed,

    /// Executor failed
    Failed,
}

impl FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(StepState::Pending),
            "waiting_dependency" => Ok(StepState::WaitingDependency),
            "in_progress" | "inprogress" => Ok(StepState::InProgress),
            "waiting_input" => Ok(StepState::WaitingInput),
            "completed" | "done" => Ok(StepState::Completed),
            "failed" => Ok(StepState::Failed),
            _ => Err(format!("Invalid step state: {s}")),
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StepState {
    /// All states in lifecycle order.
    pub const ALL: [StepState; 6] = [
        StepState::Pending,
        StepState::WaitingDependency,
        StepState::InProgress,
        StepState::WaitingInput,
        StepState::Completed,
        StepState::Failed,
    ];

    /// Persisted string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::WaitingDependency => "waiting_dependency",
            StepState::InProgress => "in_progress",
            StepState::WaitingInput => "waiting_input",
            StepState::Completed => "completed",
            StepState::Failed => "failed",
        }
    }

    /// Whether the state ends the step for the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Completed | StepState::Failed)
    }

    /// Whether a run must stop after a step lands in this state.
    pub fn halts_run(&self) -> bool {
        matches!(self, StepState::Failed | StepState::WaitingDependency)
    }

    /// Get state with consistent icon formatting for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cadence_core::models::StepState;
    ///
    /// assert_eq!(StepState::Completed.with_icon(), "✓ Completed");
    /// assert_eq!(StepState::WaitingInput.with_icon(), "⏸ Waiting for approval");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            StepState::Pending => "○ Pending",
            StepState::WaitingDependency => "⧗ Waiting for dependencies",
            StepState::InProgress => "➤ In progress",
            StepState::WaitingInput => "⏸ Waiting for approval",
            StepState::Completed => "✓ Completed",
            StepState::Failed => "✗ Failed",
        }
    }
}
