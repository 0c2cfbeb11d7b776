//! Overall pipeline summary derived from step statuses.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::StepState;

/// Aggregated state of the whole pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No step has started
    Pending,
    /// Some steps have started, none failed or waiting for approval
    InProgress,
    /// At least one step waits for a human
    WaitingInput,
    /// At least one step failed
    Failed,
    /// Every step completed
    Completed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Pending => "pending",
            PipelineState::InProgress => "in_progress",
            PipelineState::WaitingInput => "waiting_input",
            PipelineState::Failed => "failed",
            PipelineState::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Progress counters for a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineSummary {
    pub state: PipelineState,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub waiting_steps: usize,
}

impl PipelineSummary {
    /// Builds a summary from the states of every catalog step.
    pub fn from_states<I>(states: I) -> Self
    where
        I: IntoIterator<Item = StepState>,
    {
        let mut total_steps = 0;
        let mut completed_steps = 0;
        let mut failed_steps = 0;
        let mut waiting_steps = 0;
        let mut started = false;

        for state in states {
            total_steps += 1;
            match state {
                StepState::Completed => completed_steps += 1,
                StepState::Failed => failed_steps += 1,
                StepState::WaitingInput => waiting_steps += 1,
                _ => {}
            }
            if state != StepState::Pending {
                started = true;
            }
        }

        let state = if total_steps > 0 && completed_steps == total_steps {
            PipelineState::Completed
        } else if failed_steps > 0 {
            PipelineState::Failed
        } else if waiting_steps > 0 {
            PipelineState::WaitingInput
        } else if started {
            PipelineState::InProgress
        } else {
            PipelineState::Pending
        };

        Self {
            state,
            total_steps,
            completed_steps,
            failed_steps,
            waiting_steps,
        }
    }
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline {} ({}/{} completed",
            self.state, self.completed_steps, self.total_steps
        )?;
        if self.failed_steps > 0 {
            write!(f, ", {} failed", self.failed_steps)?;
        }
        if self.waiting_steps > 0 {
            write!(f, ", {} waiting for approval", self.waiting_steps)?;
        }
        write!(f, ")")
    }
}
