//! Display wrappers for formatting pipeline data as markdown.
//!
//! Models implement [`fmt::Display`] for standalone output; the wrappers in
//! this module add list and confirmation formatting shared by the CLI and the
//! MCP server.

use std::fmt;

use jiff::{tz::TimeZone, Timestamp};
use serde::Serialize;

use crate::models::{PipelineSummary, StepDefinition, StepState, StepStatus};

/// A wrapper around `Timestamp` that formats in the system timezone as
/// `YYYY-MM-DD HH:MM:SS TZ`.
pub struct LocalDateTime<'a>(pub &'a Timestamp);

impl<'a> fmt::Display for LocalDateTime<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .to_zoned(TimeZone::system())
                .strftime("%Y-%m-%d %H:%M:%S %Z")
        )
    }
}

/// A catalog step paired with its current status.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub definition: StepDefinition,
    pub status: StepStatus,
}

impl fmt::Display for StepView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.definition)?;
        writeln!(f, "- **Status**: {}", self.status.state.with_icon())?;
        if !self.status.message.is_empty() {
            writeln!(f, "- **Message**: {}", self.status.message)?;
        }
        if let Some(updated) = &self.status.last_updated {
            writeln!(f, "- **Updated**: {}", LocalDateTime(updated))?;
        }
        if let Some(data) = &self.status.data {
            if data.as_object().is_some_and(|map| !map.is_empty()) {
                writeln!(f)?;
                writeln!(f, "```json")?;
                writeln!(
                    f,
                    "{}",
                    serde_json::to_string_pretty(data).map_err(|_| fmt::Error)?
                )?;
                writeln!(f, "```")?;
            }
        }
        Ok(())
    }
}

/// Compact board listing every step with its state, grouped by catalog group.
pub struct StepBoard<'a> {
    pub steps: &'a [StepView],
    pub summary: Option<&'a PipelineSummary>,
}

impl<'a> StepBoard<'a> {
    pub fn new(steps: &'a [StepView]) -> Self {
        Self {
            steps,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: &'a PipelineSummary) -> Self {
        self.summary = Some(summary);
        self
    }
}

impl<'a> fmt::Display for StepBoard<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(summary) = self.summary {
            writeln!(f, "# {summary}")?;
        } else {
            writeln!(f, "# Steps")?;
        }

        if self.steps.is_empty() {
            writeln!(f)?;
            writeln!(f, "No steps defined.")?;
            return Ok(());
        }

        let mut current_group: Option<&str> = None;
        for (position, view) in self.steps.iter().enumerate() {
            let group = view.definition.group.as_str();
            if current_group != Some(group) {
                writeln!(f)?;
                if !group.is_empty() {
                    writeln!(f, "## {group}")?;
                    writeln!(f)?;
                }
                current_group = Some(group);
            }
            write!(
                f,
                "{}. {} (`{}`): {}",
                position + 1,
                view.definition.name,
                view.definition.id,
                view.status.state.with_icon()
            )?;
            if view.status.state != StepState::Pending && !view.status.message.is_empty() {
                write!(f, ", {}", view.status.message)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Wrapper type for displaying operation confirmation messages.
pub struct OperationStatus {
    pub message: String,
    pub success: bool,
}

impl OperationStatus {
    /// Create a new success status.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    /// Create a new failure status.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}",
            if self.success { "Success:" } else { "Error:" },
            self.message
        )
    }
}
