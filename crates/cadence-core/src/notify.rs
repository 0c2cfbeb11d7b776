//! Best-effort broadcasting of status changes.
//!
//! Sinks never influence step state: the orchestrator logs a failed
//! notification and carries on.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context;
use jiff::Timestamp;
use log::info;
use serde::{Deserialize, Serialize};

use crate::models::{StepState, StepStatus};

/// One status transition as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub step_id: String,
    pub state: StepState,
    pub message: String,
    pub timestamp: Timestamp,
}

impl StatusEvent {
    pub fn from_status(step_id: impl Into<String>, status: &StepStatus) -> Self {
        Self {
            step_id: step_id.into(),
            state: status.state,
            message: status.message.clone(),
            timestamp: status.last_updated.unwrap_or_else(Timestamp::now),
        }
    }
}

/// Receiver of status events.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &StatusEvent) -> anyhow::Result<()>;
}

/// Writes events to the log facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: &StatusEvent) -> anyhow::Result<()> {
        info!(
            target: "cadence::events",
            "{} -> {}: {}",
            event.step_id,
            event.state,
            event.message
        );
        Ok(())
    }
}

/// Appends one JSON object per event to a file.
///
/// ```jsonl
/// {"stepId":"data_analysis","state":"in_progress","message":"...","timestamp":"..."}
/// ```
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesSink {
    /// Sink appending to `path`; the file and its directory are created on
    /// first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationSink for JsonLinesSink {
    fn notify(&self, event: &StatusEvent) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create event log directory {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open event log for append: {}", self.path.display()))?;

        let line = serde_json::to_string(event).context("serialize status event")?;
        writeln!(file, "{line}").context("write status event")?;
        Ok(())
    }
}
