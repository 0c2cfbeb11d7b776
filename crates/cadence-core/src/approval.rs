//! Human approval gate.
//!
//! A step that needs approval stays in `waiting_input` until it is released:
//!
//! - the approval marker `<steps>/<id>/out/.approved` appears (written by any
//!   process, typically the status surface),
//! - a line is read from the interactive input, when one is attached, or
//! - another process records `completed` for the step directly.
//!
//! Marker and recorded state are checked on each poll tick; the tick and the
//! input share a single `select!`. The marker is deleted when observed so one
//! approval is consumed exactly once. The wait has no timeout.

use std::{
    fs, io,
    path::PathBuf,
    sync::Arc,
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    error::{FileSystemResultExt, PipelineError, Result},
    models::StepState,
    paths::PipelinePaths,
    store::StatusStore,
    task::blocking,
};

/// Default interval between marker checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum spacing of "still waiting" log lines.
pub const DEFAULT_REMINDER_INTERVAL: Duration = Duration::from_secs(60);

/// Which signal approved a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalSource {
    Marker,
    Interactive,
    /// `completed` was written to the status store while waiting
    StatusUpdate,
}

impl std::fmt::Display for ApprovalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalSource::Marker => f.write_str("approval marker"),
            ApprovalSource::Interactive => f.write_str("interactive input"),
            ApprovalSource::StatusUpdate => f.write_str("status update"),
        }
    }
}

/// Line-oriented interactive approval source.
pub struct InteractiveInput {
    lines: mpsc::Receiver<io::Result<String>>,
}

impl InteractiveInput {
    /// Creates a source fed by the returned sender.
    pub fn channel(buffer: usize) -> (mpsc::Sender<io::Result<String>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { lines: rx })
    }

    /// Reads lines from standard input on a dedicated thread.
    ///
    /// The thread ends at end of input, on the first read error, or once the
    /// source is dropped.
    pub fn stdin() -> Self {
        let (tx, input) = Self::channel(8);
        thread::spawn(move || {
            let stdin = io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                let message = match stdin.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => Ok(line.trim_end().to_string()),
                    Err(e) => Err(e),
                };
                let failed = message.is_err();
                if tx.blocking_send(message).is_err() || failed {
                    break;
                }
            }
        });
        input
    }

    /// Drops lines typed before the gate engaged. Returns `false` when the
    /// source turned out to be closed or failed.
    fn discard_pending(&mut self) -> bool {
        loop {
            match self.lines.try_recv() {
                Ok(Ok(text)) => {
                    debug!("discarding input typed before approval was requested: {text:?}");
                }
                Ok(Err(e)) => {
                    warn!("interactive input failed ({e}); waiting for the approval marker only");
                    return false;
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    warn!("interactive input closed; waiting for the approval marker only");
                    return false;
                }
            }
        }
    }
}

enum WaitEvent {
    Tick,
    Line(Option<io::Result<String>>),
}

async fn next_line(input: &mut Option<InteractiveInput>) -> Option<io::Result<String>> {
    match input {
        Some(input) => input.lines.recv().await,
        None => std::future::pending().await,
    }
}

/// Rate limiter for repeated log lines.
struct Throttle {
    every: Duration,
    last: Instant,
}

impl Throttle {
    fn starting_now(every: Duration) -> Self {
        Self {
            every,
            last: Instant::now(),
        }
    }

    fn ready(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.every {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Suspends a step until a human approves it.
#[derive(Clone)]
pub struct ApprovalGate {
    store: Arc<StatusStore>,
    paths: PipelinePaths,
    poll_interval: Duration,
    reminder_interval: Duration,
}

impl ApprovalGate {
    pub fn new(store: Arc<StatusStore>, paths: PipelinePaths) -> Self {
        Self {
            store,
            paths,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reminder_interval: DEFAULT_REMINDER_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reminder_interval(mut self, interval: Duration) -> Self {
        self.reminder_interval = interval;
        self
    }

    /// Approval marker location for a step.
    pub fn marker_path(&self, step_id: &str) -> PathBuf {
        self.paths.marker_path(step_id)
    }

    /// Creates the approval marker, returning its path.
    pub fn create_marker(&self, step_id: &str) -> Result<PathBuf> {
        let marker = self.marker_path(step_id);
        let dir = self.paths.output_dir(step_id);
        fs::create_dir_all(&dir).fs_context(&dir)?;
        fs::File::create(&marker).fs_context(&marker)?;
        Ok(marker)
    }

    /// Deletes the marker if present. Returns whether one existed.
    pub fn consume_marker(&self, step_id: &str) -> Result<bool> {
        let marker = self.marker_path(step_id);
        match fs::remove_file(&marker) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PipelineError::FileSystem {
                path: marker,
                source,
            }),
        }
    }

    /// Removes a marker left over from an earlier run so it cannot approve
    /// a new execution.
    pub fn clear_marker(&self, step_id: &str) -> Result<bool> {
        let removed = self.consume_marker(step_id)?;
        if removed {
            warn!("removed stale approval marker for step '{step_id}'");
        }
        Ok(removed)
    }

    /// One poll: consumes the marker, else looks for a recorded completion.
    fn check(&self, step_id: &str) -> Result<Option<ApprovalSource>> {
        if self.consume_marker(step_id)? {
            return Ok(Some(ApprovalSource::Marker));
        }
        if self.store.get(step_id).state == StepState::Completed {
            return Ok(Some(ApprovalSource::StatusUpdate));
        }
        Ok(None)
    }

    /// Blocks until the step is approved.
    ///
    /// Records `waiting_input` first unless it is already recorded. `data`
    /// is attached to that record when given. When the interactive source
    /// closes or fails it is set to `None` and the wait continues on the
    /// marker alone.
    pub async fn wait(
        &self,
        step_id: &str,
        message: &str,
        data: Option<Value>,
        input: &mut Option<InteractiveInput>,
    ) -> Result<ApprovalSource> {
        {
            let store = Arc::clone(&self.store);
            let id = step_id.to_string();
            let message = message.to_string();
            blocking(move || {
                if store.get(&id).state != StepState::WaitingInput {
                    store.set(&id, StepState::WaitingInput, message, data);
                }
                Ok(())
            })
            .await?;
        }

        if input.as_mut().is_some_and(|source| !source.discard_pending()) {
            *input = None;
        }

        let marker = self.marker_path(step_id);
        info!(
            "waiting for approval of step '{step_id}'; review {} and create {}{}",
            self.paths.output_dir(step_id).display(),
            marker.display(),
            if input.is_some() {
                " or press Enter"
            } else {
                ""
            }
        );

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reminder = Throttle::starting_now(self.reminder_interval);
        let mut marker_errors = Throttle::starting_now(self.reminder_interval);
        let mut first_marker_error = true;

        loop {
            let event = tokio::select! {
                _ = ticker.tick() => WaitEvent::Tick,
                line = next_line(input) => WaitEvent::Line(line),
            };

            match event {
                WaitEvent::Tick => {
                    let gate = self.clone();
                    let id = step_id.to_string();
                    match blocking(move || gate.check(&id)).await {
                        Ok(Some(source)) => {
                            info!("step '{step_id}' approved by {source}");
                            return Ok(source);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            if first_marker_error || marker_errors.ready() {
                                warn!("cannot check approval marker for '{step_id}': {e}");
                                first_marker_error = false;
                            }
                        }
                    }
                    if reminder.ready() {
                        info!(
                            "still waiting for approval of step '{step_id}' ({})",
                            marker.display()
                        );
                    }
                }
                WaitEvent::Line(Some(Ok(_))) => {
                    info!("step '{step_id}' approved from interactive input");
                    return Ok(ApprovalSource::Interactive);
                }
                WaitEvent::Line(Some(Err(e))) => {
                    warn!("interactive input failed ({e}); waiting for the approval marker only");
                    *input = None;
                }
                WaitEvent::Line(None) => {
                    warn!("interactive input closed; waiting for the approval marker only");
                    *input = None;
                }
            }
        }
    }
}
