//! Drives steps through their lifecycle.
//!
//! For each step the [`Orchestrator`] re-reads the store, skips steps that
//! already finished, checks dependencies, runs the executor, engages the
//! approval gate when needed and records the outcome. Every transition is
//! persisted before observers are notified.
//!
//! ```text
//! pending ─┬─▶ waiting_dependency ──(deps completed)──▶ in_progress
//!          └──────────────────────────────────────────▶ in_progress
//! in_progress ─┬─▶ completed
//!              ├─▶ waiting_input ──(approval)──▶ completed
//!              └─▶ failed
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use cadence_core::{ExecutorRegistry, PipelineBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = PipelineBuilder::new()
//!     .with_root(Some("/tmp/review"))
//!     .build()
//!     .await?;
//!
//! let registry = ExecutorRegistry::for_catalog(pipeline.catalog());
//! let report = pipeline.orchestrator(registry).run_all().await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use std::{fmt, fs, sync::Arc};

use anyhow::Context;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::task;

pub mod builder;

#[cfg(test)]
mod tests;

pub use builder::{Pipeline, PipelineBuilder};

use crate::{
    approval::{ApprovalGate, ApprovalSource, InteractiveInput},
    catalog::StepCatalog,
    error::Result,
    executor::{ExecutorRegistry, StepContext},
    models::{StepDefinition, StepResult, StepState, StepStatus},
    notify::{LogSink, NotificationSink, StatusEvent},
    paths::PipelinePaths,
    resolver::DependencyResolver,
    store::StatusStore,
    task::blocking,
};

/// How a single step evaluation ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step completed, after an approval when one was required.
    Completed { approved_via: Option<ApprovalSource> },
    /// The executor failed or raised.
    Failed { message: String },
    /// A dependency is not completed yet.
    Blocked { dependency: String },
    /// The step had already finished; nothing was run.
    Skipped { previous: StepStatus },
}

impl StepOutcome {
    /// State the step is left in.
    pub fn state(&self) -> StepState {
        match self {
            StepOutcome::Completed { .. } => StepState::Completed,
            StepOutcome::Failed { .. } => StepState::Failed,
            StepOutcome::Blocked { .. } => StepState::WaitingDependency,
            StepOutcome::Skipped { previous } => previous.state,
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Completed {
                approved_via: Some(source),
            } => write!(f, "completed (approved via {source})"),
            StepOutcome::Completed { approved_via: None } => f.write_str("completed"),
            StepOutcome::Failed { message } => write!(f, "failed: {message}"),
            StepOutcome::Blocked { dependency } => {
                write!(f, "blocked on `{dependency}`")
            }
            StepOutcome::Skipped { previous } => {
                write!(f, "skipped, already {}", previous.state)
            }
        }
    }
}

/// Outcome of one visited step within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step_id: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// The step that stopped a run and its last recorded message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Halt {
    pub step_id: String,
    pub state: StepState,
    pub message: String,
}

/// Result of [`Orchestrator::run_all`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub halted_at: Option<Halt>,
}

impl RunReport {
    /// Whether every step was visited without halting.
    pub fn is_complete(&self) -> bool {
        self.halted_at.is_none()
    }

    /// Outcome recorded for a step, if it was visited.
    pub fn outcome(&self, step_id: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|report| report.step_id == step_id)
            .map(|report| &report.outcome)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Run report")?;
        writeln!(f)?;
        if self.steps.is_empty() {
            writeln!(f, "No steps were visited.")?;
        }
        for report in &self.steps {
            writeln!(f, "- `{}`: {}", report.step_id, report.outcome)?;
        }
        writeln!(f)?;
        match &self.halted_at {
            Some(halt) => writeln!(
                f,
                "**Halted** at `{}` ({}): {}",
                halt.step_id, halt.state, halt.message
            ),
            None => writeln!(f, "All steps visited."),
        }
    }
}

/// Sequential runner over the step catalog.
pub struct Orchestrator {
    catalog: Arc<StepCatalog>,
    store: Arc<StatusStore>,
    gate: ApprovalGate,
    paths: PipelinePaths,
    executors: ExecutorRegistry,
    sink: Arc<dyn NotificationSink>,
    input: Option<InteractiveInput>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<StepCatalog>,
        store: Arc<StatusStore>,
        gate: ApprovalGate,
        paths: PipelinePaths,
        executors: ExecutorRegistry,
    ) -> Self {
        Self {
            catalog,
            store,
            gate,
            paths,
            executors,
            sink: Arc::new(LogSink),
            input: None,
        }
    }

    /// Replaces the default [`LogSink`].
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attaches an interactive approval source.
    pub fn with_input(mut self, input: InteractiveInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Walks the catalog in declaration order.
    ///
    /// Stops at the first step left `failed` or `waiting_dependency`,
    /// including a step skipped because it failed in an earlier run.
    pub async fn run_all(&mut self) -> Result<RunReport> {
        let ids: Vec<String> = self.catalog.ids().map(str::to_string).collect();
        let mut report = RunReport::default();

        for id in ids {
            let outcome = self.advance(&id).await?;
            let state = outcome.state();
            report.steps.push(StepReport {
                step_id: id.clone(),
                outcome,
            });

            if state.halts_run() {
                let store = Arc::clone(&self.store);
                let lookup = id.clone();
                let status = blocking(move || Ok(store.get(&lookup))).await?;
                warn!("run halted at step '{id}' ({state}): {}", status.message);
                report.halted_at = Some(Halt {
                    step_id: id,
                    state,
                    message: status.message,
                });
                break;
            }
        }

        Ok(report)
    }

    /// Evaluates a single step under the same rules as [`Orchestrator::run_all`].
    pub async fn run_one(&mut self, step_id: &str) -> Result<StepOutcome> {
        self.advance(step_id).await
    }

    async fn advance(&mut self, step_id: &str) -> Result<StepOutcome> {
        let definition = self.catalog.require(step_id)?.clone();
        let id = definition.id.as_str();

        let current = {
            let store = Arc::clone(&self.store);
            let lookup = id.to_string();
            blocking(move || Ok(store.get(&lookup))).await?
        };

        if current.state.is_terminal() {
            info!("skipping step '{id}', already {}", current.state);
            return Ok(StepOutcome::Skipped { previous: current });
        }

        if current.state == StepState::WaitingInput {
            info!("resuming approval wait for step '{id}'");
            let source = self
                .gate
                .wait(id, &current.message, None, &mut self.input)
                .await?;
            return self.approved(id, source, current.message).await;
        }

        let snapshot = {
            let store = Arc::clone(&self.store);
            blocking(move || Ok(store.snapshot())).await?
        };
        let unmet = DependencyResolver::new(&self.catalog)
            .first_unmet(&definition, &snapshot)
            .map(str::to_string);
        if let Some(dependency) = unmet {
            let message = format!("Waiting for dependency '{dependency}'");
            info!("step '{id}' blocked: {message}");
            self.transition(id, StepState::WaitingDependency, message, None)
                .await?;
            return Ok(StepOutcome::Blocked { dependency });
        }

        if current.state == StepState::InProgress {
            warn!("step '{id}' was interrupted while in progress, re-running");
        }

        let gate = self.gate.clone();
        let stale = id.to_string();
        if let Err(e) = blocking(move || gate.clear_marker(&stale)).await {
            return self
                .fail(id, format!("Cannot clear stale approval marker: {e}"), None)
                .await;
        }

        self.transition(
            id,
            StepState::InProgress,
            format!("Running {}", definition.name),
            None,
        )
        .await?;

        let result = self.execute(&definition).await;
        if !result.is_success() {
            return self.fail(id, result.message, Some(result.data)).await;
        }

        if definition.requires_approval || result.requires_acknowledgment {
            let message = format!("{}; awaiting approval", result.message);
            self.transition(
                id,
                StepState::WaitingInput,
                message.clone(),
                Some(result.data),
            )
            .await?;
            let source = self.gate.wait(id, &message, None, &mut self.input).await?;
            return self.approved(id, source, result.message).await;
        }

        self.transition(id, StepState::Completed, result.message, Some(result.data))
            .await?;
        Ok(StepOutcome::Completed { approved_via: None })
    }

    /// Runs the step's executor on the blocking pool. Every failure mode,
    /// including a panic, comes back as an error result.
    async fn execute(&self, definition: &StepDefinition) -> StepResult {
        let id = definition.id.as_str();
        let Some(executor) = self.executors.get(id) else {
            return StepResult::error(format!("No executor registered for step '{id}'"));
        };

        let ctx = StepContext::new(id, &self.paths);
        let run = move || -> anyhow::Result<StepResult> {
            for dir in [&ctx.input_dir, &ctx.output_dir] {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Cannot create {}", dir.display()))?;
            }
            executor.execute(&ctx)
        };

        match task::spawn_blocking(run).await {
            Ok(Ok(result)) => result.normalized(id),
            Ok(Err(e)) => StepResult::error(format!("{e:#}")),
            Err(e) if e.is_panic() => StepResult::error("Executor panicked"),
            Err(e) => StepResult::error(format!("Executor did not finish: {e}")),
        }
    }

    /// Records completion after the gate opens. A completion written by
    /// another process is kept as is and only announced.
    async fn approved(
        &self,
        id: &str,
        source: ApprovalSource,
        message: String,
    ) -> Result<StepOutcome> {
        if source == ApprovalSource::StatusUpdate {
            let store = Arc::clone(&self.store);
            let lookup = id.to_string();
            let status = blocking(move || Ok(store.get(&lookup))).await?;
            self.notify(id, &status);
        } else {
            self.transition(id, StepState::Completed, message, None)
                .await?;
        }
        Ok(StepOutcome::Completed {
            approved_via: Some(source),
        })
    }

    async fn fail(
        &self,
        id: &str,
        message: String,
        data: Option<Value>,
    ) -> Result<StepOutcome> {
        warn!("step '{id}' failed: {message}");
        self.transition(id, StepState::Failed, message.clone(), data)
            .await?;
        Ok(StepOutcome::Failed { message })
    }

    /// Persists a new state, then notifies observers.
    async fn transition(
        &self,
        id: &str,
        state: StepState,
        message: String,
        data: Option<Value>,
    ) -> Result<StepStatus> {
        let store = Arc::clone(&self.store);
        let target = id.to_string();
        let status = blocking(move || Ok(store.set(&target, state, message, data))).await?;
        self.notify(id, &status);
        Ok(status)
    }

    fn notify(&self, id: &str, status: &StepStatus) {
        if let Err(e) = self.sink.notify(&StatusEvent::from_status(id, status)) {
            warn!("status notification for step '{id}' failed: {e:#}");
        }
    }
}
