//! Step executors: the business logic behind each step.
//!
//! Executors are synchronous and run on the blocking thread pool. Returning
//! `Err` means the executor raised; the step is recorded as failed with the
//! error chain as its message.

use std::{
    collections::HashMap,
    fmt, fs,
    path::PathBuf,
    process::Command,
    sync::Arc,
    time::Instant,
};

use anyhow::{bail, Context};
use jiff::Timestamp;
use log::debug;
use serde_json::json;

use crate::{catalog::StepCatalog, models::StepResult, paths::PipelinePaths};

/// Locations handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub step_id: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl StepContext {
    pub fn new(step_id: impl Into<String>, paths: &PipelinePaths) -> Self {
        let step_id = step_id.into();
        Self {
            input_dir: paths.input_dir(&step_id),
            output_dir: paths.output_dir(&step_id),
            step_id,
        }
    }
}

/// Unit of business logic invoked for one step.
pub trait Executor: Send + Sync {
    fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepResult>;
}

impl<F> Executor for F
where
    F: Fn(&StepContext) -> anyhow::Result<StepResult> + Send + Sync,
{
    fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepResult> {
        self(ctx)
    }
}

/// Static mapping from step id to executor, resolved at startup.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.executors.keys().collect();
        ids.sort();
        f.debug_struct("ExecutorRegistry").field("steps", &ids).finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every catalog step: steps with a `command` run it,
    /// the rest use [`SimulatedExecutor`].
    pub fn for_catalog(catalog: &StepCatalog) -> Self {
        let mut registry = Self::new();
        for step in catalog.iter() {
            match &step.command {
                Some(command) if !command.is_empty() => {
                    registry.insert(&step.id, CommandExecutor::new(command.clone()));
                }
                _ => {
                    registry.insert(&step.id, SimulatedExecutor::new(&step.name));
                }
            }
        }
        registry
    }

    /// Registers (or replaces) the executor of a step.
    pub fn insert<E>(&mut self, step_id: impl Into<String>, executor: E) -> &mut Self
    where
        E: Executor + 'static,
    {
        self.executors.insert(step_id.into(), Arc::new(executor));
        self
    }

    /// Builder-style [`ExecutorRegistry::insert`].
    pub fn with<E>(mut self, step_id: impl Into<String>, executor: E) -> Self
    where
        E: Executor + 'static,
    {
        self.insert(step_id, executor);
        self
    }

    pub fn get(&self, step_id: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(step_id).cloned()
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.executors.contains_key(step_id)
    }
}

/// Placeholder executor that records a short report in the output
/// directory.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    title: String,
}

impl SimulatedExecutor {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Executor for SimulatedExecutor {
    fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepResult> {
        let started = Instant::now();
        let started_at = Timestamp::now();

        let report = ctx.output_dir.join("result.md");
        let body = format!(
            "# {}\n\nStep `{}` ran at {started_at}.\n\nInputs were read from `{}`.\n",
            self.title,
            ctx.step_id,
            ctx.input_dir.display()
        );
        fs::write(&report, body)
            .with_context(|| format!("Failed to write {}", report.display()))?;

        Ok(StepResult::success(
            format!("{} completed", self.title),
            json!({
                "output": report.display().to_string(),
                "startedAt": started_at.to_string(),
                "elapsedMs": started.elapsed().as_millis() as u64,
            }),
        ))
    }
}

/// Runs an external program whose standard output is the step result.
///
/// The program sees `CADENCE_STEP_ID`, `CADENCE_INPUT_DIR` and
/// `CADENCE_OUTPUT_DIR` in its environment.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    /// `argv[0]` is the program, the rest its arguments.
    pub fn new(argv: Vec<String>) -> Self {
        let mut argv = argv.into_iter();
        Self {
            program: argv.next().unwrap_or_default(),
            args: argv.collect(),
        }
    }
}

impl Executor for CommandExecutor {
    fn execute(&self, ctx: &StepContext) -> anyhow::Result<StepResult> {
        if self.program.is_empty() {
            bail!("No command configured for step '{}'", ctx.step_id);
        }

        debug!("running {} {:?} for '{}'", self.program, self.args, ctx.step_id);
        let output = Command::new(&self.program)
            .args(&self.args)
            .env("CADENCE_STEP_ID", &ctx.step_id)
            .env("CADENCE_INPUT_DIR", &ctx.input_dir)
            .env("CADENCE_OUTPUT_DIR", &ctx.output_dir)
            .output()
            .with_context(|| format!("Failed to start '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                stderr.to_string()
            };
            return Ok(StepResult::error(message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(StepResult::from_output(&ctx.step_id, &stdout))
    }
}
