//! Command handlers for the Cadence CLI
//!
//! Each handler calls into `cadence-core` and renders the result's markdown
//! `Display` output through the [`TerminalRenderer`].

use std::{fmt::Write as _, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use cadence_core::{
    ExecutorRegistry, InteractiveInput, JsonLinesSink, OperationStatus, Orchestrator, Pipeline,
    StepBoard, StepState, StepView,
};
use log::debug;

use crate::renderer::TerminalRenderer;

/// How a run collects approvals and reports transitions.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Read approvals from the terminal as well as from markers
    pub interactive: bool,
    /// JSON lines file receiving status events
    pub events: Option<PathBuf>,
}

/// CLI command handler
pub struct Cli {
    pipeline: Pipeline,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(pipeline: Pipeline, renderer: TerminalRenderer) -> Self {
        Self { pipeline, renderer }
    }

    fn orchestrator(&self, options: &RunOptions) -> Result<Orchestrator> {
        let registry = ExecutorRegistry::for_catalog(self.pipeline.catalog());
        debug!("executors: {registry:?}");

        let mut orchestrator = self.pipeline.orchestrator(registry);
        if let Some(path) = &options.events {
            orchestrator = orchestrator.with_sink(Arc::new(JsonLinesSink::new(path)));
        }
        if options.interactive {
            orchestrator = orchestrator.with_input(InteractiveInput::stdin());
            self.renderer.notice(
                "Steps that need approval pause here: press **Enter** to approve, or run `cadence approve <step>` from another terminal.",
            )?;
        } else {
            self.renderer.notice(&format!(
                "Steps that need approval wait for `cadence approve <step>` (root: `{}`).",
                self.pipeline.paths().root.display()
            ))?;
        }
        Ok(orchestrator)
    }

    /// Run every step in catalog order
    pub async fn run_all(&self, options: &RunOptions) -> Result<()> {
        let report = self
            .orchestrator(options)?
            .run_all()
            .await
            .context("Pipeline run failed")?;
        self.renderer.render(&report.to_string())?;

        if let Some(halt) = report.halted_at {
            bail!(
                "Run halted at step '{}' ({}): {}",
                halt.step_id,
                halt.state,
                halt.message
            );
        }
        Ok(())
    }

    /// Run one step
    pub async fn run_step(&self, id: &str, options: &RunOptions) -> Result<()> {
        let outcome = self
            .orchestrator(options)?
            .run_one(id)
            .await
            .with_context(|| format!("Failed to run step '{id}'"))?;

        // Same rule as a full run: a step left failed or blocked is an error,
        // including one that failed on an earlier run.
        let status = if outcome.state().halts_run() {
            OperationStatus::failure(format!("Step '{id}' {outcome}"))
        } else {
            OperationStatus::success(format!("Step '{id}' {outcome}"))
        };
        self.renderer.render(&status.to_string())?;

        if !status.success {
            bail!("Step '{id}' did not complete");
        }
        Ok(())
    }

    /// Show one step in detail, or the whole board
    pub async fn show_status(&self, id: Option<&str>, json: bool) -> Result<()> {
        let service = self.pipeline.status_service();

        match id {
            Some(id) => {
                let definition = service.catalog().require(id)?.clone();
                let status = service.status(id).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    let view = StepView { definition, status };
                    self.renderer.render(&view.to_string())?;
                }
            }
            None => {
                let views = service.statuses().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&views)?);
                } else {
                    let summary = service.summary().await?;
                    let board = StepBoard::new(&views).with_summary(&summary);
                    self.renderer.render(&board.to_string())?;
                }
            }
        }
        Ok(())
    }

    /// List catalog steps followed by the ones that can run now
    pub async fn list_steps(&self) -> Result<()> {
        let service = self.pipeline.status_service();
        let mut output = String::new();

        writeln!(output, "# Step catalog")?;
        for step in service.catalog().iter() {
            writeln!(output)?;
            write!(output, "{step}")?;
        }

        let available = service.available_steps().await?;
        writeln!(output)?;
        writeln!(output, "# Available now")?;
        writeln!(output)?;
        if available.is_empty() {
            writeln!(output, "Nothing can run right now.")?;
        }
        for step in &available {
            writeln!(output, "- {} (`{}`)", step.name, step.id)?;
        }

        self.renderer.render(&output)
    }

    /// Approve a waiting step
    pub async fn approve(&self, id: &str) -> Result<()> {
        let marker = self
            .pipeline
            .status_service()
            .approve(id)
            .await
            .with_context(|| format!("Failed to approve step '{id}'"))?;
        let status = OperationStatus::success(format!(
            "Approved step '{id}' (marker `{}`)",
            marker.display()
        ));
        self.renderer.render(&status.to_string())
    }

    /// Record a state directly
    pub async fn set_status(
        &self,
        id: &str,
        state: StepState,
        message: Option<String>,
    ) -> Result<()> {
        let status = self
            .pipeline
            .status_service()
            .update_status(id, state, message)
            .await
            .with_context(|| format!("Failed to update step '{id}'"))?;
        let result = OperationStatus::success(format!("Step '{id}' is now {status}"));
        self.renderer.render(&result.to_string())
    }

    /// Clear all recorded statuses
    pub async fn reset(&self) -> Result<()> {
        self.pipeline
            .status_service()
            .reset()
            .await
            .context("Failed to reset pipeline")?;
        self.renderer
            .render(&OperationStatus::success("All steps reset to pending").to_string())
    }
}
