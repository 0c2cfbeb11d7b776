//! Cadence CLI Application
//!
//! Command-line runner and status surface for cadence pipelines.

mod args;
mod cli;
mod mcp;
mod renderer;

use std::io::IsTerminal;

use anyhow::{Context, Result};
use args::{Args, Commands};
use cadence_core::PipelineBuilder;
use clap::Parser;
use cli::{Cli, RunOptions};
use log::info;
use mcp::{run_stdio_server, CadenceMcpServer};
use renderer::TerminalRenderer;
use Commands::*;

/// `CI=true` disables terminal approvals.
fn ci_mode() -> bool {
    std::env::var("CI").is_ok_and(|value| value.eq_ignore_ascii_case("true"))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let Args {
        root,
        catalog,
        no_color,
        non_interactive,
        events,
        command,
    } = Args::parse();

    let pipeline = PipelineBuilder::new()
        .with_root(root)
        .with_catalog_path(catalog)
        .build()
        .await
        .context("Failed to initialize pipeline")?;

    let renderer = TerminalRenderer::new(!no_color);
    let options = RunOptions {
        interactive: !non_interactive && !ci_mode() && std::io::stdin().is_terminal(),
        events,
    };

    info!("Cadence started at {}", pipeline.paths().root.display());

    match command {
        Some(Run) => Cli::new(pipeline, renderer).run_all(&options).await,
        Some(Step { id }) => Cli::new(pipeline, renderer).run_step(&id, &options).await,
        Some(Status { id, json }) => {
            Cli::new(pipeline, renderer)
                .show_status(id.as_deref(), json)
                .await
        }
        Some(Steps) => Cli::new(pipeline, renderer).list_steps().await,
        Some(Approve { id }) => Cli::new(pipeline, renderer).approve(&id).await,
        Some(SetStatus { id, state, message }) => {
            Cli::new(pipeline, renderer)
                .set_status(&id, state, message)
                .await
        }
        Some(Reset) => Cli::new(pipeline, renderer).reset().await,
        Some(Serve) => {
            info!("Starting Cadence MCP server");
            run_stdio_server(CadenceMcpServer::new(pipeline.status_service()))
                .await
                .context("MCP server failed")
        }
        None => Cli::new(pipeline, renderer).show_status(None, false).await,
    }
}
