use std::path::PathBuf;

use cadence_core::StepState;
use clap::{Parser, Subcommand};

/// Runner and status surface for dependency-gated review pipelines
///
/// Cadence walks a catalog of steps in dependency order, records each step's
/// status in a shared file and pauses steps that need a human sign-off until
/// they are approved, either here with `cadence approve` or by pressing Enter
/// in the terminal running the pipeline.
#[derive(Parser)]
#[command(version, about, name = "cadence")]
pub struct Args {
    /// Pipeline root holding catalog.json, status.json and steps/. Defaults to
    /// $XDG_DATA_HOME/cadence
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Step catalog file. Defaults to <root>/catalog.json, which is created
    /// with the built-in catalog when missing
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Never prompt on the terminal; approvals come from approval markers
    /// only. Implied by CI=true
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Append every status change as a JSON line to this file
    #[arg(long, global = true)]
    pub events: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for the Cadence CLI
///
/// Without a command the status board is shown.
#[derive(Subcommand)]
pub enum Commands {
    /// Run every step in catalog order, stopping at the first failure or
    /// unmet dependency
    Run,
    /// Run a single step
    #[command(alias = "s")]
    Step {
        /// Step id
        id: String,
    },
    /// Show the status of one step, or the whole board
    Status {
        /// Step id; omit for every step
        id: Option<String>,
        /// Print JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// List the catalog and the steps that can run now
    Steps,
    /// Approve a step that is waiting for approval
    #[command(alias = "a")]
    Approve {
        /// Step id
        id: String,
    },
    /// Record a status for a step directly
    SetStatus {
        /// Step id
        id: String,
        /// New state (pending, waiting_dependency, in_progress, waiting_input,
        /// completed, failed)
        state: StepState,
        /// Message stored with the status
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Return every step to pending and remove approval markers
    Reset,
    /// Start the MCP server
    Serve,
}
