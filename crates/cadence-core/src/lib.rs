//! Core library for the Cadence step orchestration engine.
//!
//! Cadence walks a fixed catalog of named steps in dependency order. Each
//! step's status is persisted in a JSON file so that a restarted process
//! resumes where the previous one stopped, and steps that need a human
//! sign-off pause at an approval gate until a marker file appears or a line
//! is typed at the terminal.
//!
//! # Components
//!
//! - [`catalog`]: the immutable step definitions
//! - [`store`]: durable step statuses shared between processes
//! - [`resolver`]: dependency checks against a status snapshot
//! - [`approval`]: the approval gate and its marker files
//! - [`executor`]: the business logic seam
//! - [`notify`]: best-effort status broadcasting
//! - [`orchestrator`]: the sequential runner and pipeline wiring
//! - [`service`]: status queries, updates and approvals for a second process
//!
//! # Quick Start
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
//! // Another process approves waiting steps through the status service.
//! let service = pipeline.status_service();
//! println!("{}", service.summary().await?);
//!
//! let mut orchestrator = pipeline.orchestrator(ExecutorRegistry::for_catalog(pipeline.catalog()));
//! let report = orchestrator.run_all().await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod approval;
pub mod catalog;
pub mod display;
pub mod error;
pub mod executor;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod paths;
pub mod resolver;
pub mod service;
pub mod store;

mod task;

// Re-export commonly used types
pub use approval::{ApprovalGate, ApprovalSource, InteractiveInput};
pub use catalog::StepCatalog;
pub use display::{LocalDateTime, OperationStatus, StepBoard, StepView};
pub use error::{PipelineError, Result};
pub use executor::{CommandExecutor, Executor, ExecutorRegistry, SimulatedExecutor, StepContext};
pub use models::{
    PipelineState, PipelineSummary, ResultStatus, StepDefinition, StepResult, StepState,
    StepStatus,
};
pub use notify::{JsonLinesSink, LogSink, NotificationSink, StatusEvent};
pub use orchestrator::{Orchestrator, Pipeline, PipelineBuilder, RunReport, StepOutcome};
pub use paths::PipelinePaths;
pub use resolver::DependencyResolver;
pub use service::StatusService;
pub use store::{StatusSnapshot, StatusStore};
