//! Data models for steps, statuses and executor results.
//!
//! Each model implements [`std::fmt::Display`] producing markdown, so the CLI
//! and the MCP server can format the same data identically.
//!
//! # Examples
//!
//! ```rust
//! use cadence_core::models::{StepState, StepStatus};
//!
//! let status = StepStatus::new(StepState::WaitingInput, "Review the output");
//! assert!(status.to_string().contains("Waiting for approval"));
//! ```

pub mod result;
pub mod state;
pub mod status;
pub mod step;
pub mod summary;


pub use result::{ResultStatus, StepResult};
pub use state::StepState;
pub use status::StepStatus;
pub use step::StepDefinition;
pub use summary::{PipelineState, PipelineSummary};
