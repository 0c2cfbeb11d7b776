//! Error types for the orchestration library.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::StepState;

/// Error type for catalog, store and orchestration operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Step id not present in the catalog
    #[error("Step '{id}' is not defined in the catalog")]
    UnknownStep { id: String },
    /// Approval requested for a step that is not waiting for it
    #[error("Step '{id}' is not waiting for approval (current state: {state})")]
    NotAwaitingApproval { id: String, state: StepState },
    /// Catalog file is structurally invalid
    #[error("Invalid step catalog: {reason}")]
    InvalidCatalog { reason: String },
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Configuration and runtime wiring errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Builder for creating input validation errors.
pub struct InvalidInputBuilder {
    field: String,
}

impl InvalidInputBuilder {
    /// Create a new invalid input error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> PipelineError {
        PipelineError::InvalidInput {
            field: self.field,
            reason: reason.into(),
        }
    }
}

impl PipelineError {
    /// Creates a builder for input validation errors.
    pub fn invalid_input(field: impl Into<String>) -> InvalidInputBuilder {
        InvalidInputBuilder::new(field)
    }

    /// Creates an unknown step error.
    pub fn unknown_step(id: impl Into<String>) -> Self {
        Self::UnknownStep { id: id.into() }
    }

    /// Creates a catalog validation error.
    pub fn invalid_catalog(reason: impl Into<String>) -> Self {
        Self::InvalidCatalog {
            reason: reason.into(),
        }
    }

    /// Wraps a tokio join failure from a blocking task.
    pub(crate) fn join(error: tokio::task::JoinError) -> Self {
        Self::Configuration {
            message: format!("Task join error: {error}"),
        }
    }
}

/// Extension trait attaching a path to I/O failures.
pub trait FileSystemResultExt<T> {
    /// Map an I/O error into [`PipelineError::FileSystem`] for `path`.
    fn fs_context(self, path: &Path) -> Result<T>;
}

impl<T> FileSystemResultExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, path: &Path) -> Result<T> {
        self.map_err(|source| PipelineError::FileSystem {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
