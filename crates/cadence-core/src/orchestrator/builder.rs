//! Builder for wiring a pipeline root into runnable components.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::debug;

use super::Orchestrator;
use crate::{
    approval::{ApprovalGate, DEFAULT_POLL_INTERVAL, DEFAULT_REMINDER_INTERVAL},
    catalog::StepCatalog,
    error::{FileSystemResultExt, Result},
    executor::ExecutorRegistry,
    paths::PipelinePaths,
    service::StatusService,
    store::StatusStore,
    task::blocking,
};

/// Builder for creating and configuring [`Pipeline`] instances.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    root: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
    poll_interval: Duration,
    reminder_interval: Duration,
}

impl PipelineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            root: None,
            catalog_path: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reminder_interval: DEFAULT_REMINDER_INTERVAL,
        }
    }

    /// Sets the pipeline root directory.
    ///
    /// If not specified, uses XDG Base Directory specification:
    /// `$XDG_DATA_HOME/cadence` or `~/.local/share/cadence`
    pub fn with_root<P: AsRef<Path>>(mut self, root: Option<P>) -> Self {
        if let Some(root) = root {
            self.root = Some(root.as_ref().to_path_buf());
        }
        self
    }

    /// Reads the catalog from `path` instead of `<root>/catalog.json`.
    pub fn with_catalog_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.catalog_path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reminder_interval(mut self, interval: Duration) -> Self {
        self.reminder_interval = interval;
        self
    }

    /// Resolves paths, loads (or initializes) the catalog and opens the
    /// status store.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::XdgDirectory` if no default root can be found
    /// Returns `PipelineError::FileSystem` if the root cannot be created
    /// Returns `PipelineError::InvalidCatalog` if the catalog is invalid
    pub async fn build(self) -> Result<Pipeline> {
        let root = match self.root {
            Some(root) => root,
            None => PipelinePaths::default_root()?,
        };

        let mut paths = PipelinePaths::under(&root);
        if let Some(catalog) = self.catalog_path {
            paths.catalog = catalog;
        }
        debug!("pipeline root: {}", paths.root.display());

        let (catalog, store) = {
            let paths = paths.clone();
            blocking(move || {
                std::fs::create_dir_all(&paths.root).fs_context(&paths.root)?;
                let catalog = Arc::new(StepCatalog::load_or_init(&paths.catalog)?);
                let store = Arc::new(StatusStore::open(&paths.status, Arc::clone(&catalog))?);
                Ok((catalog, store))
            })
            .await?
        };

        let gate = ApprovalGate::new(Arc::clone(&store), paths.clone())
            .with_poll_interval(self.poll_interval)
            .with_reminder_interval(self.reminder_interval);

        Ok(Pipeline {
            paths,
            catalog,
            store,
            gate,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Components sharing one pipeline root.
#[derive(Clone)]
pub struct Pipeline {
    paths: PipelinePaths,
    catalog: Arc<StepCatalog>,
    store: Arc<StatusStore>,
    gate: ApprovalGate,
}

impl Pipeline {
    pub fn paths(&self) -> &PipelinePaths {
        &self.paths
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    /// Orchestrator running the given executors against this pipeline.
    pub fn orchestrator(&self, executors: ExecutorRegistry) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.store),
            self.gate.clone(),
            self.paths.clone(),
            executors,
        )
    }

    /// Request-handler view over the same store.
    pub fn status_service(&self) -> StatusService {
        StatusService::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.store),
            self.gate.clone(),
        )
    }
}
