//! Durable step status store backed by a JSON file.
//!
//! The file maps step ids to status records:
//!
//! ```json
//! {
//!   "data_analysis": {"status": "completed", "message": "...", "lastUpdated": "..."},
//!   "evaluation_generation": {"status": "waiting_input", "requiresUserInput": true}
//! }
//! ```
//!
//! Every read goes to disk so that writes made by another process (for
//! example the request-serving process recording an approval) are observed
//! on the next decision. Writes are a read-modify-write of the whole file
//! under an in-process mutex, persisted through a temporary file and an
//! atomic rename.
//!
//! The mutex only serializes writers inside one process. Two processes
//! writing concurrently race, and the later write wins.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use jiff::Timestamp;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::{
    catalog::StepCatalog,
    error::{FileSystemResultExt, PipelineError, Result},
    models::{StepState, StepStatus},
};

type RawEntries = Map<String, Value>;

/// Point-in-time view of every known step's status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot(BTreeMap<String, StepStatus>);

impl StatusSnapshot {
    /// Recorded status for a step, if any.
    pub fn get(&self, id: &str) -> Option<&StepStatus> {
        self.0.get(id)
    }

    /// State of a step; steps with no record are pending.
    pub fn state_of(&self, id: &str) -> StepState {
        self.0.get(id).map(|status| status.state).unwrap_or_default()
    }

    pub fn insert(&mut self, id: impl Into<String>, status: StepStatus) {
        self.0.insert(id.into(), status);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StepStatus)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// File-backed mapping from step id to [`StepStatus`].
pub struct StatusStore {
    path: PathBuf,
    catalog: Arc<StepCatalog>,
    write_lock: Mutex<()>,
}

impl StatusStore {
    /// Opens (without reading) the store at `path`, creating its directory.
    pub fn open<P: AsRef<Path>>(path: P, catalog: Arc<StepCatalog>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = parent_dir(&path) {
            fs::create_dir_all(parent).fs_context(parent)?;
        }
        Ok(Self {
            path,
            catalog,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the status file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current status of a step, `pending` when nothing is recorded.
    pub fn get(&self, id: &str) -> StepStatus {
        let raw = self.read_raw();
        raw.get(id)
            .and_then(|value| decode_entry(id, value))
            .unwrap_or_else(StepStatus::pending)
    }

    /// Fresh snapshot of all catalog steps that have a recorded status.
    ///
    /// Entries for ids the catalog does not define are ignored.
    pub fn snapshot(&self) -> StatusSnapshot {
        let raw = self.read_raw();
        let mut snapshot = StatusSnapshot::default();
        for (id, value) in &raw {
            if !self.catalog.contains(id) {
                debug!("ignoring status entry for unknown step '{id}'");
                continue;
            }
            if let Some(status) = decode_entry(id, value) {
                snapshot.insert(id.clone(), status);
            }
        }
        snapshot
    }

    /// Records a new state for one step and returns the written record.
    ///
    /// The whole file is reloaded, the single entry replaced, and the file
    /// written back. When `data` is `None` the previously recorded payload is
    /// kept.
    pub fn try_set(
        &self,
        id: &str,
        state: StepState,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<StepStatus> {
        if !self.catalog.contains(id) {
            return Err(PipelineError::unknown_step(id));
        }

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut raw = self.read_raw();
        let previous = raw.get(id).and_then(|value| decode_entry(id, value));

        let status = StepStatus {
            state,
            message: message.into(),
            data: data.or_else(|| previous.and_then(|status| status.data)),
            requires_user_input: Some(state == StepState::WaitingInput),
            last_updated: Some(Timestamp::now()),
        };

        raw.insert(id.to_string(), serde_json::to_value(&status)?);
        self.write_raw(&raw)?;
        debug!("step '{id}' -> {state}");
        Ok(status)
    }

    /// Best-effort variant of [`StatusStore::try_set`].
    ///
    /// A persistence failure is logged and the intended record returned; the
    /// file keeps its previous content.
    pub fn set(
        &self,
        id: &str,
        state: StepState,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> StepStatus {
        let message = message.into();
        match self.try_set(id, state, message.clone(), data.clone()) {
            Ok(status) => status,
            Err(e) => {
                error!("failed to persist state {state} for step '{id}': {e}");
                StepStatus {
                    state,
                    message,
                    data,
                    requires_user_input: Some(state == StepState::WaitingInput),
                    last_updated: Some(Timestamp::now()),
                }
            }
        }
    }

    /// Replaces the whole store with `snapshot`.
    pub fn restore(&self, snapshot: &StatusSnapshot) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut raw = RawEntries::new();
        for (id, status) in snapshot.iter() {
            raw.insert(id.clone(), serde_json::to_value(status)?);
        }
        self.write_raw(&raw)
    }

    /// Clears every recorded status.
    pub fn reset(&self) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PipelineError::FileSystem {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Reads the raw entry map. Any read or decode failure yields an empty
    /// map after logging.
    fn read_raw(&self) -> RawEntries {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return RawEntries::new(),
            Err(e) => {
                error!("failed to read status file {}: {e}", self.path.display());
                return RawEntries::new();
            }
        };

        if contents.trim().is_empty() {
            return RawEntries::new();
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(entries)) => entries,
            Ok(other) => {
                warn!(
                    "status file {} holds {} instead of an object; treating as empty",
                    self.path.display(),
                    json_kind(&other)
                );
                RawEntries::new()
            }
            Err(e) => {
                warn!(
                    "status file {} is not valid JSON ({e}); treating as empty",
                    self.path.display()
                );
                RawEntries::new()
            }
        }
    }

    fn write_raw(&self, raw: &RawEntries) -> Result<()> {
        let dir = parent_dir(&self.path).unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir).fs_context(dir)?;
        serde_json::to_writer_pretty(&mut file, raw)?;
        file.write_all(b"\n").fs_context(file.path())?;
        file.as_file().sync_all().fs_context(file.path())?;
        file.persist(&self.path)
            .map_err(|e| PipelineError::FileSystem {
                path: self.path.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

fn decode_entry(id: &str, value: &Value) -> Option<StepStatus> {
    match StepStatus::deserialize(value) {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("skipping malformed status entry for step '{id}': {e}");
            None
        }
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
