//! On-disk layout of a pipeline root.
//!
//! ```text
//! <root>/
//! ├── catalog.json
//! ├── status.json
//! └── steps/
//!     └── <step_id>/
//!         ├── in/
//!         └── out/
//!             └── .approved   (approval marker, presence only)
//! ```

use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// File name of the approval marker inside a step's output directory.
pub const APPROVAL_MARKER: &str = ".approved";

/// Resolved locations of the files shared by the runner and the status
/// surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    pub root: PathBuf,
    pub catalog: PathBuf,
    pub status: PathBuf,
    pub steps_dir: PathBuf,
}

impl PipelinePaths {
    /// Standard layout under `root`.
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            catalog: root.join("catalog.json"),
            status: root.join("status.json"),
            steps_dir: root.join("steps"),
            root,
        }
    }

    /// Default root following the XDG Base Directory specification:
    /// `$XDG_DATA_HOME/cadence` or `~/.local/share/cadence`.
    pub fn default_root() -> Result<PathBuf> {
        let status = xdg::BaseDirectories::with_prefix("cadence")
            .place_data_file("status.json")
            .map_err(|e| PipelineError::XdgDirectory(e.to_string()))?;
        status.parent().map(Path::to_path_buf).ok_or_else(|| {
            PipelineError::XdgDirectory("data directory has no parent".to_string())
        })
    }

    /// Directory of step inputs.
    pub fn input_dir(&self, step_id: &str) -> PathBuf {
        self.steps_dir.join(step_id).join("in")
    }

    /// Directory of step outputs; the approval marker lives here.
    pub fn output_dir(&self, step_id: &str) -> PathBuf {
        self.steps_dir.join(step_id).join("out")
    }

    /// Approval marker of a step.
    pub fn marker_path(&self, step_id: &str) -> PathBuf {
        self.output_dir(step_id).join(APPROVAL_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_root() {
        let paths = PipelinePaths::under("/srv/review");
        assert_eq!(paths.catalog, Path::new("/srv/review/catalog.json"));
        assert_eq!(paths.status, Path::new("/srv/review/status.json"));
        assert_eq!(
            paths.marker_path("coaching"),
            Path::new("/srv/review/steps/coaching/out/.approved")
        );
        assert_eq!(
            paths.input_dir("coaching"),
            Path::new("/srv/review/steps/coaching/in")
        );
    }
}
