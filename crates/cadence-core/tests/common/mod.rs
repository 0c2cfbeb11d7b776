use std::{fs, time::Duration};

use cadence_core::{Pipeline, PipelineBuilder, StepCatalog, StepDefinition};
use tempfile::TempDir;

/// Helper function to create a pipeline root holding the given catalog
pub fn create_test_root(steps: Vec<StepDefinition>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let catalog = StepCatalog::new(steps).expect("Invalid test catalog");
    fs::write(
        temp_dir.path().join("catalog.json"),
        catalog.to_json().expect("Failed to serialize catalog"),
    )
    .expect("Failed to write catalog");
    temp_dir
}

/// Helper function to open a pipeline on an existing root
pub async fn open_pipeline(root: &TempDir) -> Pipeline {
    PipelineBuilder::new()
        .with_root(Some(root.path()))
        .with_poll_interval(Duration::from_millis(10))
        .build()
        .await
        .expect("Failed to build pipeline")
}
