//! Static catalog of step definitions.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    error::{FileSystemResultExt, PipelineError, Result},
    models::StepDefinition,
};

/// On-disk shape of a catalog file.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    steps: Vec<StepDefinition>,
}

/// Ordered, immutable set of step definitions for one pipeline.
///
/// Declaration order is the order in which a run visits steps. Every
/// dependency must name a step of the same catalog; cycles are not detected.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    steps: Vec<StepDefinition>,
    index: HashMap<String, usize>,
}

impl StepCatalog {
    /// Builds a catalog, validating ids and dependency references.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self> {
        if steps.is_empty() {
            return Err(PipelineError::invalid_catalog("catalog defines no steps"));
        }

        let mut index = HashMap::with_capacity(steps.len());
        for (position, step) in steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(PipelineError::invalid_catalog(format!(
                    "step at position {position} has an empty id"
                )));
            }
            if index.insert(step.id.clone(), position).is_some() {
                return Err(PipelineError::invalid_catalog(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        for step in &steps {
            let mut seen = HashSet::new();
            for dependency in &step.dependencies {
                if dependency == &step.id {
                    return Err(PipelineError::invalid_catalog(format!(
                        "step '{}' depends on itself",
                        step.id
                    )));
                }
                if !index.contains_key(dependency) {
                    return Err(PipelineError::invalid_catalog(format!(
                        "step '{}' depends on unknown step '{dependency}'",
                        step.id
                    )));
                }
                if !seen.insert(dependency.as_str()) {
                    return Err(PipelineError::invalid_catalog(format!(
                        "step '{}' lists dependency '{dependency}' twice",
                        step.id
                    )));
                }
            }
        }

        Ok(Self { steps, index })
    }

    /// Parses a catalog from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.steps)
    }

    /// Loads a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).fs_context(path)?;
        Self::from_json_str(&contents)
    }

    /// Loads a catalog file, writing the default catalog there first if the
    /// file does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let catalog = Self::default_catalog();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).fs_context(parent)?;
        }
        fs::write(path, catalog.to_json()?).fs_context(path)?;
        info!("wrote default step catalog to {}", path.display());
        Ok(catalog)
    }

    /// Serializes the catalog in the on-disk format.
    pub fn to_json(&self) -> Result<String> {
        let file = CatalogFile {
            steps: self.steps.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Built-in performance review and monthly check-in pipeline.
    pub fn default_catalog() -> Self {
        const EVALUATION: &str = "performance_evaluation";
        const CHECKINS: &str = "monthly_checkins";

        let steps = vec![
            StepDefinition::new("data_analysis", "Data Analysis")
                .with_description(
                    "Analyze performance data to identify trends and areas for improvement.",
                )
                .in_group(EVALUATION)
                .with_approval(),
            StepDefinition::new("evaluation_generation", "Evaluation Generation")
                .with_description(
                    "Generate performance evaluations based on the analysis of data and feedback.",
                )
                .depends_on(["data_analysis"])
                .in_group(EVALUATION)
                .with_approval(),
            StepDefinition::new("create_contribution_goal", "Create Contribution Goal")
                .with_description(
                    "Create specific, measurable contribution goals based on performance data.",
                )
                .depends_on(["evaluation_generation"])
                .in_group(EVALUATION)
                .with_approval(),
            StepDefinition::new("create_development_item", "Create Development Item")
                .with_description(
                    "Create development items to help team members improve their skills.",
                )
                .depends_on(["evaluation_generation"])
                .in_group(EVALUATION)
                .with_approval(),
            StepDefinition::new("update_contribution_goal", "Update Contribution Goal")
                .with_description("Update contribution goals based on the progress made.")
                .depends_on(["create_contribution_goal"])
                .in_group(CHECKINS)
                .with_approval(),
            StepDefinition::new("update_development_item", "Update Development Item")
                .with_description("Update development items based on the progress made.")
                .depends_on(["create_development_item"])
                .in_group(CHECKINS)
                .with_approval(),
            StepDefinition::new("timely_feedback", "Timely Feedback")
                .with_description(
                    "Provide timely feedback based on performance and progress.",
                )
                .depends_on(["update_contribution_goal", "update_development_item"])
                .in_group(CHECKINS)
                .with_approval(),
            StepDefinition::new("coaching", "Coaching")
                .with_description(
                    "Provide coaching and support to help team members achieve their goals.",
                )
                .depends_on(["timely_feedback"])
                .in_group(CHECKINS)
                .with_approval(),
        ];

        // The built-in definitions are internally consistent.
        let index = steps
            .iter()
            .enumerate()
            .map(|(position, step)| (step.id.clone(), position))
            .collect();
        Self { steps, index }
    }

    /// Looks up a step definition by id.
    pub fn get(&self, id: &str) -> Option<&StepDefinition> {
        self.index.get(id).map(|&position| &self.steps[position])
    }

    /// Looks up a step definition, failing with [`PipelineError::UnknownStep`].
    pub fn require(&self, id: &str) -> Result<&StepDefinition> {
        self.get(id).ok_or_else(|| PipelineError::unknown_step(id))
    }

    /// Whether the catalog defines `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Steps in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    /// Step ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
