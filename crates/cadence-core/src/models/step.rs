//! Step definition model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable definition of one pipeline step, as declared in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique identifier of the step
    pub id: String,

    /// Human readable name
    pub name: String,

    /// What the step produces
    #[serde(default)]
    pub description: String,

    /// Ids of steps that must be completed first, in declaration order
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Whether completion needs a human acknowledgment
    #[serde(default, alias = "requiresUserInput")]
    pub requires_approval: bool,

    /// Free-form display grouping tag
    #[serde(default)]
    pub group: String,

    /// External program producing the step result on stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl StepDefinition {
    /// Creates a definition with no dependencies and no approval requirement.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            requires_approval: false,
            group: String::new(),
            command: None,
        }
    }

    /// Sets the dependency list.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the step as requiring approval.
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the display group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }
}

impl fmt::Display for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## {} (`{}`)", self.name, self.id)?;
        writeln!(f)?;
        if !self.description.is_empty() {
            writeln!(f, "{}", self.description)?;
            writeln!(f)?;
        }
        if !self.group.is_empty() {
            writeln!(f, "- **Group**: {}", self.group)?;
        }
        if self.dependencies.is_empty() {
            writeln!(f, "- **Depends on**: nothing")?;
        } else {
            writeln!(f, "- **Depends on**: {}", self.dependencies.join(", "))?;
        }
        writeln!(
            f,
            "- **Approval**: {}",
            if self.requires_approval {
                "required"
            } else {
                "not required"
            }
        )
    }
}
