//! Dependency resolution against a status snapshot.
//!
//! Pure functions: callers pass a snapshot they re-read immediately before
//! deciding, since another process may have changed the store.

use crate::{
    catalog::StepCatalog,
    models::{StepDefinition, StepState},
    store::StatusSnapshot,
};

/// Decides whether steps may run given the recorded dependency states.
pub struct DependencyResolver<'a> {
    catalog: &'a StepCatalog,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a StepCatalog) -> Self {
        Self { catalog }
    }

    /// First dependency of `step` that is not `completed`, in declaration
    /// order. Dependencies with no recorded status count as pending.
    pub fn first_unmet<'s>(
        &self,
        step: &'s StepDefinition,
        snapshot: &StatusSnapshot,
    ) -> Option<&'s str> {
        step.dependencies
            .iter()
            .map(String::as_str)
            .find(|dependency| snapshot.state_of(dependency) != StepState::Completed)
    }

    /// Whether every dependency of the step with id `step_id` is completed.
    ///
    /// Unknown ids are never satisfied.
    pub fn satisfied(&self, step_id: &str, snapshot: &StatusSnapshot) -> bool {
        self.catalog
            .get(step_id)
            .is_some_and(|step| self.first_unmet(step, snapshot).is_none())
    }

    /// Steps whose dependencies are met and that are not yet completed, in
    /// catalog order.
    pub fn available_steps(&self, snapshot: &StatusSnapshot) -> Vec<&'a StepDefinition> {
        self.catalog
            .iter()
            .filter(|step| snapshot.state_of(&step.id) != StepState::Completed)
            .filter(|step| self.first_unmet(step, snapshot).is_none())
            .collect()
    }
}
