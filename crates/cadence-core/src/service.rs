//! Status queries, updates and approvals for a running pipeline.
//!
//! The [`StatusService`] is the request-handler side of the system. It works
//! on the status store directly, so it can run in a different process from
//! the orchestrator and still see and influence the same steps.

use std::{path::PathBuf, sync::Arc};

use log::info;

use crate::{
    approval::ApprovalGate,
    catalog::StepCatalog,
    display::StepView,
    error::{PipelineError, Result},
    models::{PipelineSummary, StepDefinition, StepState, StepStatus},
    resolver::DependencyResolver,
    store::StatusStore,
    task::blocking,
};

/// Request-handler operations over a pipeline's status store.
#[derive(Clone)]
pub struct StatusService {
    catalog: Arc<StepCatalog>,
    store: Arc<StatusStore>,
    gate: ApprovalGate,
}

impl StatusService {
    pub fn new(catalog: Arc<StepCatalog>, store: Arc<StatusStore>, gate: ApprovalGate) -> Self {
        Self {
            catalog,
            store,
            gate,
        }
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    /// Current status of one step.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnknownStep` if the catalog has no such step
    pub async fn status(&self, step_id: &str) -> Result<StepStatus> {
        self.catalog.require(step_id)?;
        let store = Arc::clone(&self.store);
        let id = step_id.to_string();
        blocking(move || Ok(store.get(&id))).await
    }

    /// Every catalog step with its status, in catalog order.
    pub async fn statuses(&self) -> Result<Vec<StepView>> {
        let store = Arc::clone(&self.store);
        let snapshot = blocking(move || Ok(store.snapshot())).await?;
        Ok(self
            .catalog
            .iter()
            .map(|definition| StepView {
                definition: definition.clone(),
                status: snapshot
                    .get(&definition.id)
                    .cloned()
                    .unwrap_or_else(StepStatus::pending),
            })
            .collect())
    }

    /// Records a state for a step.
    ///
    /// Without a message the state's label is used. Unlike the
    /// orchestrator's writes, a persistence failure is returned.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnknownStep` for an unknown step
    /// Returns `PipelineError::InvalidInput` for a blank message
    pub async fn update_status(
        &self,
        step_id: &str,
        state: StepState,
        message: Option<String>,
    ) -> Result<StepStatus> {
        self.catalog.require(step_id)?;
        if message.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(PipelineError::invalid_input("message")
                .with_reason("Message cannot be blank; omit it to use the default"));
        }
        let message = message.unwrap_or_else(|| format!("Status set to {state}"));
        let store = Arc::clone(&self.store);
        let id = step_id.to_string();
        let status = blocking(move || store.try_set(&id, state, message, None)).await?;
        info!("step '{step_id}' set to {state}");
        Ok(status)
    }

    /// Approves a step that is waiting for approval by creating its marker.
    ///
    /// The step's state is left alone; the waiting orchestrator consumes the
    /// marker and records completion.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::UnknownStep` for an unknown step
    /// Returns `PipelineError::NotAwaitingApproval` unless the step is in
    /// `waiting_input`
    pub async fn approve(&self, step_id: &str) -> Result<PathBuf> {
        let current = self.status(step_id).await?;
        if current.state != StepState::WaitingInput {
            return Err(PipelineError::NotAwaitingApproval {
                id: step_id.to_string(),
                state: current.state,
            });
        }

        let gate = self.gate.clone();
        let id = step_id.to_string();
        let marker = blocking(move || gate.create_marker(&id)).await?;
        info!("approval marker created for '{step_id}' at {}", marker.display());
        Ok(marker)
    }

    /// Steps that could run now: not completed, dependencies completed.
    pub async fn available_steps(&self) -> Result<Vec<StepDefinition>> {
        let store = Arc::clone(&self.store);
        let snapshot = blocking(move || Ok(store.snapshot())).await?;
        Ok(DependencyResolver::new(&self.catalog)
            .available_steps(&snapshot)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn summary(&self) -> Result<PipelineSummary> {
        let store = Arc::clone(&self.store);
        let snapshot = blocking(move || Ok(store.snapshot())).await?;
        Ok(PipelineSummary::from_states(
            self.catalog.ids().map(|id| snapshot.state_of(id)),
        ))
    }

    /// Returns every step to `pending` and removes leftover approval
    /// markers.
    pub async fn reset(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let gate = self.gate.clone();
        let ids: Vec<String> = self.catalog.ids().map(str::to_string).collect();
        blocking(move || {
            store.reset()?;
            for id in &ids {
                gate.consume_marker(id)?;
            }
            Ok(())
        })
        .await?;
        info!("pipeline status reset");
        Ok(())
    }
}
