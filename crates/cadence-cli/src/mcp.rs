//! MCP server implementation for Cadence
//!
//! Exposes the status service to AI assistants over stdio. The server never
//! runs steps; it reads and updates the same status file as the runner, and
//! approvals it records are picked up by a waiting `cadence run`.

use anyhow::Result;
use cadence_core::{
    OperationStatus, PipelineError, StatusService, StepBoard, StepState, StepView,
};
use log::{debug, error, info};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};

pub type McpResult = Result<CallToolResult, ErrorData>;

/// Identifies one catalog step
#[derive(Debug, Deserialize, JsonSchema)]
pub struct StepId {
    /// Step id as listed by `list_steps`
    pub step_id: String,
}

/// New status for a step
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateStatus {
    /// Step id as listed by `list_steps`
    pub step_id: String,
    /// New state
    pub status: StepState,
    /// Optional message stored with the status
    #[serde(default)]
    pub message: Option<String>,
}

/// Maps core errors to MCP errors; caller mistakes become invalid params
fn to_mcp_error(context: &str, error: PipelineError) -> ErrorData {
    let message = format!("{context}: {error}");
    match error {
        PipelineError::UnknownStep { .. }
        | PipelineError::NotAwaitingApproval { .. }
        | PipelineError::InvalidInput { .. } => ErrorData::invalid_params(message, None),
        _ => ErrorData::internal_error(message, None),
    }
}

fn text(body: impl ToString) -> McpResult {
    Ok(CallToolResult::success(vec![Content::text(body.to_string())]))
}

/// MCP server for Cadence
#[derive(Clone)]
pub struct CadenceMcpServer {
    service: StatusService,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CadenceMcpServer {
    /// Create a new Cadence MCP server
    pub fn new(service: StatusService) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "list_steps",
        description = "List every step in the pipeline catalog with its id, name, group, dependencies and whether it needs approval, followed by the steps whose dependencies are met and that can run now."
    )]
    async fn list_steps(&self) -> McpResult {
        let available = self
            .service
            .available_steps()
            .await
            .map_err(|e| to_mcp_error("Failed to list steps", e))?;

        let mut body = String::from("# Step catalog\n");
        for step in self.service.catalog().iter() {
            body.push('\n');
            body.push_str(&step.to_string());
        }
        body.push_str("\n# Available now\n\n");
        for step in &available {
            body.push_str(&format!("- {} (`{}`)\n", step.name, step.id));
        }
        if available.is_empty() {
            body.push_str("Nothing can run right now.\n");
        }
        text(body)
    }

    #[tool(
        name = "step_status",
        description = "Show the current status of one step: state (pending, waiting_dependency, in_progress, waiting_input, completed, failed), message, last update time and any result data."
    )]
    async fn step_status(&self, Parameters(params): Parameters<StepId>) -> McpResult {
        debug!("step_status: {params:?}");
        let definition = self
            .service
            .catalog()
            .require(&params.step_id)
            .map_err(|e| to_mcp_error("Failed to get step status", e))?
            .clone();
        let status = self
            .service
            .status(&params.step_id)
            .await
            .map_err(|e| to_mcp_error("Failed to get step status", e))?;
        text(StepView { definition, status })
    }

    #[tool(
        name = "pipeline_status",
        description = "Show the overall pipeline state and a board of every step with its state. Steps marked 'Waiting for approval' can be approved with approve_step."
    )]
    async fn pipeline_status(&self) -> McpResult {
        let views = self
            .service
            .statuses()
            .await
            .map_err(|e| to_mcp_error("Failed to read statuses", e))?;
        let summary = self
            .service
            .summary()
            .await
            .map_err(|e| to_mcp_error("Failed to read statuses", e))?;
        text(StepBoard::new(&views).with_summary(&summary))
    }

    #[tool(
        name = "update_status",
        description = "Record a new state for a step, with an optional message. This writes the shared status file directly without running anything; a running pipeline sees the change on its next check."
    )]
    async fn update_status(&self, Parameters(params): Parameters<UpdateStatus>) -> McpResult {
        debug!("update_status: {params:?}");
        let status = self
            .service
            .update_status(&params.step_id, params.status, params.message)
            .await
            .map_err(|e| to_mcp_error("Failed to update status", e))?;
        text(OperationStatus::success(format!(
            "Step '{}' is now {status}",
            params.step_id
        )))
    }

    #[tool(
        name = "approve_step",
        description = "Approve a step that is waiting for approval (state waiting_input). The running pipeline notices the approval within a second and marks the step completed. Fails for steps in any other state."
    )]
    async fn approve_step(&self, Parameters(params): Parameters<StepId>) -> McpResult {
        debug!("approve_step: {params:?}");
        let marker = self
            .service
            .approve(&params.step_id)
            .await
            .map_err(|e| to_mcp_error("Failed to approve step", e))?;
        text(OperationStatus::success(format!(
            "Approved step '{}' (marker {})",
            params.step_id,
            marker.display()
        )))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for CadenceMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "cadence".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(r#"Cadence runs a fixed pipeline of review steps in dependency order. Each step is pending, waiting_dependency, in_progress, waiting_input, completed or failed.

## Typical use
1. `pipeline_status` to see where the pipeline stands
2. `step_status` to read a step's message and result data
3. `approve_step` once the output of a step in waiting_input has been reviewed
4. `update_status` to correct a status by hand

The pipeline itself is run from the terminal with `cadence run`."#.to_string()),
            ..Default::default()
        }
    }
}

/// Run the MCP server with stdio transport
pub async fn run_stdio_server(server: CadenceMcpServer) -> Result<()> {
    use rmcp::{transport::stdio, ServiceExt};

    info!("Starting Cadence MCP server on stdio");
    debug!(
        "Server created with {} tools",
        server.tool_router.list_all().len()
    );

    let service = server.serve(stdio()).await.inspect_err(|e| {
        error!("serving error: {e:?}");
    })?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = service.waiting() => {
            match result {
                Ok(_) => info!("MCP server stopped normally"),
                Err(e) => error!("MCP server error: {e:?}"),
            }
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    info!("MCP server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use cadence_core::PipelineBuilder;
    use tempfile::TempDir;

    use super::*;

    async fn create_test_server() -> (TempDir, CadenceMcpServer) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pipeline = PipelineBuilder::new()
            .with_root(Some(temp_dir.path()))
            .build()
            .await
            .expect("Failed to build pipeline");
        (temp_dir, CadenceMcpServer::new(pipeline.status_service()))
    }

    fn body(result: &CallToolResult) -> String {
        serde_json::to_string(result).expect("result serializes")
    }

    #[tokio::test]
    async fn test_registers_all_tools() {
        let (_dir, server) = create_test_server().await;
        let mut names: Vec<_> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "approve_step",
                "list_steps",
                "pipeline_status",
                "step_status",
                "update_status"
            ]
        );
    }

    #[tokio::test]
    async fn test_update_then_approve() {
        let (_dir, server) = create_test_server().await;

        let updated = server
            .update_status(Parameters(UpdateStatus {
                step_id: "data_analysis".to_string(),
                status: StepState::WaitingInput,
                message: Some("review the analysis".to_string()),
            }))
            .await
            .unwrap();
        assert!(body(&updated).contains("Waiting for approval"));

        let approved = server
            .approve_step(Parameters(StepId {
                step_id: "data_analysis".to_string(),
            }))
            .await
            .unwrap();
        assert!(body(&approved).contains("Approved step 'data_analysis'"));
    }

    #[tokio::test]
    async fn test_blank_message_is_invalid() {
        let (_dir, server) = create_test_server().await;

        let err = server
            .update_status(Parameters(UpdateStatus {
                step_id: "coaching".to_string(),
                status: StepState::Failed,
                message: Some(String::new()),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Message cannot be blank"));
    }

    #[tokio::test]
    async fn test_approve_pending_step_is_invalid() {
        let (_dir, server) = create_test_server().await;

        let err = server
            .approve_step(Parameters(StepId {
                step_id: "coaching".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("not waiting for approval"));
    }

    #[tokio::test]
    async fn test_pipeline_status_board() {
        let (_dir, server) = create_test_server().await;
        let result = server.pipeline_status().await.unwrap();
        assert!(body(&result).contains("Pipeline pending (0/8 completed)"));
    }

    #[tokio::test]
    async fn test_unknown_step_status() {
        let (_dir, server) = create_test_server().await;
        let err = server
            .step_status(Parameters(StepId {
                step_id: "nope".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("not defined"));
    }
}
