//! Tests for the orchestrator module.

use std::{
    fs,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::anyhow;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use super::*;
use crate::{
    executor::StepContext,
    models::StepResult,
    notify::StatusEvent,
};

const LIMIT: Duration = Duration::from_secs(10);

/// Helper function to create a pipeline over a custom catalog
async fn create_test_pipeline(steps: Vec<StepDefinition>) -> (TempDir, Pipeline) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let catalog = StepCatalog::new(steps).expect("Invalid test catalog");
    fs::write(
        temp_dir.path().join("catalog.json"),
        catalog.to_json().unwrap(),
    )
    .unwrap();

    let pipeline = PipelineBuilder::new()
        .with_root(Some(temp_dir.path()))
        .with_poll_interval(Duration::from_millis(10))
        .build()
        .await
        .expect("Failed to build pipeline");
    (temp_dir, pipeline)
}

fn counting(
    calls: &Arc<AtomicUsize>,
) -> impl Fn(&StepContext) -> anyhow::Result<StepResult> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move |ctx: &StepContext| -> anyhow::Result<StepResult> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(StepResult::success(
            format!("{} done", ctx.step_id),
            json!({ "step": ctx.step_id }),
        ))
    }
}

fn failing(
    message: &'static str,
) -> impl Fn(&StepContext) -> anyhow::Result<StepResult> + Send + Sync + 'static {
    move |_: &StepContext| -> anyhow::Result<StepResult> { Err(anyhow!(message)) }
}

async fn state_of(pipeline: &Pipeline, id: &str) -> StepState {
    pipeline.status_service().status(id).await.unwrap().state
}

/// Approves `id` through the status service once it is waiting.
fn approve_when_waiting(pipeline: &Pipeline, id: &'static str) -> tokio::task::JoinHandle<()> {
    let service = pipeline.status_service();
    tokio::spawn(async move {
        loop {
            if service.status(id).await.unwrap().state == StepState::WaitingInput {
                service.approve(id).await.unwrap();
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<StatusEvent>>);

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &StatusEvent) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct BrokenSink;

impl NotificationSink for BrokenSink {
    fn notify(&self, _event: &StatusEvent) -> anyhow::Result<()> {
        Err(anyhow!("observer unreachable"))
    }
}

#[tokio::test]
async fn test_run_all_completes_in_catalog_order() {
    let (_temp_dir, pipeline) = create_test_pipeline(vec![
        StepDefinition::new("a", "A"),
        StepDefinition::new("b", "B").depends_on(["a"]),
    ])
    .await;
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ExecutorRegistry::new()
        .with("a", counting(&calls))
        .with("b", counting(&calls));

    let report = pipeline.orchestrator(registry).run_all().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[0].step_id, "a");
    assert_eq!(
        report.outcome("b"),
        Some(&StepOutcome::Completed { approved_via: None })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let status = pipeline.status_service().status("b").await.unwrap();
    assert_eq!(status.state, StepState::Completed);
    assert_eq!(status.message, "b done");
    assert_eq!(status.data, Some(json!({ "step": "b" })));
}

#[tokio::test]
async fn test_rerun_skips_completed_steps() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ExecutorRegistry::new().with("a", counting(&calls));

    pipeline.orchestrator(registry.clone()).run_all().await.unwrap();
    let report = pipeline.orchestrator(registry).run_all().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        report.outcome("a"),
        Some(StepOutcome::Skipped { previous }) if previous.state == StepState::Completed
    ));
}

#[tokio::test]
async fn test_failure_halts_run() {
    let (_temp_dir, pipeline) = create_test_pipeline(vec![
        StepDefinition::new("x", "X"),
        StepDefinition::new("y", "Y").depends_on(["x"]),
    ])
    .await;
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ExecutorRegistry::new()
        .with("x", failing("boom"))
        .with("y", counting(&calls));

    let report = pipeline.orchestrator(registry).run_all().await.unwrap();

    let halt = report.halted_at.as_ref().expect("run should halt");
    assert_eq!(halt.step_id, "x");
    assert_eq!(halt.state, StepState::Failed);
    assert_eq!(halt.message, "boom");
    assert_eq!(report.steps.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(state_of(&pipeline, "x").await, StepState::Failed);
    assert_eq!(state_of(&pipeline, "y").await, StepState::Pending);
}

#[tokio::test]
async fn test_previously_failed_step_still_halts() {
    let (_temp_dir, pipeline) = create_test_pipeline(vec![
        StepDefinition::new("x", "X"),
        StepDefinition::new("y", "Y"),
    ])
    .await;
    pipeline
        .status_service()
        .update_status("x", StepState::Failed, Some("earlier failure".into()))
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ExecutorRegistry::new()
        .with("x", counting(&calls))
        .with("y", counting(&calls));

    let report = pipeline.orchestrator(registry).run_all().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.halted_at.unwrap().message, "earlier failure");
}

#[tokio::test]
async fn test_error_result_records_data() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let registry = ExecutorRegistry::new().with(
        "a",
        |_: &StepContext| -> anyhow::Result<StepResult> {
            Ok(StepResult {
                data: json!({ "rows": 0 }),
                ..StepResult::error("no input rows")
            })
        },
    );

    let outcome = pipeline.orchestrator(registry).run_one("a").await.unwrap();

    assert_eq!(
        outcome,
        StepOutcome::Failed {
            message: "no input rows".to_string()
        }
    );
    let status = pipeline.status_service().status("a").await.unwrap();
    assert_eq!(status.data, Some(json!({ "rows": 0 })));
}

#[tokio::test]
async fn test_panicking_executor_fails_step() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let registry = ExecutorRegistry::new().with(
        "a",
        |_: &StepContext| -> anyhow::Result<StepResult> { panic!("executor bug") },
    );

    let outcome = pipeline.orchestrator(registry).run_one("a").await.unwrap();

    assert_eq!(outcome.state(), StepState::Failed);
    assert_eq!(state_of(&pipeline, "a").await, StepState::Failed);
}

#[tokio::test]
async fn test_missing_executor_fails_step() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;

    let outcome = pipeline
        .orchestrator(ExecutorRegistry::new())
        .run_one("a")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StepOutcome::Failed {
            message: "No executor registered for step 'a'".to_string()
        }
    );
}

#[tokio::test]
async fn test_unmet_dependency_blocks_then_resumes() {
    let (_temp_dir, pipeline) = create_test_pipeline(vec![
        StepDefinition::new("a", "A"),
        StepDefinition::new("b", "B").depends_on(["a"]),
    ])
    .await;
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ExecutorRegistry::new()
        .with("a", counting(&calls))
        .with("b", counting(&calls));
    let mut orchestrator = pipeline.orchestrator(registry);

    let blocked = orchestrator.run_one("b").await.unwrap();
    assert_eq!(
        blocked,
        StepOutcome::Blocked {
            dependency: "a".to_string()
        }
    );
    let status = pipeline.status_service().status("b").await.unwrap();
    assert_eq!(status.state, StepState::WaitingDependency);
    assert_eq!(status.message, "Waiting for dependency 'a'");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    orchestrator.run_one("a").await.unwrap();
    let outcome = orchestrator.run_one("b").await.unwrap();
    assert_eq!(outcome.state(), StepState::Completed);
}

#[tokio::test]
async fn test_run_one_unknown_step() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let err = pipeline
        .orchestrator(ExecutorRegistry::new())
        .run_one("zzz")
        .await
        .unwrap_err();
    assert!(matches!(err, crate::PipelineError::UnknownStep { .. }));
}

#[tokio::test]
async fn test_approval_marker_completes_step() {
    let (_temp_dir, pipeline) = create_test_pipeline(vec![
        StepDefinition::new("data_analysis", "Data Analysis"),
        StepDefinition::new("evaluation", "Evaluation")
            .depends_on(["data_analysis"])
            .with_approval(),
    ])
    .await;
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ExecutorRegistry::new()
        .with("data_analysis", counting(&calls))
        .with("evaluation", counting(&calls));

    let approver = approve_when_waiting(&pipeline, "evaluation");
    let report = timeout(LIMIT, pipeline.orchestrator(registry).run_all())
        .await
        .expect("run should finish after approval")
        .unwrap();
    approver.await.unwrap();

    assert!(report.is_complete());
    assert_eq!(
        report.outcome("evaluation"),
        Some(&StepOutcome::Completed {
            approved_via: Some(ApprovalSource::Marker)
        })
    );
    assert!(!pipeline.gate().marker_path("evaluation").exists());

    let status = pipeline.status_service().status("evaluation").await.unwrap();
    assert_eq!(status.state, StepState::Completed);
    assert_eq!(status.requires_user_input, Some(false));
    assert_eq!(status.data, Some(json!({ "step": "evaluation" })));
}

#[tokio::test]
async fn test_acknowledgment_from_result_engages_gate() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let registry = ExecutorRegistry::new().with(
        "a",
        |_: &StepContext| -> anyhow::Result<StepResult> {
            Ok(StepResult {
                requires_acknowledgment: true,
                ..StepResult::success("draft ready", json!({}))
            })
        },
    );

    let approver = approve_when_waiting(&pipeline, "a");
    let outcome = timeout(LIMIT, pipeline.orchestrator(registry).run_one("a"))
        .await
        .expect("step should finish after approval")
        .unwrap();
    approver.await.unwrap();

    assert_eq!(
        outcome,
        StepOutcome::Completed {
            approved_via: Some(ApprovalSource::Marker)
        }
    );
}

#[tokio::test]
async fn test_interactive_line_approves_step() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A").with_approval()]).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, input) = InteractiveInput::channel(4);
    let mut orchestrator = pipeline
        .orchestrator(ExecutorRegistry::new().with("a", counting(&calls)))
        .with_input(input);

    let service = pipeline.status_service();
    tokio::spawn(async move {
        while service.status("a").await.unwrap().state != StepState::WaitingInput {
            sleep(Duration::from_millis(10)).await;
        }
        while tx.send(Ok("y".to_string())).await.is_ok() {
            sleep(Duration::from_millis(50)).await;
        }
    });

    let outcome = timeout(LIMIT, orchestrator.run_one("a"))
        .await
        .expect("step should finish after input")
        .unwrap();

    assert_eq!(
        outcome,
        StepOutcome::Completed {
            approved_via: Some(ApprovalSource::Interactive)
        }
    );
}

#[tokio::test]
async fn test_stale_marker_does_not_approve_new_execution() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A").with_approval()]).await;
    pipeline.gate().create_marker("a").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut orchestrator =
        pipeline.orchestrator(ExecutorRegistry::new().with("a", counting(&calls)));

    let waited = timeout(Duration::from_millis(300), orchestrator.run_one("a")).await;

    assert!(waited.is_err(), "stale marker must not approve");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state_of(&pipeline, "a").await, StepState::WaitingInput);
}

#[tokio::test]
async fn test_restart_resumes_waiting_step_without_rerunning() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A").with_approval()]).await;
    let service = pipeline.status_service();
    service
        .update_status("a", StepState::WaitingInput, Some("review the draft".into()))
        .await
        .unwrap();
    service.approve("a").await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let outcome = timeout(
        LIMIT,
        pipeline
            .orchestrator(ExecutorRegistry::new().with("a", counting(&calls)))
            .run_one("a"),
    )
    .await
    .expect("resumed wait should see the marker")
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.state(), StepState::Completed);
    let status = service.status("a").await.unwrap();
    assert_eq!(status.message, "review the draft");
}

#[tokio::test]
async fn test_interrupted_step_is_rerun() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    pipeline
        .status_service()
        .update_status("a", StepState::InProgress, None)
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let outcome = pipeline
        .orchestrator(ExecutorRegistry::new().with("a", counting(&calls)))
        .run_one("a")
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.state(), StepState::Completed);
}

#[tokio::test]
async fn test_executor_sees_created_directories() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let registry = ExecutorRegistry::new().with(
        "a",
        |ctx: &StepContext| -> anyhow::Result<StepResult> {
            anyhow::ensure!(ctx.input_dir.is_dir(), "missing input dir");
            fs::write(ctx.output_dir.join("out.txt"), "ok")?;
            Ok(StepResult::success("written", json!({})))
        },
    );

    pipeline.orchestrator(registry).run_one("a").await.unwrap();

    assert!(pipeline.paths().output_dir("a").join("out.txt").exists());
    assert_eq!(state_of(&pipeline, "a").await, StepState::Completed);
}

#[tokio::test]
async fn test_uncreatable_directory_fails_step() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let input_dir = pipeline.paths().input_dir("a");
    fs::create_dir_all(input_dir.parent().unwrap()).unwrap();
    fs::write(&input_dir, "not a directory").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let outcome = pipeline
        .orchestrator(ExecutorRegistry::new().with("a", counting(&calls)))
        .run_one("a")
        .await
        .unwrap();

    let StepOutcome::Failed { message } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.starts_with("Cannot create"));
    assert!(message.contains(&input_dir.display().to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(state_of(&pipeline, "a").await, StepState::Failed);
}

#[tokio::test]
async fn test_recorded_completion_releases_waiting_step() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A").with_approval()]).await;
    let sink = Arc::new(RecordingSink::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = pipeline
        .orchestrator(ExecutorRegistry::new().with("a", counting(&calls)))
        .with_sink(sink.clone());

    let service = pipeline.status_service();
    tokio::spawn(async move {
        while service.status("a").await.unwrap().state != StepState::WaitingInput {
            sleep(Duration::from_millis(10)).await;
        }
        service
            .update_status("a", StepState::Completed, Some("approved by hand".to_string()))
            .await
            .unwrap();
    });

    let outcome = timeout(LIMIT, orchestrator.run_one("a"))
        .await
        .expect("step should finish after the recorded completion")
        .unwrap();

    assert_eq!(
        outcome,
        StepOutcome::Completed {
            approved_via: Some(ApprovalSource::StatusUpdate)
        }
    );
    let status = pipeline.status_service().status("a").await.unwrap();
    assert_eq!(status.state, StepState::Completed);
    assert_eq!(status.message, "approved by hand");
    assert_eq!(status.data, Some(json!({ "step": "a" })));

    let events = sink.0.lock().unwrap();
    let last = events.last().expect("completion was announced");
    assert_eq!(last.state, StepState::Completed);
    assert_eq!(last.message, "approved by hand");
}

#[tokio::test]
async fn test_transitions_are_notified_in_order() {
    let (_temp_dir, pipeline) = create_test_pipeline(vec![
        StepDefinition::new("a", "A"),
        StepDefinition::new("b", "B").depends_on(["a"]),
    ])
    .await;
    let sink = Arc::new(RecordingSink::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = pipeline
        .orchestrator(
            ExecutorRegistry::new()
                .with("a", failing("boom"))
                .with("b", counting(&calls)),
        )
        .with_sink(sink.clone());

    orchestrator.run_all().await.unwrap();

    let events = sink.0.lock().unwrap();
    let seen: Vec<_> = events
        .iter()
        .map(|event| (event.step_id.as_str(), event.state))
        .collect();
    assert_eq!(
        seen,
        vec![("a", StepState::InProgress), ("a", StepState::Failed)]
    );
}

#[tokio::test]
async fn test_sink_failure_does_not_affect_state() {
    let (_temp_dir, pipeline) =
        create_test_pipeline(vec![StepDefinition::new("a", "A")]).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = pipeline
        .orchestrator(ExecutorRegistry::new().with("a", counting(&calls)))
        .with_sink(Arc::new(BrokenSink));

    let outcome = orchestrator.run_one("a").await.unwrap();

    assert_eq!(outcome.state(), StepState::Completed);
    assert_eq!(state_of(&pipeline, "a").await, StepState::Completed);
}

#[test]
fn test_run_report_display() {
    let report = RunReport {
        steps: vec![
            StepReport {
                step_id: "x".to_string(),
                outcome: StepOutcome::Failed {
                    message: "boom".to_string(),
                },
            },
        ],
        halted_at: Some(Halt {
            step_id: "x".to_string(),
            state: StepState::Failed,
            message: "boom".to_string(),
        }),
    };

    let text = report.to_string();
    assert!(text.contains("- `x`: failed: boom"));
    assert!(text.contains("**Halted** at `x` (failed): boom"));
}
