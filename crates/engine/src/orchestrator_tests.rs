// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_util::{command_chain, seed_job, stack, start_run, start_run_with};
use crate::{EngineError, RunRequest};
use oc_core::{RunPriority, RunStatus, RunTrigger, StatusEvent, StepStatus};
use std::collections::HashMap;

#[tokio::test]
async fn run_materializes_queued_run_with_steps() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["echo hello"])).await;
    let mut rx = stack.bus.subscribe();

    let run = start_run(&stack, &job).await;
    assert_eq!(run.status, RunStatus::Queued);
    assert!(!run.correlation_id.as_str().is_empty());

    let steps = stack.store.get_run_steps(&run.id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Queued);

    match rx.recv().await.unwrap() {
        StatusEvent::JobStatusUpdate { run_id, status, .. } => {
            assert_eq!(run_id, run.id);
            assert_eq!(status, RunStatus::Queued);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn template_error_fails_before_any_step_exists() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["echo {{ message }}"])).await;

    let err = stack
        .orchestrator
        .run(RunRequest {
            job_id: job.id.clone(),
            parameters: HashMap::new(),
            priority: RunPriority::Normal,
            trigger: RunTrigger::Manual,
            requested_by: "tester".to_string(),
            schedule_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Translate(_)));

    // Nothing was persisted: no runs to list.
    assert!(stack.store.list_runs(None, None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn parameters_render_into_commands() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["echo {{ message }}"])).await;
    let run = start_run_with(
        &stack,
        &job,
        [("message".to_string(), serde_json::json!("world"))].into_iter().collect(),
    )
    .await;

    let steps = stack.store.get_run_steps(&run.id).await.unwrap();
    match &steps[0].payload {
        oc_core::StepPayload::SshExec { command, .. } => assert_eq!(command, "echo world"),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn empty_graph_succeeds_trivially() {
    let stack = stack().await;
    let job = seed_job(&stack.store, serde_json::json!({"nodes": [], "edges": []})).await;
    let mut rx = stack.bus.subscribe();

    let run = start_run(&stack, &job).await;
    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run.finished_at_ms.is_some());

    // queued-status update, then completion.
    let first = rx.recv().await.unwrap();
    assert_eq!(first.frame_type(), "job_status_update");
    let second = rx.recv().await.unwrap();
    assert_eq!(second.frame_type(), "job_completed");
}

#[tokio::test]
async fn inactive_job_cannot_run() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["true"])).await;
    stack.store.delete_job(&job.id, 1).await.unwrap();

    let err = stack
        .orchestrator
        .run(RunRequest {
            job_id: job.id.clone(),
            parameters: HashMap::new(),
            priority: RunPriority::Normal,
            trigger: RunTrigger::Manual,
            requested_by: "tester".to_string(),
            schedule_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn cancel_queued_run_aborts_steps_and_completes() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["a", "b"])).await;
    let run = start_run(&stack, &job).await;
    let mut rx = stack.bus.subscribe();

    let canceled = stack.orchestrator.cancel(&run.id).await.unwrap();
    assert_eq!(canceled.status, RunStatus::Canceled);

    let steps = stack.store.get_run_steps(&run.id).await.unwrap();
    assert!(steps.iter().all(|s| s.status == StepStatus::Aborted));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.frame_type(), "job_status_update");
    let second = rx.recv().await.unwrap();
    match second {
        StatusEvent::JobCompleted { status, .. } => assert_eq!(status, RunStatus::Canceled),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn cancel_twice_conflicts() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["a"])).await;
    let run = start_run(&stack, &job).await;

    stack.orchestrator.cancel(&run.id).await.unwrap();
    let err = stack.orchestrator.cancel(&run.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn status_returns_run_and_step_snapshot() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["a", "b", "c"])).await;
    let run = start_run(&stack, &job).await;

    let (snapshot, steps) = stack.orchestrator.status(&run.id).await.unwrap();
    assert_eq!(snapshot.id, run.id);
    assert_eq!(steps.len(), 3);
    let indices: Vec<u32> = steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}
