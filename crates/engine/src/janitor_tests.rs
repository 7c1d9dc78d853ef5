// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_util::{command_chain, drain, seed_job, stack, start_run};
use oc_core::{StatusEvent, WorkerRegistration};
use std::time::Duration;

fn janitor_for(stack: &crate::test_util::TestStack) -> Janitor<oc_core::FakeClock> {
    Janitor::new(
        stack.store.clone(),
        stack.bus.clone(),
        stack.clock.clone(),
        JanitorConfig::default(),
    )
}

#[tokio::test]
async fn sweep_on_idle_store_is_empty() {
    let stack = stack().await;
    let janitor = janitor_for(&stack);
    assert!(janitor.sweep().await.unwrap().is_empty());
}

#[tokio::test]
async fn dead_workers_lease_is_recovered_and_retried() {
    let stack = stack().await;
    let definition = serde_json::json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "slow", "type": "action.command",
              "data": { "command": "slow", "target": "linux-01", "max_retries": 1 } }
        ],
        "edges": [ { "source": "start", "target": "slow" } ]
    });
    let job = seed_job(&stack.store, definition).await;
    let run = start_run(&stack, &job).await;

    // A worker leases the step and then dies without a heartbeat.
    let now = stack.clock.epoch_ms();
    stack.store.lease_next_step("doomed", now).await.unwrap().unwrap();

    stack.clock.advance(Duration::from_secs(200));
    let janitor = janitor_for(&stack);
    let reports = janitor.sweep().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].action, oc_store::OrphanAction::Requeued);

    // S6: another worker picks it up and the run completes.
    drain(&stack).await;
    let finished = stack.store.get_run(&run.id).await.unwrap();
    assert_eq!(finished.status, oc_core::RunStatus::Succeeded);
}

#[tokio::test]
async fn orphan_without_budget_fails_run_and_announces() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["slow"])).await;
    let run = start_run(&stack, &job).await;

    let now = stack.clock.epoch_ms();
    stack.store.lease_next_step("doomed", now).await.unwrap().unwrap();
    let mut rx = stack.bus.subscribe();

    stack.clock.advance(Duration::from_secs(200));
    let janitor = janitor_for(&stack);
    let reports = janitor.sweep().await.unwrap();
    assert_eq!(reports[0].action, oc_store::OrphanAction::Failed);

    let finished = stack.store.get_run(&run.id).await.unwrap();
    assert_eq!(finished.status, oc_core::RunStatus::Failed);
    assert!(finished.error_message.unwrap().contains("orphaned"));

    let mut saw_run_failed = false;
    while let Ok(event) = rx.try_recv() {
        if let StatusEvent::RunFailed { reason, .. } = event {
            assert!(reason.contains("orphaned"));
            saw_run_failed = true;
        }
    }
    assert!(saw_run_failed);
}

#[tokio::test]
async fn live_workers_keep_their_leases() {
    let stack = stack().await;
    let job = seed_job(&stack.store, command_chain(&["slow"])).await;
    start_run(&stack, &job).await;

    let now = stack.clock.epoch_ms();
    stack.store.lease_next_step("alive", now).await.unwrap().unwrap();
    stack.clock.advance(Duration::from_secs(200));
    stack
        .store
        .heartbeat_worker(&WorkerRegistration {
            hostname: "alive".to_string(),
            queues: vec![],
            active_task_count: 1,
            last_heartbeat_ms: stack.clock.epoch_ms(),
        })
        .await
        .unwrap();

    let janitor = janitor_for(&stack);
    assert!(janitor.sweep().await.unwrap().is_empty());
}
