// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_util::{command_chain, seed_job, stack, start_run};
use oc_core::{StatusEvent, WorkerRegistration};

fn monitor_for(stack: &crate::test_util::TestStack) -> Monitor<oc_core::FakeClock> {
    Monitor::new(
        stack.store.clone(),
        stack.bus.clone(),
        stack.clock.clone(),
        MonitorConfig::default(),
    )
}

#[tokio::test]
async fn queue_sample_diff_emits_only_on_change() {
    let stack = stack().await;
    let monitor = monitor_for(&stack);
    let mut rx = stack.bus.subscribe();

    // First sample (0,0,0) is a change from "no sample yet".
    assert!(monitor.sample_queues().await.unwrap());
    assert!(!monitor.sample_queues().await.unwrap());

    let job = seed_job(&stack.store, command_chain(&["a", "b"])).await;
    start_run(&stack, &job).await;
    assert!(monitor.sample_queues().await.unwrap());

    // Drain the queued-run frame, then check the depth frames.
    let mut depths = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let StatusEvent::QueueDepth { normal, .. } = event {
            depths.push(normal);
        }
    }
    assert_eq!(depths, vec![0, 2]);
}

#[tokio::test]
async fn worker_sample_tracks_liveness() {
    let stack = stack().await;
    let monitor = monitor_for(&stack);

    stack
        .store
        .heartbeat_worker(&WorkerRegistration {
            hostname: "w1".to_string(),
            queues: vec!["normal".to_string()],
            active_task_count: 2,
            last_heartbeat_ms: stack.clock.epoch_ms(),
        })
        .await
        .unwrap();

    let mut rx = stack.bus.subscribe();
    assert!(monitor.sample_workers().await.unwrap());
    match rx.recv().await.unwrap() {
        StatusEvent::WorkerHealth { workers, .. } => {
            assert_eq!(workers.len(), 1);
            assert!(workers[0].alive);
            assert_eq!(workers[0].active_tasks, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Heartbeat goes stale → the entry flips to dead → diff emits.
    stack.clock.advance(std::time::Duration::from_secs(120));
    assert!(monitor.sample_workers().await.unwrap());
    match rx.recv().await.unwrap() {
        StatusEvent::WorkerHealth { workers, .. } => assert!(!workers[0].alive),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn system_sample_aggregates_counts() {
    let stack = stack().await;
    let monitor = monitor_for(&stack);
    let job = seed_job(&stack.store, command_chain(&["a"])).await;
    start_run(&stack, &job).await;

    let mut rx = stack.bus.subscribe();
    assert!(monitor.sample_system().await.unwrap());
    match rx.recv().await.unwrap() {
        StatusEvent::SystemHealth { active_runs, queued_steps, alive_workers, .. } => {
            assert_eq!(active_runs, 1);
            assert_eq!(queued_steps, 1);
            assert_eq!(alive_workers, 0);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!monitor.sample_system().await.unwrap());
}
