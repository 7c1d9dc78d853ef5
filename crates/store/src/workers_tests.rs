// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_util::open_temp;
use oc_core::WorkerRegistration;

fn worker(hostname: &str, heartbeat: u64) -> WorkerRegistration {
    WorkerRegistration {
        hostname: hostname.to_string(),
        queues: vec!["normal".to_string()],
        active_task_count: 0,
        last_heartbeat_ms: heartbeat,
    }
}

#[tokio::test]
async fn heartbeat_upserts() {
    let (store, _dir) = open_temp().await;
    store.heartbeat_worker(&worker("a", 1000)).await.unwrap();
    store.heartbeat_worker(&worker("a", 2000)).await.unwrap();
    store.heartbeat_worker(&worker("b", 1500)).await.unwrap();

    let workers = store.list_workers().await.unwrap();
    assert_eq!(workers.len(), 2);
    assert_eq!(workers[0].hostname, "a");
    assert_eq!(workers[0].last_heartbeat_ms, 2000);
}

#[tokio::test]
async fn prune_drops_long_dead_workers() {
    let (store, _dir) = open_temp().await;
    store.heartbeat_worker(&worker("fresh", 1_000_000)).await.unwrap();
    store.heartbeat_worker(&worker("stale", 100)).await.unwrap();

    // Cutoff is 10× the liveness window.
    let dropped = store.prune_dead_workers(1_000_000, 60).await.unwrap();
    assert_eq!(dropped, 1);
    let remaining = store.list_workers().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].hostname, "fresh");
}
