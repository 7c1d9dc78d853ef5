// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registration heartbeat loop.

use oc_core::{Clock, SystemClock, WorkerRegistration};
use oc_engine::CancelRegistry;
use oc_store::Store;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Periodically upsert this worker's registration row so the janitor
/// and monitor can judge liveness.
pub async fn heartbeat_loop(
    store: Store,
    hostname: String,
    cancels: CancelRegistry,
    shutdown: CancellationToken,
) {
    let clock = SystemClock;
    loop {
        let registration = WorkerRegistration {
            hostname: hostname.clone(),
            queues: vec!["high".to_string(), "normal".to_string(), "low".to_string()],
            active_task_count: cancels.in_flight() as u32,
            last_heartbeat_ms: clock.epoch_ms(),
        };
        if let Err(e) = store.heartbeat_worker(&registration).await {
            tracing::warn!(error = %e, "worker heartbeat failed");
        }
        tokio::select! {
            () = tokio::time::sleep(HEARTBEAT_INTERVAL) => {}
            () = shutdown.cancelled() => break,
        }
    }
}
