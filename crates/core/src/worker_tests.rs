// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn worker_alive_within_window() {
    let worker = WorkerRegistration {
        hostname: "worker-a".to_string(),
        queues: vec!["normal".to_string()],
        active_task_count: 1,
        last_heartbeat_ms: 100_000,
    };
    assert!(worker.is_alive(100_000 + 59_000, DEFAULT_LIVENESS_WINDOW_SECS));
    assert!(worker.is_alive(100_000 + 60_000, DEFAULT_LIVENESS_WINDOW_SECS));
    assert!(!worker.is_alive(100_000 + 61_000, DEFAULT_LIVENESS_WINDOW_SECS));
}

#[test]
fn clock_skew_does_not_underflow() {
    let worker = WorkerRegistration {
        hostname: "worker-a".to_string(),
        queues: vec![],
        active_task_count: 0,
        last_heartbeat_ms: 200_000,
    };
    // Heartbeat in the future relative to the observer.
    assert!(worker.is_alive(100_000, DEFAULT_LIVENESS_WINDOW_SECS));
}
