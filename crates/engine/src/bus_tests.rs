// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oc_core::{CorrelationId, RunId, RunStatus};

fn update(run_id: &RunId, status: RunStatus, ts: u64) -> StatusEvent {
    StatusEvent::JobStatusUpdate {
        run_id: run_id.clone(),
        job_id: oc_core::JobId::fresh(),
        status,
        correlation_id: CorrelationId::fresh(),
        timestamp_ms: ts,
    }
}

#[tokio::test]
async fn subscribers_receive_published_events_in_order() {
    let bus = StatusBus::default();
    let mut rx = bus.subscribe();
    let run_id = RunId::fresh();

    bus.publish(update(&run_id, RunStatus::Queued, 1));
    bus.publish(update(&run_id, RunStatus::Running, 2));
    bus.publish(update(&run_id, RunStatus::Succeeded, 3));

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(rx.recv().await.unwrap().timestamp_ms());
    }
    assert_eq!(seen, vec![1, 2, 3]);
}

#[tokio::test]
async fn publish_without_subscribers_is_fine() {
    let bus = StatusBus::default();
    bus.publish(update(&RunId::fresh(), RunStatus::Queued, 1));
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn slow_subscriber_observes_lag() {
    let bus = StatusBus::new(2);
    let mut rx = bus.subscribe();
    let run_id = RunId::fresh();
    for ts in 0..10 {
        bus.publish(update(&run_id, RunStatus::Running, ts));
    }
    // The backlog overflowed; the receiver must see Lagged, which the
    // stream handler turns into a disconnect.
    match rx.recv().await {
        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => assert!(n > 0),
        other => panic!("expected lag, got {:?}", other),
    }
}
