// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live-status fan-out bus.
//!
//! One broadcast channel carries every [`StatusEvent`]; subscribers
//! filter by topic on their side of the channel. A single frame reaching
//! both `job_monitoring` and the per-run audience preserves the
//! emission contract, and per-run ordering follows from the publisher
//! sequencing completions per run. Slow subscribers observe
//! `RecvError::Lagged` and are disconnected by their handler — producers
//! never block on an observer.

use oc_core::StatusEvent;
use tokio::sync::broadcast;

/// Frames buffered per subscriber before a laggard is cut loose.
pub const DEFAULT_BACKLOG: usize = 1024;

#[derive(Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG)
    }
}

impl StatusBus {
    pub fn new(backlog: usize) -> Self {
        let (tx, _) = broadcast::channel(backlog.max(1));
        Self { tx }
    }

    /// Push an event to every subscriber. Publishing with no subscribers
    /// is not an error.
    pub fn publish(&self, event: StatusEvent) {
        tracing::debug!(event = %event.log_summary(), "status event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
