// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral registration record for a live worker.

use serde::{Deserialize, Serialize};

/// Default liveness window: a worker whose last heartbeat is older than
/// this is considered dead and its leases reclaimable.
pub const DEFAULT_LIVENESS_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub hostname: String,
    /// Priority queues this worker services.
    #[serde(default)]
    pub queues: Vec<String>,
    pub active_task_count: u32,
    pub last_heartbeat_ms: u64,
}

impl WorkerRegistration {
    pub fn is_alive(&self, now_ms: u64, liveness_window_secs: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) <= liveness_window_secs * 1000
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
