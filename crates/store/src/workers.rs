// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker heartbeat registry.

use crate::rows::{to_json, worker_from_row};
use crate::{Store, StoreError};
use oc_core::WorkerRegistration;

impl Store {
    pub async fn heartbeat_worker(&self, worker: &WorkerRegistration) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workers (hostname, queues, active_task_count, last_heartbeat_ms) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (hostname) DO UPDATE SET queues = ?2, active_task_count = ?3, \
             last_heartbeat_ms = ?4",
        )
        .bind(&worker.hostname)
        .bind(to_json(&worker.queues, "worker.queues")?)
        .bind(worker.active_task_count as i64)
        .bind(worker.last_heartbeat_ms as i64)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerRegistration>, StoreError> {
        let rows = sqlx::query("SELECT * FROM workers ORDER BY hostname")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(worker_from_row).collect()
    }

    /// Drop registrations whose heartbeat is far beyond the liveness
    /// window (10× — dead workers linger briefly for diagnostics).
    pub async fn prune_dead_workers(
        &self,
        now_ms: u64,
        liveness_window_secs: u64,
    ) -> Result<u64, StoreError> {
        let cutoff = now_ms.saturating_sub(liveness_window_secs * 1000 * 10) as i64;
        let result = sqlx::query("DELETE FROM workers WHERE last_heartbeat_ms < ?1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
