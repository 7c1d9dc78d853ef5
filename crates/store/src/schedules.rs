// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule repository.

use crate::rows::{schedule_from_row, to_json};
use crate::{Store, StoreError};
use oc_core::{Schedule, ScheduleId};

impl Store {
    pub async fn create_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO schedules (id, job_id, name, kind, cron_expression, interval_seconds, \
             next_run_at_ms, last_run_at_ms, run_count, max_runs, is_active, parameters, \
             created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(schedule.id.as_str())
        .bind(schedule.job_id.as_str())
        .bind(&schedule.name)
        .bind(schedule.kind.to_string())
        .bind(&schedule.cron_expression)
        .bind(schedule.interval_seconds.map(|v| v as i64))
        .bind(schedule.next_run_at_ms.map(|v| v as i64))
        .bind(schedule.last_run_at_ms.map(|v| v as i64))
        .bind(schedule.run_count as i64)
        .bind(schedule.max_runs.map(|v| v as i64))
        .bind(schedule.is_active)
        .bind(to_json(&schedule.parameters, "schedule.parameters")?)
        .bind(&schedule.created_by)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_schedule(&self, id: &ScheduleId) -> Result<Schedule, StoreError> {
        let row = sqlx::query("SELECT * FROM schedules WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", id)))?;
        schedule_from_row(&row)
    }

    pub async fn list_schedules(&self, active_only: bool) -> Result<Vec<Schedule>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM schedules WHERE (?1 = 0 OR is_active = 1) ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    /// Schedules due at `now`: active, fire time reached, and max-runs
    /// budget remaining.
    pub async fn due_schedules(&self, now_ms: u64) -> Result<Vec<Schedule>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM schedules \
             WHERE is_active = 1 AND next_run_at_ms IS NOT NULL AND next_run_at_ms <= ?1 \
               AND (max_runs IS NULL OR run_count < max_runs) \
             ORDER BY next_run_at_ms",
        )
        .bind(now_ms as i64)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    /// Record a firing: stamp last_run, bump run_count,
    /// advance next_run_at, deactivating once exhausted.
    pub async fn record_schedule_fire(
        &self,
        id: &ScheduleId,
        fired_at_ms: u64,
        next_run_at_ms: Option<u64>,
    ) -> Result<Schedule, StoreError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "UPDATE schedules SET last_run_at_ms = ?2, run_count = run_count + 1, \
             next_run_at_ms = ?3, \
             is_active = CASE \
                 WHEN ?3 IS NULL THEN 0 \
                 WHEN max_runs IS NOT NULL AND run_count + 1 >= max_runs THEN 0 \
                 ELSE is_active END \
             WHERE id = ?1",
        )
        .bind(id.as_str())
        .bind(fired_at_ms as i64)
        .bind(next_run_at_ms.map(|v| v as i64))
        .execute(&mut *tx)
        .await?;
        // Exhausted or one-shot schedules carry no next fire time.
        sqlx::query("UPDATE schedules SET next_run_at_ms = NULL WHERE id = ?1 AND is_active = 0")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query("SELECT * FROM schedules WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", id)))?;
        let schedule = schedule_from_row(&row)?;
        tx.commit().await?;
        Ok(schedule)
    }

    /// Overwrite the next fire time (reactivation path).
    pub async fn record_schedule_next_fire(
        &self,
        id: &ScheduleId,
        next_run_at_ms: Option<u64>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE schedules SET next_run_at_ms = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(next_run_at_ms.map(|v| v as i64))
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("schedule {}", id)));
        }
        Ok(())
    }

    pub async fn set_schedule_active(
        &self,
        id: &ScheduleId,
        active: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE schedules SET is_active = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(active)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("schedule {}", id)));
        }
        Ok(())
    }

    pub async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?1")
            .bind(id.as_str())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("schedule {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "schedules_tests.rs"]
mod tests;
