// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JobRun repository: materialization, snapshots, listings.

use crate::rows::{run_from_row, step_from_row, to_json};
use crate::{Store, StoreError};
use oc_core::{JobRun, JobRunStep, RunId, RunStatus};

impl Store {
    /// Materialize a run and its N steps in one transaction.
    pub async fn materialize_run(
        &self,
        run: &JobRun,
        steps: &[JobRunStep],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO job_runs (id, job_id, job_version, status, priority, trigger_kind, \
             requested_by, parameters, correlation_id, schedule_id, worker_hostname, \
             queued_at_ms, started_at_ms, finished_at_ms, retry_count, result_data, \
             error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )
        .bind(run.id.as_str())
        .bind(run.job_id.as_str())
        .bind(run.job_version as i64)
        .bind(run.status.to_string())
        .bind(run.priority.rank())
        .bind(run.trigger.to_string())
        .bind(&run.requested_by)
        .bind(to_json(&run.parameters, "run.parameters")?)
        .bind(run.correlation_id.as_str())
        .bind(run.schedule_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(&run.worker_hostname)
        .bind(run.queued_at_ms as i64)
        .bind(run.started_at_ms.map(|v| v as i64))
        .bind(run.finished_at_ms.map(|v| v as i64))
        .bind(run.retry_count as i64)
        .bind(match &run.result_data {
            Some(data) => Some(to_json(data, "run.result_data")?),
            None => None,
        })
        .bind(&run.error_message)
        .execute(&mut *tx)
        .await?;

        for step in steps {
            sqlx::query(
                "INSERT INTO job_run_steps (id, run_id, step_index, step_type, payload, \
                 target_id, target_host, credential_hint, timeout_secs, retry_policy, \
                 continue_on_failure, status, priority, stdout, stderr, retry_count, eta_ms, \
                 metrics) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, '', '', 0, \
                 ?14, ?15)",
            )
            .bind(step.id.as_str())
            .bind(run.id.as_str())
            .bind(step.index as i64)
            .bind(&step.step_type)
            .bind(to_json(&step.payload, "step.payload")?)
            .bind(step.target_id.as_ref().map(|t| t.as_str().to_string()))
            .bind(&step.target_host)
            .bind(&step.credential_hint)
            .bind(step.timeout_secs as i64)
            .bind(to_json(&step.retry, "step.retry_policy")?)
            .bind(step.continue_on_failure)
            .bind(step.status.to_string())
            .bind(run.priority.rank())
            .bind(step.eta_ms as i64)
            .bind(to_json(&step.metrics, "step.metrics")?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_run(&self, id: &RunId) -> Result<JobRun, StoreError> {
        let row = sqlx::query("SELECT * FROM job_runs WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("run {}", id)))?;
        run_from_row(&row)
    }

    /// Steps of a run, in index order.
    pub async fn get_run_steps(&self, id: &RunId) -> Result<Vec<JobRunStep>, StoreError> {
        let rows = sqlx::query("SELECT * FROM job_run_steps WHERE run_id = ?1 ORDER BY step_index")
            .bind(id.as_str())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(step_from_row).collect()
    }

    /// Recent runs, optionally filtered by status and/or job.
    pub async fn list_runs(
        &self,
        status: Option<RunStatus>,
        job_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<JobRun>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM job_runs \
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR job_id = ?2) \
             ORDER BY queued_at_ms DESC LIMIT ?3",
        )
        .bind(status.map(|s| s.to_string()))
        .bind(job_id)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(run_from_row).collect()
    }

    /// Non-terminal runs (queued or running).
    pub async fn count_active_runs(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_runs WHERE status IN ('queued', 'running')",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(count as u64)
    }

    /// Queue depth per priority class over queued steps.
    pub async fn queue_depths(&self) -> Result<(u64, u64, u64), StoreError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT priority, COUNT(*) FROM job_run_steps WHERE status = 'queued' \
             GROUP BY priority",
        )
        .fetch_all(self.pool())
        .await?;
        let mut high = 0u64;
        let mut normal = 0u64;
        let mut low = 0u64;
        for (priority, count) in rows {
            match priority {
                2 => high = count as u64,
                0 => low = count as u64,
                _ => normal = count as u64,
            }
        }
        Ok((high, normal, low))
    }

    pub async fn count_queued_steps(&self) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_run_steps WHERE status = 'queued'")
                .fetch_one(self.pool())
                .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
