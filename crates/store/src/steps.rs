// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step leasing, completion, cancellation, and orphan recovery.
//!
//! Every mutation here is one transaction:
//! lease = atomic claim; complete = step update + sibling read + run
//! aggregation; cancel = run flip + queued-step abort. Terminal step
//! statuses are never overwritten.

use crate::rows::{run_from_row, step_from_row, to_json};
use crate::{Store, StoreError};
use oc_core::{
    aggregate_run_status, JobRun, JobRunStep, RunId, RunResultData, RunStatus, StepId, StepStatus,
    StepSummary,
};
use sqlx::Row as _;

/// A step handed to exactly one worker.
#[derive(Debug, Clone)]
pub struct LeasedStep {
    pub step: JobRunStep,
    pub run: JobRun,
    /// True when this lease moved the run from queued to running.
    pub run_started: bool,
}

/// Result of terminally completing a step.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub step: JobRunStep,
    pub run: JobRun,
    /// Terminal run status reached by this completion, if any.
    pub run_transition: Option<RunStatus>,
    /// True when this completion stamped the run's finished_at — either
    /// via a state-machine transition or by finishing an already-canceled run.
    pub run_finished_now: bool,
    /// Queued sibling steps aborted because of a fatal failure.
    pub aborted_steps: Vec<StepId>,
}

/// Result of a user-requested run cancellation.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub run: JobRun,
    pub aborted_steps: Vec<StepId>,
    /// Steps still running; their workers get a cooperative stop signal.
    pub running_steps: Vec<JobRunStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanAction {
    Requeued,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OrphanReport {
    pub step_id: StepId,
    pub run_id: RunId,
    pub action: OrphanAction,
    pub retry_count: u32,
    /// Run transition triggered by failing the orphan, if any.
    pub run_transition: Option<RunStatus>,
}

impl Store {
    /// Atomically claim the next runnable step for `worker`.
    ///
    /// Runnable = queued, past its retry eta, in a live (non-canceled)
    /// run, with every lower-index sibling already terminal. Priority
    /// wins over FIFO; rowid breaks ties in insertion order.
    pub async fn lease_next_step(
        &self,
        worker: &str,
        now_ms: u64,
    ) -> Result<Option<LeasedStep>, StoreError> {
        let lease_token = format!("{}@{}", worker, now_ms);
        let mut tx = self.pool().begin().await?;
        let row = sqlx::query(
            "UPDATE job_run_steps SET \
                 status = 'running', \
                 lease_worker = ?1, \
                 lease_token = ?2, \
                 started_at_ms = ?3 \
             WHERE id = ( \
                 SELECT s.id FROM job_run_steps s \
                 JOIN job_runs r ON r.id = s.run_id \
                 WHERE s.status = 'queued' \
                   AND s.eta_ms <= ?3 \
                   AND r.status IN ('queued', 'running') \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM job_run_steps p \
                       WHERE p.run_id = s.run_id \
                         AND p.step_index < s.step_index \
                         AND p.status IN ('queued', 'running') \
                   ) \
                 ORDER BY s.priority DESC, s.rowid ASC \
                 LIMIT 1 \
             ) \
             RETURNING *",
        )
        .bind(worker)
        .bind(&lease_token)
        .bind(now_ms as i64)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let step = step_from_row(&row)?;

        // First lease moves the run to running and stamps the worker.
        let started = sqlx::query(
            "UPDATE job_runs SET status = 'running', started_at_ms = ?2, worker_hostname = ?3 \
             WHERE id = ?1 AND status = 'queued'",
        )
        .bind(step.run_id.as_str())
        .bind(now_ms as i64)
        .bind(worker)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let run_row = sqlx::query("SELECT * FROM job_runs WHERE id = ?1")
            .bind(step.run_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let run = run_from_row(&run_row)?;
        tx.commit().await?;

        Ok(Some(LeasedStep { step, run, run_started: started }))
    }

    /// Terminally complete a leased step and re-evaluate the run, all in
    /// one transaction. A stale lease is dropped ([`StoreError::LeaseMismatch`])
    /// and a second terminal write is dropped ([`StoreError::AlreadyTerminal`]).
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_step(
        &self,
        step_id: &StepId,
        lease_token: &str,
        status: StepStatus,
        exit_code: Option<i64>,
        stdout: &str,
        stderr: &str,
        error: Option<&str>,
        metrics: &serde_json::Map<String, serde_json::Value>,
        now_ms: u64,
    ) -> Result<CompletionOutcome, StoreError> {
        debug_assert!(status.is_terminal(), "complete_step takes a terminal status");
        let mut tx = self.pool().begin().await?;

        let row = sqlx::query("SELECT * FROM job_run_steps WHERE id = ?1")
            .bind(step_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("step {}", step_id)))?;
        let current = step_from_row(&row)?;
        if current.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal);
        }
        if current.lease_token.as_deref() != Some(lease_token) {
            return Err(StoreError::LeaseMismatch);
        }

        sqlx::query(
            "UPDATE job_run_steps SET status = ?2, exit_code = ?3, stdout = ?4, stderr = ?5, \
             error = ?6, metrics = ?7, finished_at_ms = ?8, lease_worker = NULL, \
             lease_token = NULL WHERE id = ?1",
        )
        .bind(step_id.as_str())
        .bind(status.to_string())
        .bind(exit_code)
        .bind(stdout)
        .bind(stderr)
        .bind(error)
        .bind(to_json(metrics, "step.metrics")?)
        .bind(now_ms as i64)
        .execute(&mut *tx)
        .await?;

        let outcome = finish_and_aggregate(
            &mut tx,
            &current.run_id,
            status == StepStatus::Failed && !current.continue_on_failure,
            now_ms,
        )
        .await?;
        tx.commit().await?;

        let mut step = current;
        step.status = status;
        step.exit_code = exit_code;
        step.stdout = stdout.to_string();
        step.stderr = stderr.to_string();
        step.error = error.map(str::to_string);
        step.finished_at_ms = Some(now_ms);
        step.lease_token = None;

        Ok(CompletionOutcome {
            step,
            run: outcome.0,
            run_transition: outcome.1,
            run_finished_now: outcome.3,
            aborted_steps: outcome.2,
        })
    }

    /// Return a leased step to the queue for a retry attempt.
    pub async fn requeue_step(
        &self,
        step_id: &StepId,
        lease_token: &str,
        eta_ms: u64,
    ) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "UPDATE job_run_steps SET status = 'queued', lease_worker = NULL, \
             lease_token = NULL, started_at_ms = NULL, retry_count = retry_count + 1, \
             eta_ms = ?3 \
             WHERE id = ?1 AND status = 'running' AND lease_token = ?2 \
             RETURNING retry_count",
        )
        .bind(step_id.as_str())
        .bind(lease_token)
        .bind(eta_ms as i64)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::LeaseMismatch)?;
        Ok(row.try_get::<i64, _>("retry_count")? as u32)
    }

    /// User-requested cancel: flip the run, abort queued steps,
    /// and report running steps for cooperative stop.
    pub async fn cancel_run(&self, run_id: &RunId, now_ms: u64) -> Result<CancelOutcome, StoreError> {
        let mut tx = self.pool().begin().await?;
        let row = sqlx::query("SELECT * FROM job_runs WHERE id = ?1")
            .bind(run_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("run {}", run_id)))?;
        let run = run_from_row(&row)?;
        if run.status.is_terminal() {
            return Err(StoreError::RunTerminal);
        }

        let aborted_rows = sqlx::query(
            "UPDATE job_run_steps SET status = 'aborted', finished_at_ms = ?2 \
             WHERE run_id = ?1 AND status = 'queued' RETURNING id",
        )
        .bind(run_id.as_str())
        .bind(now_ms as i64)
        .fetch_all(&mut *tx)
        .await?;
        let aborted_steps = aborted_rows
            .iter()
            .map(|row| Ok(StepId::from_string(row.try_get::<String, _>("id")?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let running_rows =
            sqlx::query("SELECT * FROM job_run_steps WHERE run_id = ?1 AND status = 'running'")
                .bind(run_id.as_str())
                .fetch_all(&mut *tx)
                .await?;
        let running_steps =
            running_rows.iter().map(step_from_row).collect::<Result<Vec<_>, _>>()?;

        // The run flips to canceled immediately; finished_at waits for any
        // still-running steps to reach a terminal state.
        let finished = if running_steps.is_empty() { Some(now_ms as i64) } else { None };
        sqlx::query(
            "UPDATE job_runs SET status = 'canceled', finished_at_ms = COALESCE(?2, finished_at_ms) \
             WHERE id = ?1",
        )
        .bind(run_id.as_str())
        .bind(finished)
        .execute(&mut *tx)
        .await?;

        if running_steps.is_empty() {
            write_result_data(&mut tx, run_id, now_ms).await?;
        }

        let run_row = sqlx::query("SELECT * FROM job_runs WHERE id = ?1")
            .bind(run_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let run = run_from_row(&run_row)?;
        tx.commit().await?;

        Ok(CancelOutcome { run, aborted_steps, running_steps })
    }

    /// Janitor sweep: running steps whose
    /// lease has outlived `timeout + grace` and whose worker heartbeat is
    /// stale get requeued (budget left) or failed as orphaned.
    pub async fn sweep_orphans(
        &self,
        now_ms: u64,
        liveness_window_secs: u64,
        grace_secs: u64,
    ) -> Result<Vec<OrphanReport>, StoreError> {
        let stale_before = now_ms.saturating_sub(liveness_window_secs * 1000) as i64;
        let rows = sqlx::query(
            "SELECT s.* FROM job_run_steps s \
             WHERE s.status = 'running' \
               AND s.started_at_ms IS NOT NULL \
               AND (s.started_at_ms + (s.timeout_secs + ?2) * 1000) < ?1 \
               AND (s.lease_worker IS NULL OR NOT EXISTS ( \
                   SELECT 1 FROM workers w \
                   WHERE w.hostname = s.lease_worker AND w.last_heartbeat_ms >= ?3 \
               ))",
        )
        .bind(now_ms as i64)
        .bind(grace_secs as i64)
        .bind(stale_before)
        .fetch_all(self.pool())
        .await?;

        let mut reports = Vec::new();
        for row in &rows {
            let step = step_from_row(row)?;
            let report = if step.retry_count < step.retry.max_retries {
                let lease = step.lease_token.clone().unwrap_or_default();
                let retry_count = self.requeue_step(&step.id, &lease, now_ms).await?;
                tracing::warn!(
                    step = %step.id,
                    run = %step.run_id,
                    retry_count,
                    "expired lease returned to queue"
                );
                OrphanReport {
                    step_id: step.id.clone(),
                    run_id: step.run_id.clone(),
                    action: OrphanAction::Requeued,
                    retry_count,
                    run_transition: None,
                }
            } else {
                let outcome = self.fail_orphaned_step(&step.id, now_ms).await?;
                tracing::warn!(step = %step.id, run = %step.run_id, "orphaned step failed");
                OrphanReport {
                    step_id: step.id.clone(),
                    run_id: step.run_id.clone(),
                    action: OrphanAction::Failed,
                    retry_count: step.retry_count,
                    run_transition: outcome.run_transition,
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Fail a step whose worker is gone, bypassing the lease check, with
    /// the fixed orphan message.
    async fn fail_orphaned_step(
        &self,
        step_id: &StepId,
        now_ms: u64,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut tx = self.pool().begin().await?;
        let row = sqlx::query("SELECT * FROM job_run_steps WHERE id = ?1")
            .bind(step_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("step {}", step_id)))?;
        let current = step_from_row(&row)?;
        if current.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal);
        }

        sqlx::query(
            "UPDATE job_run_steps SET status = 'failed', error = ?2, finished_at_ms = ?3, \
             lease_worker = NULL, lease_token = NULL WHERE id = ?1",
        )
        .bind(step_id.as_str())
        .bind("orphaned step: worker lost")
        .bind(now_ms as i64)
        .execute(&mut *tx)
        .await?;

        let outcome =
            finish_and_aggregate(&mut tx, &current.run_id, !current.continue_on_failure, now_ms)
                .await?;
        tx.commit().await?;

        let mut step = current;
        step.status = StepStatus::Failed;
        step.error = Some("orphaned step: worker lost".to_string());
        Ok(CompletionOutcome {
            step,
            run: outcome.0,
            run_transition: outcome.1,
            run_finished_now: outcome.3,
            aborted_steps: outcome.2,
        })
    }

    pub async fn get_step(&self, step_id: &StepId) -> Result<JobRunStep, StoreError> {
        let row = sqlx::query("SELECT * FROM job_run_steps WHERE id = ?1")
            .bind(step_id.as_str())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("step {}", step_id)))?;
        step_from_row(&row)
    }
}

/// Shared tail of every completion path: optionally abort queued
/// siblings, re-read the multiset of step statuses, and advance the run
/// if the aggregation rule says so.
async fn finish_and_aggregate(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    run_id: &RunId,
    fatal_failure: bool,
    now_ms: u64,
) -> Result<(JobRun, Option<RunStatus>, Vec<StepId>, bool), StoreError> {
    let mut aborted_steps = Vec::new();
    if fatal_failure {
        let rows = sqlx::query(
            "UPDATE job_run_steps SET status = 'aborted', finished_at_ms = ?2 \
             WHERE run_id = ?1 AND status = 'queued' RETURNING id",
        )
        .bind(run_id.as_str())
        .bind(now_ms as i64)
        .fetch_all(&mut **tx)
        .await?;
        for row in &rows {
            aborted_steps.push(StepId::from_string(row.try_get::<String, _>("id")?));
        }
    }

    let status_rows: Vec<(String, bool)> = sqlx::query_as(
        "SELECT status, continue_on_failure FROM job_run_steps WHERE run_id = ?1",
    )
    .bind(run_id.as_str())
    .fetch_all(&mut **tx)
    .await?;
    let mut statuses = Vec::with_capacity(status_rows.len());
    for (status, continue_on_failure) in &status_rows {
        let parsed: StepStatus =
            status.parse().map_err(|e| crate::rows::corrupt("step.status", e))?;
        statuses.push((parsed, *continue_on_failure));
    }
    let aggregated = aggregate_run_status(&statuses);

    let run_row = sqlx::query("SELECT * FROM job_runs WHERE id = ?1")
        .bind(run_id.as_str())
        .fetch_one(&mut **tx)
        .await?;
    let run = run_from_row(&run_row)?;

    let mut transition = None;
    let mut finished_now = false;
    match aggregated {
        Some(terminal) if !run.status.is_terminal() => {
            write_result_data(tx, run_id, now_ms).await?;
            let error_message = first_error(tx, run_id).await?;
            sqlx::query(
                "UPDATE job_runs SET status = ?2, finished_at_ms = ?3, error_message = ?4 \
                 WHERE id = ?1",
            )
            .bind(run_id.as_str())
            .bind(terminal.to_string())
            .bind(now_ms as i64)
            .bind(match terminal {
                RunStatus::Failed => error_message,
                _ => None,
            })
            .execute(&mut **tx)
            .await?;
            transition = Some(terminal);
            finished_now = true;
        }
        Some(_) if run.status == RunStatus::Canceled && run.finished_at_ms.is_none() => {
            // Last running step of a canceled run has now terminated.
            write_result_data(tx, run_id, now_ms).await?;
            sqlx::query("UPDATE job_runs SET finished_at_ms = ?2 WHERE id = ?1")
                .bind(run_id.as_str())
                .bind(now_ms as i64)
                .execute(&mut **tx)
                .await?;
            finished_now = true;
        }
        _ => {}
    }

    let run_row = sqlx::query("SELECT * FROM job_runs WHERE id = ?1")
        .bind(run_id.as_str())
        .fetch_one(&mut **tx)
        .await?;
    let run = run_from_row(&run_row)?;
    Ok((run, transition, aborted_steps, finished_now))
}

/// Compute and persist result_data from the step rows.
async fn write_result_data(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    run_id: &RunId,
    now_ms: u64,
) -> Result<RunResultData, StoreError> {
    let rows = sqlx::query(
        "SELECT step_index, step_type, status, exit_code, error FROM job_run_steps \
         WHERE run_id = ?1 ORDER BY step_index",
    )
    .bind(run_id.as_str())
    .fetch_all(&mut **tx)
    .await?;

    let mut data = RunResultData::default();
    for row in &rows {
        let status: StepStatus = row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e| crate::rows::corrupt("step.status", e))?;
        data.steps_total += 1;
        match status {
            StepStatus::Succeeded => data.steps_succeeded += 1,
            StepStatus::Failed => data.steps_failed += 1,
            StepStatus::Skipped => data.steps_skipped += 1,
            StepStatus::Aborted => data.steps_aborted += 1,
            _ => {}
        }
        data.steps.push(StepSummary {
            index: row.try_get::<i64, _>("step_index")? as u32,
            step_type: row.try_get("step_type")?,
            status,
            exit_code: row.try_get("exit_code")?,
            error: row.try_get("error")?,
        });
    }

    let started: Option<i64> =
        sqlx::query_scalar("SELECT started_at_ms FROM job_runs WHERE id = ?1")
            .bind(run_id.as_str())
            .fetch_one(&mut **tx)
            .await?;
    data.duration_ms = started.map(|s| now_ms.saturating_sub(s as u64)).unwrap_or(0);

    sqlx::query("UPDATE job_runs SET result_data = ?2 WHERE id = ?1")
        .bind(run_id.as_str())
        .bind(to_json(&data, "run.result_data")?)
        .execute(&mut **tx)
        .await?;
    Ok(data)
}

/// First failed step's error, for the run-level error message.
async fn first_error(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    run_id: &RunId,
) -> Result<Option<String>, StoreError> {
    let row = sqlx::query(
        "SELECT step_index, error, stderr FROM job_run_steps \
         WHERE run_id = ?1 AND status = 'failed' ORDER BY step_index LIMIT 1",
    )
    .bind(run_id.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|row| {
        let index: i64 = row.try_get("step_index").unwrap_or_default();
        let error: Option<String> = row.try_get("error").unwrap_or_default();
        let stderr: String = row.try_get("stderr").unwrap_or_default();
        let detail = error.unwrap_or(stderr);
        format!("step {} failed: {}", index, oc_core::short(&detail, 500))
    }))
}

#[cfg(test)]
#[path = "steps_tests.rs"]
mod tests;
