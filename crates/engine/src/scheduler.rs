// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: a single-writer tick loop that fires due schedules
//! into the orchestrator and advances their next fire time.

use crate::orchestrator::{Orchestrator, RunRequest};
use crate::EngineError;
use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule as CronSchedule;
use oc_core::{Clock, RunPriority, RunTrigger, Schedule, ScheduleKind};
use oc_store::Store;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval: Duration::from_secs(30) }
    }
}

/// Validate a user-supplied 5-field cron expression.
///
/// The `cron` crate parses a seconds-first form, so the user expression
/// is widened with a zero seconds field before parsing.
pub fn validate_cron_expression(expression: &str) -> Result<(), String> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(format!("cron expression must have 5 fields, got {}", fields));
    }
    CronSchedule::from_str(&format!("0 {}", expression))
        .map(|_| ())
        .map_err(|e| format!("invalid cron expression: {}", e))
}

/// Next fire time strictly after `after_ms`, or None for an invalid
/// expression or exhausted schedule.
pub fn next_cron_fire(expression: &str, after_ms: u64) -> Option<u64> {
    let schedule = CronSchedule::from_str(&format!("0 {}", expression)).ok()?;
    let after: DateTime<Utc> = Utc.timestamp_millis_opt(after_ms as i64).single()?;
    schedule.after(&after).next().map(|dt| dt.timestamp_millis() as u64)
}

/// First fire time for a new schedule: once fires immediately,
/// recurring after one interval, cron at its next match.
pub fn initial_next_fire(schedule: &Schedule, now_ms: u64) -> Option<u64> {
    match schedule.kind {
        ScheduleKind::Once => Some(now_ms),
        ScheduleKind::Recurring => {
            schedule.interval_seconds.map(|interval| now_ms + interval * 1000)
        }
        ScheduleKind::Cron => {
            schedule.cron_expression.as_deref().and_then(|expr| next_cron_fire(expr, now_ms))
        }
    }
}

/// Advance after a fire, applying the missed-tick policy: a schedule
/// that fell behind fires exactly once and jumps to the next whole
/// boundary ≥ now (no catch-up replay).
fn advance_after_fire(schedule: &Schedule, now_ms: u64) -> Option<u64> {
    match schedule.kind {
        ScheduleKind::Once => None,
        ScheduleKind::Recurring => {
            let interval_ms = schedule.interval_seconds.unwrap_or(0).saturating_mul(1000);
            if interval_ms == 0 {
                return None;
            }
            let base = schedule.next_run_at_ms.unwrap_or(now_ms);
            let mut next = base + interval_ms;
            if next <= now_ms {
                let behind = now_ms - base;
                let intervals = behind / interval_ms + 1;
                next = base + intervals * interval_ms;
            }
            Some(next)
        }
        ScheduleKind::Cron => {
            schedule.cron_expression.as_deref().and_then(|expr| next_cron_fire(expr, now_ms))
        }
    }
}

pub struct Scheduler<C: Clock> {
    store: Store,
    orchestrator: Arc<Orchestrator<C>>,
    clock: C,
    config: SchedulerConfig,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        store: Store,
        orchestrator: Arc<Orchestrator<C>>,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        Self { store, orchestrator, clock, config }
    }

    pub async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.config.tick_interval) => {}
                () = shutdown.cancelled() => break,
            }
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "scheduler tick failed");
            }
        }
    }

    /// One tick: fire every due schedule, advance its cadence,
    /// and deactivate exhausted ones. Returns the number fired.
    pub async fn tick(&self) -> Result<u32, EngineError> {
        let now = self.clock.epoch_ms();
        let due = self.store.due_schedules(now).await?;
        let mut fired = 0;
        for schedule in due {
            match self.fire(&schedule, now).await {
                Ok(()) => fired += 1,
                Err(EngineError::NotFound(what)) | Err(EngineError::Validation(what)) => {
                    // The job is gone or its definition no longer
                    // translates; keeping the schedule active would fire
                    // a failing run every tick.
                    tracing::warn!(
                        schedule = %schedule.id,
                        job = %schedule.job_id,
                        reason = %what,
                        "deactivating schedule"
                    );
                    self.store.set_schedule_active(&schedule.id, false).await?;
                }
                Err(other) => {
                    tracing::error!(schedule = %schedule.id, error = %other, "schedule fire failed");
                }
            }
        }
        Ok(fired)
    }

    async fn fire(&self, schedule: &Schedule, now_ms: u64) -> Result<(), EngineError> {
        let run = self
            .orchestrator
            .run(RunRequest {
                job_id: schedule.job_id.clone(),
                parameters: schedule.parameters.clone(),
                priority: RunPriority::Normal,
                trigger: RunTrigger::Scheduled,
                requested_by: schedule.created_by.clone(),
                schedule_id: Some(schedule.id.clone()),
            })
            .await
            .map_err(|e| match e {
                EngineError::Translate(inner) => EngineError::Validation(inner.to_string()),
                other => other,
            })?;

        let next = advance_after_fire(schedule, now_ms);
        let updated = self.store.record_schedule_fire(&schedule.id, now_ms, next).await?;
        tracing::info!(
            schedule = %schedule.id,
            run = %run.id,
            run_count = updated.run_count,
            next_run_at = ?updated.next_run_at_ms,
            active = updated.is_active,
            "schedule fired"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
