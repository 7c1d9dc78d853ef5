// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Janitor: lease recovery and orphaned-step repair, run at startup and
//! periodically, reclaiming leases of dead workers and pruning stale
//! worker registrations.

use crate::bus::StatusBus;
use crate::EngineError;
use oc_core::{Clock, RunStatus, StatusEvent, DEFAULT_LIVENESS_WINDOW_SECS};
use oc_store::{OrphanAction, OrphanReport, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct JanitorConfig {
    pub sweep_interval: Duration,
    pub liveness_window_secs: u64,
    /// Slack beyond the step timeout before a lease counts as expired.
    pub grace_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            liveness_window_secs: DEFAULT_LIVENESS_WINDOW_SECS,
            grace_secs: 60,
        }
    }
}

pub struct Janitor<C: Clock> {
    store: Store,
    bus: StatusBus,
    clock: C,
    config: JanitorConfig,
}

impl<C: Clock> Janitor<C> {
    pub fn new(store: Store, bus: StatusBus, clock: C, config: JanitorConfig) -> Self {
        Self { store, bus, clock, config }
    }

    pub async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.config.sweep_interval) => {}
                () = shutdown.cancelled() => break,
            }
            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, "janitor sweep failed");
            }
        }
    }

    /// One sweep: reclaim expired leases, then prune long-dead workers.
    pub async fn sweep(&self) -> Result<Vec<OrphanReport>, EngineError> {
        let now = self.clock.epoch_ms();
        let reports = self
            .store
            .sweep_orphans(now, self.config.liveness_window_secs, self.config.grace_secs)
            .await?;

        for report in &reports {
            if report.action == OrphanAction::Failed {
                if let Some(RunStatus::Failed) = report.run_transition {
                    if let Ok(run) = self.store.get_run(&report.run_id).await {
                        self.bus.publish(StatusEvent::JobStatusUpdate {
                            run_id: run.id.clone(),
                            job_id: run.job_id.clone(),
                            status: RunStatus::Failed,
                            correlation_id: run.correlation_id.clone(),
                            timestamp_ms: now,
                        });
                        self.bus.publish(StatusEvent::RunFailed {
                            run_id: run.id.clone(),
                            correlation_id: run.correlation_id.clone(),
                            reason: "orphaned step: worker lost".to_string(),
                            timestamp_ms: now,
                        });
                    }
                }
            }
        }

        let pruned = self
            .store
            .prune_dead_workers(now, self.config.liveness_window_secs)
            .await?;
        if pruned > 0 {
            tracing::info!(pruned, "pruned dead worker registrations");
        }
        Ok(reports)
    }
}

#[cfg(test)]
#[path = "janitor_tests.rs"]
mod tests;
