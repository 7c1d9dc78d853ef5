// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run orchestrator: materialize runs, cancel them, and serve
//! status snapshots.

use crate::bus::StatusBus;
use crate::dispatcher::CancelRegistry;
use crate::EngineError;
use async_trait::async_trait;
use oc_core::{
    Clock, CorrelationId, JobRun, JobRunStep, RunId, RunPriority, RunResultData, RunStatus,
    RunTrigger, ScheduleId, StatusEvent, Target,
};
use oc_store::Store;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Supplies the target snapshot the translator resolves hostnames
/// against. The production impl wraps the asset-registry client; tests
/// use [`StaticTargets`].
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn snapshot(&self) -> BTreeMap<String, Target>;
}

/// Fixed in-memory target set.
#[derive(Debug, Clone, Default)]
pub struct StaticTargets(pub BTreeMap<String, Target>);

impl StaticTargets {
    pub fn with(targets: &[Target]) -> Self {
        let mut map = BTreeMap::new();
        for target in targets {
            map.insert(target.name.clone(), target.clone());
            map.insert(target.hostname.clone(), target.clone());
        }
        Self(map)
    }
}

#[async_trait]
impl TargetSource for StaticTargets {
    async fn snapshot(&self) -> BTreeMap<String, Target> {
        self.0.clone()
    }
}

#[async_trait]
impl TargetSource for oc_exec::TargetRegistryClient {
    async fn snapshot(&self) -> BTreeMap<String, Target> {
        match oc_exec::TargetRegistryClient::snapshot(self).await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "target registry unavailable, translating without targets");
                BTreeMap::new()
            }
        }
    }
}

/// Parameters of a run request.
pub struct RunRequest {
    pub job_id: oc_core::JobId,
    pub parameters: HashMap<String, serde_json::Value>,
    pub priority: RunPriority,
    pub trigger: RunTrigger,
    pub requested_by: String,
    pub schedule_id: Option<ScheduleId>,
}

pub struct Orchestrator<C: Clock> {
    store: Store,
    bus: StatusBus,
    targets: Arc<dyn TargetSource>,
    cancels: CancelRegistry,
    clock: C,
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        store: Store,
        bus: StatusBus,
        targets: Arc<dyn TargetSource>,
        cancels: CancelRegistry,
        clock: C,
    ) -> Self {
        Self { store, bus, targets, cancels, clock }
    }

    /// Materialize a run: translate, persist run + steps in one
    /// transaction, and announce it. Translation failures (including
    /// strict-undefined template errors) surface before anything is
    /// persisted — the run never reaches `queued`.
    pub async fn run(&self, request: RunRequest) -> Result<JobRun, EngineError> {
        let job = self.store.get_job(&request.job_id).await?;
        if !job.is_active {
            return Err(EngineError::NotFound(format!("job {} is inactive", job.id)));
        }

        let targets = self.targets.snapshot().await;
        let report =
            oc_workflow::translate(&job.definition, &request.parameters, &self.clock, &targets)?;
        for warning in &report.warnings {
            tracing::warn!(job = %job.id, warning, "workflow translation warning");
        }

        let now = self.clock.epoch_ms();
        let empty = report.steps.is_empty();
        let mut run = JobRun {
            id: RunId::fresh(),
            job_id: job.id.clone(),
            job_version: job.version,
            status: RunStatus::Queued,
            priority: request.priority,
            trigger: request.trigger,
            requested_by: request.requested_by,
            parameters: request.parameters,
            correlation_id: CorrelationId::fresh(),
            schedule_id: request.schedule_id,
            worker_hostname: None,
            queued_at_ms: now,
            started_at_ms: None,
            finished_at_ms: None,
            retry_count: 0,
            result_data: None,
            error_message: None,
        };
        if empty {
            // An empty graph is a valid workflow that succeeds trivially.
            run.status = RunStatus::Succeeded;
            run.started_at_ms = Some(now);
            run.finished_at_ms = Some(now);
            run.result_data = Some(RunResultData::default());
        }

        let steps: Vec<JobRunStep> = report
            .steps
            .into_iter()
            .map(|step| JobRunStep::from_execution(&run.id, step))
            .collect();
        self.store.materialize_run(&run, &steps).await?;

        tracing::info!(
            run = %run.id,
            job = %job.id,
            correlation = %run.correlation_id,
            steps = steps.len(),
            priority = %run.priority,
            "run materialized"
        );
        self.bus.publish(StatusEvent::JobStatusUpdate {
            run_id: run.id.clone(),
            job_id: job.id.clone(),
            status: run.status,
            correlation_id: run.correlation_id.clone(),
            timestamp_ms: now,
        });
        if empty {
            self.bus.publish(StatusEvent::JobCompleted {
                run_id: run.id.clone(),
                job_id: job.id.clone(),
                status: RunStatus::Succeeded,
                correlation_id: run.correlation_id.clone(),
                result: RunResultData::default(),
                timestamp_ms: now,
            });
        }
        Ok(run)
    }

    /// Cancel: flip the run, abort queued steps, and send
    /// the cooperative stop signal to workers holding running steps.
    pub async fn cancel(&self, run_id: &RunId) -> Result<JobRun, EngineError> {
        let now = self.clock.epoch_ms();
        let outcome = self.store.cancel_run(run_id, now).await?;

        // Advisory stop for whoever holds the running steps.
        self.cancels.cancel_run(run_id);

        self.bus.publish(StatusEvent::JobStatusUpdate {
            run_id: run_id.clone(),
            job_id: outcome.run.job_id.clone(),
            status: RunStatus::Canceled,
            correlation_id: outcome.run.correlation_id.clone(),
            timestamp_ms: now,
        });
        if outcome.running_steps.is_empty() {
            // Nothing left in flight: the run is fully finished now.
            self.bus.publish(StatusEvent::JobCompleted {
                run_id: run_id.clone(),
                job_id: outcome.run.job_id.clone(),
                status: RunStatus::Canceled,
                correlation_id: outcome.run.correlation_id.clone(),
                result: outcome.run.result_data.clone().unwrap_or_default(),
                timestamp_ms: now,
            });
        }
        tracing::info!(
            run = %run_id,
            aborted = outcome.aborted_steps.len(),
            running = outcome.running_steps.len(),
            "run canceled"
        );
        Ok(outcome.run)
    }

    /// Snapshot view: the run plus its per-step summary.
    pub async fn status(&self, run_id: &RunId) -> Result<(JobRun, Vec<JobRunStep>), EngineError> {
        let run = self.store.get_run(run_id).await?;
        let steps = self.store.get_run_steps(run_id).await?;
        Ok((run, steps))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn bus(&self) -> &StatusBus {
        &self.bus
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
