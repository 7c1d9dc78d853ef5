// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side dispatch and retry handling: lease a step,
//! drive its executor, write the terminal outcome, and surface every
//! transition on the status bus.

use crate::bus::StatusBus;
use crate::completion::CompletionNotifier;
use crate::context::build_job_context;
use crate::orchestrator::TargetSource;
use crate::EngineError;
use oc_core::{
    backoff_delay, Clock, RunId, RunStatus, StatusEvent, StepOutcome, StepResultStatus, StepStatus,
};
use oc_exec::{CredentialsResolver, ExecutorRegistry, StepContext};
use oc_store::{CompletionOutcome, LeasedStep, Store, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared map of in-flight steps to their cooperative stop tokens.
/// The orchestrator cancels by run; the dispatcher registers by step.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<Mutex<HashMap<String, (RunId, CancellationToken)>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, step_id: &str, run_id: RunId) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.lock().insert(step_id.to_string(), (run_id, token.clone()));
        token
    }

    pub fn remove(&self, step_id: &str) {
        self.inner.lock().remove(step_id);
    }

    /// Fire the advisory stop signal for every running step of a run.
    pub fn cancel_run(&self, run_id: &RunId) {
        for (owner, token) in self.inner.lock().values() {
            if owner == run_id {
                token.cancel();
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().len()
    }
}

#[derive(Clone)]
pub struct DispatcherConfig {
    pub worker_hostname: String,
    /// Poll delay when the queue is empty.
    pub poll_interval: Duration,
    /// Concurrent steps this worker services (`worker_prefetch`).
    pub prefetch: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_hostname: "worker".to_string(),
            poll_interval: Duration::from_millis(500),
            prefetch: 1,
        }
    }
}

pub struct Dispatcher<C: Clock> {
    store: Store,
    registry: ExecutorRegistry,
    bus: StatusBus,
    targets: Arc<dyn TargetSource>,
    credentials: Option<Arc<CredentialsResolver>>,
    cancels: CancelRegistry,
    notifier: CompletionNotifier,
    clock: C,
    config: DispatcherConfig,
}

impl<C: Clock> Dispatcher<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        registry: ExecutorRegistry,
        bus: StatusBus,
        targets: Arc<dyn TargetSource>,
        credentials: Option<Arc<CredentialsResolver>>,
        cancels: CancelRegistry,
        notifier: CompletionNotifier,
        clock: C,
        config: DispatcherConfig,
    ) -> Self {
        Self { store, registry, bus, targets, credentials, cancels, notifier, clock, config }
    }

    /// Long-running worker loop: lease and execute until shutdown, with
    /// at most `prefetch` steps in flight at once.
    pub async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let prefetch = self.config.prefetch.max(1) as u32;
        let semaphore = Arc::new(tokio::sync::Semaphore::new(prefetch as usize));
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
            let leased = match self.store.lease_next_step(
                &self.config.worker_hostname,
                self.clock.epoch_ms(),
            )
            .await
            {
                Ok(leased) => leased,
                Err(e) => {
                    tracing::error!(error = %e, "lease poll failed");
                    None
                }
            };
            match leased {
                Some(step) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        let _in_flight = permit;
                        if let Err(e) = this.process(step).await {
                            tracing::error!(error = %e, "step processing failed");
                        }
                    });
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = shutdown.cancelled() => break,
                    }
                }
            }
        }
        // Drain: wait for every in-flight step to finish.
        let _ = semaphore.acquire_many(prefetch).await;
        tracing::info!(worker = %self.config.worker_hostname, "dispatcher drained");
    }

    /// Lease and fully process at most one step. Returns whether a step
    /// was available.
    pub async fn tick(&self) -> Result<bool, EngineError> {
        let now = self.clock.epoch_ms();
        let Some(leased) = self.store.lease_next_step(&self.config.worker_hostname, now).await?
        else {
            return Ok(false);
        };
        self.process(leased).await?;
        Ok(true)
    }

    async fn process(&self, leased: LeasedStep) -> Result<(), EngineError> {
        let LeasedStep { step, run, run_started } = leased;
        let lease_token = step.lease_token.clone().unwrap_or_default();
        let now = self.clock.epoch_ms();

        if run_started {
            self.bus.publish(StatusEvent::JobStatusUpdate {
                run_id: run.id.clone(),
                job_id: run.job_id.clone(),
                status: RunStatus::Running,
                correlation_id: run.correlation_id.clone(),
                timestamp_ms: now,
            });
        }
        self.bus.publish(StatusEvent::StepStatusUpdate {
            run_id: run.id.clone(),
            step_index: step.index,
            step_type: step.step_type.clone(),
            status: StepStatus::Running,
            exit_code: None,
            timestamp_ms: now,
        });

        // Assemble the execution context: target, credentials, job
        // context, cooperative cancel token.
        let job = self.store.get_job(&run.job_id).await?;
        let targets = self.targets.snapshot().await;
        let target = step
            .target_host
            .as_deref()
            .and_then(|host| targets.get(host).cloned());

        let secret = if needs_credentials(&step.step_type) {
            match (&self.credentials, &target) {
                (Some(resolver), Some(target)) => {
                    match resolver.resolve(target, step.credential_hint.as_deref()).await {
                        Ok(material) => Some(material),
                        Err(failure) => {
                            if let Some(outcome) = self
                                .finish_step(
                                    &step.id,
                                    &lease_token,
                                    StepStatus::Failed,
                                    None,
                                    "",
                                    &failure.message,
                                    Some(&failure.message),
                                    &serde_json::Map::new(),
                                )
                                .await?
                            {
                                self.publish_completion(&job.name, outcome).await;
                            }
                            return Ok(());
                        }
                    }
                }
                _ => None,
            }
        } else {
            None
        };

        let cancel = self.cancels.register(step.id.as_str(), run.id.clone());
        let job_context = build_job_context(&job, &run, target.as_ref(), &self.clock);
        let ctx = StepContext {
            step: step.clone(),
            run: run.clone(),
            target,
            secret,
            job_context,
            cancel: cancel.clone(),
        };

        let result = self.registry.execute(&ctx).await;
        self.cancels.remove(step.id.as_str());
        drop(ctx);

        match result {
            Ok(outcome) => {
                let status = match outcome.status {
                    StepResultStatus::Succeeded => StepStatus::Succeeded,
                    StepResultStatus::Failed => StepStatus::Failed,
                    StepResultStatus::Skipped => StepStatus::Skipped,
                };
                let StepOutcome { exit_code, stdout, stderr, metrics, .. } = outcome;
                if let Some(completion) = self
                    .finish_step(
                        &step.id,
                        &lease_token,
                        status,
                        Some(exit_code),
                        &stdout,
                        &stderr,
                        None,
                        &metrics,
                    )
                    .await?
                {
                    self.publish_completion(&job.name, completion).await;
                }
            }
            Err(failure) => {
                if cancel.is_cancelled() {
                    // Cooperative cancel: the step aborts, never retries.
                    if let Some(completion) = self
                        .finish_step(
                            &step.id,
                            &lease_token,
                            StepStatus::Aborted,
                            None,
                            "",
                            "",
                            Some("canceled"),
                            &serde_json::Map::new(),
                        )
                        .await?
                    {
                        self.publish_completion(&job.name, completion).await;
                    }
                } else if failure.kind.retryable() && step.retry_count < step.retry.max_retries {
                    let delay = backoff_delay(&step.retry, step.retry_count);
                    let eta = self.clock.epoch_ms() + delay.as_millis() as u64;
                    let retry_count =
                        self.store.requeue_step(&step.id, &lease_token, eta).await?;
                    tracing::info!(
                        step = %step.id,
                        run = %run.id,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.message,
                        "transient failure, step requeued"
                    );
                    self.bus.publish(StatusEvent::StepStatusUpdate {
                        run_id: run.id.clone(),
                        step_index: step.index,
                        step_type: step.step_type.clone(),
                        status: StepStatus::Queued,
                        exit_code: None,
                        timestamp_ms: self.clock.epoch_ms(),
                    });
                } else {
                    if let Some(completion) = self
                        .finish_step(
                            &step.id,
                            &lease_token,
                            StepStatus::Failed,
                            Some(-1),
                            "",
                            &failure.message,
                            Some(&failure.message),
                            &serde_json::Map::new(),
                        )
                        .await?
                    {
                        self.publish_completion(&job.name, completion).await;
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_step(
        &self,
        step_id: &oc_core::StepId,
        lease_token: &str,
        status: StepStatus,
        exit_code: Option<i64>,
        stdout: &str,
        stderr: &str,
        error: Option<&str>,
        metrics: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Option<CompletionOutcome>, EngineError> {
        let now = self.clock.epoch_ms();
        match self
            .store
            .complete_step(step_id, lease_token, status, exit_code, stdout, stderr, error,
                metrics, now)
            .await
        {
            Ok(outcome) => Ok(Some(outcome)),
            Err(StoreError::AlreadyTerminal) | Err(StoreError::LeaseMismatch) => {
                // Idempotence under at-least-once delivery: a competing
                // terminal write already landed and this one is dropped.
                tracing::warn!(step = %step_id, "terminal write dropped (stale lease)");
                Ok(None)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Emit step + run transition events, and run-completion
    /// notifications when the run just reached a terminal state.
    async fn publish_completion(&self, job_name: &str, outcome: CompletionOutcome) {
        let now = self.clock.epoch_ms();
        self.bus.publish(StatusEvent::StepStatusUpdate {
            run_id: outcome.run.id.clone(),
            step_index: outcome.step.index,
            step_type: outcome.step.step_type.clone(),
            status: outcome.step.status,
            exit_code: outcome.step.exit_code,
            timestamp_ms: now,
        });

        let canceled_just_finished =
            outcome.run.status == RunStatus::Canceled && outcome.run_finished_now;
        if let Some(terminal) = outcome.run_transition {
            self.bus.publish(StatusEvent::JobStatusUpdate {
                run_id: outcome.run.id.clone(),
                job_id: outcome.run.job_id.clone(),
                status: terminal,
                correlation_id: outcome.run.correlation_id.clone(),
                timestamp_ms: now,
            });
        }
        if outcome.run_transition.is_some() || canceled_just_finished {
            let result = outcome.run.result_data.clone().unwrap_or_default();
            self.bus.publish(StatusEvent::JobCompleted {
                run_id: outcome.run.id.clone(),
                job_id: outcome.run.job_id.clone(),
                status: outcome.run.status,
                correlation_id: outcome.run.correlation_id.clone(),
                result,
                timestamp_ms: now,
            });
            if outcome.run.status == RunStatus::Failed {
                self.bus.publish(StatusEvent::RunFailed {
                    run_id: outcome.run.id.clone(),
                    correlation_id: outcome.run.correlation_id.clone(),
                    reason: outcome
                        .run
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "run failed".to_string()),
                    timestamp_ms: now,
                });
            }
            // Run-completion notification: a distinct path from step
            // notifications, fired after the aggregation transition.
            self.notifier.run_finished(job_name, &outcome.run).await;
        }
    }
}

/// SSH/WinRM families authenticate through the resolver; HTTP-family
/// steps carry their auth inline and control steps have none.
fn needs_credentials(step_type: &str) -> bool {
    step_type.starts_with("ssh.")
        || step_type.starts_with("sftp.")
        || step_type.starts_with("winrm.")
        || step_type.starts_with("windows.")
        || step_type == "script"
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
