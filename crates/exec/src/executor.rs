// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The uniform executor contract and the type-tag registry.

use crate::redact::redact_outcome;
use async_trait::async_trait;
use oc_core::{FailureKind, JobRun, JobRunStep, SecretMaterial, StepOutcome, Target};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Infrastructure-class failure an executor could not express as a
/// protocol result. The dispatcher maps `kind` onto the retry policy.
#[derive(Debug, Error, Clone)]
#[error("{kind} failure: {message}")]
pub struct ExecFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ExecFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Transient, message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Protocol, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Validation, message: message.into() }
    }

    pub fn safety(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Safety, message: message.into() }
    }
}

/// Everything a driver may consult for one step invocation. Secret
/// material lives only as long as this context.
pub struct StepContext {
    pub step: JobRunStep,
    pub run: JobRun,
    pub target: Option<Target>,
    pub secret: Option<SecretMaterial>,
    /// Rendering context for execution-time templates (notifications):
    /// `job`, `user`, `target`, `system`, plus the run parameters.
    pub job_context: serde_json::Value,
    /// Cooperative stop signal; checked at protocol-safe points.
    pub cancel: CancellationToken,
}

impl StepContext {
    /// Target, or a validation failure when the step type requires one.
    pub fn require_target(&self) -> Result<&Target, ExecFailure> {
        self.target.as_ref().ok_or_else(|| {
            ExecFailure::validation(match &self.step.target_host {
                Some(host) => format!("target {:?} not found in registry", host),
                None => "step requires a target".to_string(),
            })
        })
    }

    pub fn require_secret(&self) -> Result<&SecretMaterial, ExecFailure> {
        self.secret
            .as_ref()
            .ok_or_else(|| ExecFailure::validation("no credentials resolved for target"))
    }
}

/// A per-step-type protocol driver. Implementations must honor the step
/// timeout, treat payload strings as already rendered, and never touch
/// the step row — the worker framework owns persistence.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure>;
}

/// Registry keyed by step type tag (`ssh.exec`, `http.get`, ...).
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<&'static str, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: &'static str, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(tag, executor);
    }

    pub fn register_many(&mut self, tags: &[&'static str], executor: Arc<dyn StepExecutor>) {
        for tag in tags {
            self.executors.insert(tag, executor.clone());
        }
    }

    /// The full production registry wired to the given clients.
    pub fn standard(
        notifier: Arc<crate::notify::NotificationClient>,
    ) -> Self {
        let mut registry = Self::new();
        let ssh = Arc::new(crate::ssh::SshExecutor::new());
        registry.register_many(
            &["ssh.exec", "ssh.copy", "script", "sftp.upload", "sftp.download", "sftp.sync"],
            ssh,
        );
        let winrm = Arc::new(crate::winrm::WinrmExecutor::new());
        registry.register_many(&["winrm.exec", "winrm.copy", "windows.command"], winrm);
        let http = Arc::new(crate::http::HttpExecutor::new());
        registry.register_many(
            &["http.get", "http.post", "http.put", "http.delete", "http.patch", "webhook.call"],
            http,
        );
        registry.register("database", Arc::new(crate::database::DatabaseExecutor::new()));
        let notify = Arc::new(crate::notify::NotifyExecutor::new(notifier));
        registry.register_many(
            &[
                "notify.email",
                "notify.slack",
                "notify.teams",
                "notify.webhook",
                "notify.conditional",
            ],
            notify,
        );
        let control = Arc::new(crate::control::ControlExecutor::new());
        registry.register_many(
            &["condition", "loop", "decision", "parallel", "data.transform", "data.validate"],
            control,
        );
        registry
    }

    /// Execute a step under its hard timeout cap, with secrets redacted
    /// from the outcome before it is returned.
    pub async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
        let tag = ctx.step.step_type.as_str();
        let Some(executor) = self.executors.get(tag) else {
            return Err(ExecFailure::validation(format!("unknown step type: {}", tag)));
        };

        let timeout = std::time::Duration::from_secs(ctx.step.timeout_secs.max(1));
        let started = std::time::Instant::now();
        let result = tokio::select! {
            result = tokio::time::timeout(timeout, executor.execute(ctx)) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ExecFailure::transient(format!(
                    "step timed out after {}s",
                    ctx.step.timeout_secs
                ))),
            },
            () = ctx.cancel.cancelled() => Err(ExecFailure {
                kind: oc_core::FailureKind::Protocol,
                message: "canceled".to_string(),
            }),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(mut outcome) => {
                if let Some(secret) = &ctx.secret {
                    redact_outcome(&mut outcome, secret);
                }
                outcome
                    .metrics
                    .insert("elapsed_ms".to_string(), serde_json::Value::from(elapsed_ms));
                tracing::info!(
                    step = %ctx.step.id,
                    run = %ctx.run.id,
                    correlation = %ctx.run.correlation_id,
                    step_type = tag,
                    status = %outcome.status,
                    elapsed_ms,
                    "step executed"
                );
                Ok(outcome)
            }
            Err(failure) => {
                tracing::warn!(
                    step = %ctx.step.id,
                    run = %ctx.run.id,
                    correlation = %ctx.run.correlation_id,
                    step_type = tag,
                    kind = %failure.kind,
                    elapsed_ms,
                    error = %failure.message,
                    "step execution failed"
                );
                Err(failure)
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Scripted outcome for one step type or command.
    #[derive(Debug, Clone)]
    pub enum FakeOutcome {
        Succeed { stdout: String },
        Fail { exit_code: i64, stderr: String },
        Transient { message: String },
        /// Sleep until canceled, then report the cooperative abort.
        BlockUntilCancel,
    }

    /// Test double standing in for every protocol driver. Commands are
    /// matched by substring; unmatched steps succeed with empty output.
    #[derive(Clone, Default)]
    pub struct FakeExecutor {
        rules: Arc<Mutex<Vec<(String, FakeOutcome)>>>,
        executed: Arc<Mutex<Vec<String>>>,
    }

    impl FakeExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(&self, needle: &str, outcome: FakeOutcome) {
            self.rules.lock().push((needle.to_string(), outcome));
        }

        /// Step descriptors in execution order (`type:node-command`).
        pub fn executed(&self) -> Vec<String> {
            self.executed.lock().clone()
        }

        fn descriptor(step: &JobRunStep) -> String {
            match &step.payload {
                oc_core::StepPayload::SshExec { command, .. } => {
                    format!("{}:{}", step.step_type, command)
                }
                _ => step.step_type.clone(),
            }
        }
    }

    #[async_trait]
    impl StepExecutor for FakeExecutor {
        async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
            let descriptor = Self::descriptor(&ctx.step);
            self.executed.lock().push(descriptor.clone());
            let matched = self
                .rules
                .lock()
                .iter()
                .find(|(needle, _)| descriptor.contains(needle.as_str()))
                .map(|(_, outcome)| outcome.clone());
            match matched {
                Some(FakeOutcome::Succeed { stdout }) => Ok(StepOutcome::succeeded(stdout)),
                Some(FakeOutcome::Fail { exit_code, stderr }) => {
                    Ok(StepOutcome::failed(exit_code, stderr))
                }
                Some(FakeOutcome::Transient { message }) => Err(ExecFailure::transient(message)),
                Some(FakeOutcome::BlockUntilCancel) => {
                    ctx.cancel.cancelled().await;
                    Err(ExecFailure::protocol("canceled"))
                }
                None => Ok(StepOutcome::succeeded("")),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeExecutor, FakeOutcome};

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
