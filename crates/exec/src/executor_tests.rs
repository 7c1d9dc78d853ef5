// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oc_core::test_support::ssh_exec_step;
use oc_core::{JobRun, JobRunStep, StepResultStatus};
use std::sync::Arc as StdArc;

fn context_for(command: &str, timeout_secs: u64) -> StepContext {
    let run = JobRun::builder().build();
    let mut exec = ssh_exec_step(0, command);
    exec.timeout_secs = timeout_secs;
    let step = JobRunStep::from_execution(&run.id, exec);
    StepContext {
        step,
        run,
        target: None,
        secret: None,
        job_context: serde_json::json!({}),
        cancel: CancellationToken::new(),
    }
}

fn registry_with_fake(fake: FakeExecutor) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register("ssh.exec", StdArc::new(fake));
    registry
}

#[tokio::test]
async fn registry_dispatches_by_type_tag() {
    let fake = FakeExecutor::new();
    fake.on("echo hello", FakeOutcome::Succeed { stdout: "hello\n".to_string() });
    let registry = registry_with_fake(fake.clone());

    let outcome = registry.execute(&context_for("echo hello", 60)).await.unwrap();
    assert_eq!(outcome.status, StepResultStatus::Succeeded);
    assert_eq!(outcome.stdout, "hello\n");
    assert!(outcome.metrics.contains_key("elapsed_ms"));
    assert_eq!(fake.executed(), vec!["ssh.exec:echo hello"]);
}

#[tokio::test]
async fn unknown_step_type_is_a_validation_failure() {
    let registry = ExecutorRegistry::new();
    let err = registry.execute(&context_for("true", 60)).await.unwrap_err();
    assert_eq!(err.kind, oc_core::FailureKind::Validation);
}

#[tokio::test]
async fn timeout_caps_execution_as_transient() {
    let fake = FakeExecutor::new();
    fake.on("sleep", FakeOutcome::BlockUntilCancel);
    let registry = registry_with_fake(fake);

    let ctx = context_for("sleep 300", 1);
    let err = registry.execute(&ctx).await.unwrap_err();
    assert_eq!(err.kind, oc_core::FailureKind::Transient);
    assert!(err.message.contains("timed out"));
}

#[tokio::test]
async fn cancellation_interrupts_execution() {
    let fake = FakeExecutor::new();
    fake.on("sleep", FakeOutcome::BlockUntilCancel);
    let registry = registry_with_fake(fake);

    let ctx = context_for("sleep 300", 600);
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let err = registry.execute(&ctx).await.unwrap_err();
    assert_eq!(err.message, "canceled");
}

#[tokio::test]
async fn secrets_are_redacted_from_outcomes() {
    let fake = FakeExecutor::new();
    fake.on("leak", FakeOutcome::Succeed { stdout: "password is hunter2!".to_string() });
    let registry = registry_with_fake(fake);

    let mut ctx = context_for("leak", 60);
    ctx.secret = Some(oc_core::SecretMaterial {
        username: "ops".to_string(),
        password: Some("hunter2".to_string()),
        ..Default::default()
    });
    let outcome = registry.execute(&ctx).await.unwrap();
    assert_eq!(outcome.stdout, "password is ********!");
}

#[tokio::test]
async fn transient_failures_propagate_kind() {
    let fake = FakeExecutor::new();
    fake.on("flaky", FakeOutcome::Transient { message: "connection reset".to_string() });
    let registry = registry_with_fake(fake);

    let err = registry.execute(&context_for("flaky", 60)).await.unwrap_err();
    assert_eq!(err.kind, oc_core::FailureKind::Transient);
}

#[test]
fn require_target_names_the_unresolved_host() {
    let mut ctx = context_for("true", 60);
    ctx.step.target_host = Some("ghost-01".to_string());
    let err = ctx.require_target().unwrap_err();
    assert!(err.message.contains("ghost-01"));
}
