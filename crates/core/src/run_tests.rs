// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::step::StepStatus;
use yare::parameterized;

#[test]
fn run_status_terminal_classification() {
    assert!(!RunStatus::Queued.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
    assert!(RunStatus::Succeeded.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
    assert!(RunStatus::Canceled.is_terminal());
}

#[test]
fn run_status_round_trips_through_display() {
    for status in [
        RunStatus::Queued,
        RunStatus::Running,
        RunStatus::Succeeded,
        RunStatus::Failed,
        RunStatus::Canceled,
    ] {
        let parsed: RunStatus = status.to_string().parse().unwrap();
        assert_eq!(parsed, status);
    }
}

#[test]
fn priority_rank_orders_high_over_low() {
    assert!(RunPriority::High.rank() > RunPriority::Normal.rank());
    assert!(RunPriority::Normal.rank() > RunPriority::Low.rank());
}

#[test]
fn aggregation_keeps_running_while_steps_outstanding() {
    let steps = vec![(StepStatus::Succeeded, false), (StepStatus::Running, false)];
    assert_eq!(aggregate_run_status(&steps), None);

    let steps = vec![(StepStatus::Failed, false), (StepStatus::Queued, false)];
    assert_eq!(aggregate_run_status(&steps), None);
}

#[test]
fn aggregation_succeeds_when_all_succeeded_or_skipped() {
    let steps = vec![(StepStatus::Succeeded, false), (StepStatus::Skipped, false)];
    assert_eq!(aggregate_run_status(&steps), Some(RunStatus::Succeeded));
}

#[test]
fn aggregation_fails_on_terminal_failure() {
    let steps = vec![
        (StepStatus::Succeeded, false),
        (StepStatus::Failed, false),
        (StepStatus::Aborted, false),
    ];
    assert_eq!(aggregate_run_status(&steps), Some(RunStatus::Failed));
}

#[test]
fn aggregation_tolerates_continue_on_failure() {
    let steps = vec![(StepStatus::Failed, true), (StepStatus::Succeeded, false)];
    assert_eq!(aggregate_run_status(&steps), Some(RunStatus::Succeeded));
}

#[test]
fn aggregation_of_empty_run_is_trivial_success() {
    assert_eq!(aggregate_run_status(&[]), Some(RunStatus::Succeeded));
}

#[parameterized(
    queued = { StepStatus::Queued },
    running = { StepStatus::Running },
)]
fn aggregation_never_terminates_with_outstanding(status: StepStatus) {
    let steps = vec![(status, false)];
    assert_eq!(aggregate_run_status(&steps), None);
}

#[test]
fn correlation_ids_are_unique() {
    assert_ne!(CorrelationId::fresh(), CorrelationId::fresh());
}

#[test]
fn run_builder_produces_queued_run() {
    let run = JobRun::builder().build();
    assert_eq!(run.status, RunStatus::Queued);
    assert!(run.started_at_ms.is_none());
    assert!(run.id.as_str().starts_with("run-"));
}
