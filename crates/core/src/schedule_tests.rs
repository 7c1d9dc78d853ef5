// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn recurring_requires_positive_interval() {
    let schedule = Schedule::builder().kind(ScheduleKind::Recurring).build();
    assert!(schedule.validate_fields().is_ok());

    let mut bad = schedule.clone();
    bad.interval_seconds = Some(0);
    assert!(bad.validate_fields().is_err());

    let mut missing = schedule;
    missing.interval_seconds = None;
    assert!(missing.validate_fields().is_err());
}

#[test]
fn cron_requires_expression_and_no_interval() {
    let mut schedule = Schedule::builder().kind(ScheduleKind::Cron).build();
    schedule.interval_seconds = None;
    assert!(schedule.validate_fields().is_err());

    schedule.cron_expression = Some("*/5 * * * *".to_string());
    assert!(schedule.validate_fields().is_ok());

    schedule.interval_seconds = Some(60);
    assert!(schedule.validate_fields().is_err());
}

#[test]
fn once_takes_neither_cadence_field() {
    let mut schedule = Schedule::builder().kind(ScheduleKind::Once).build();
    schedule.interval_seconds = None;
    assert!(schedule.validate_fields().is_ok());

    schedule.cron_expression = Some("* * * * *".to_string());
    assert!(schedule.validate_fields().is_err());
}

#[test]
fn budget_enforcement() {
    let mut schedule = Schedule::builder().max_runs(3u32).build();
    assert!(schedule.has_budget());
    schedule.run_count = 3;
    assert!(!schedule.has_budget());

    let unbounded = Schedule::builder().build();
    assert!(unbounded.has_budget());
}
