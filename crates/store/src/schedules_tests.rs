// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_util::{open_temp, seed_job};
use crate::StoreError;
use oc_core::{Schedule, ScheduleKind};

async fn seed_schedule(store: &crate::Store, job: &oc_core::Job, next_ms: u64) -> Schedule {
    let mut schedule = Schedule::builder()
        .kind(ScheduleKind::Recurring)
        .next_run_at_ms(next_ms)
        .build();
    schedule.job_id = job.id.clone();
    store.create_schedule(&schedule).await.unwrap();
    schedule
}

#[tokio::test]
async fn create_and_fetch_round_trip() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "j").await;
    let schedule = seed_schedule(&store, &job, 5000).await;
    let fetched = store.get_schedule(&schedule.id).await.unwrap();
    assert_eq!(fetched, schedule);
}

#[tokio::test]
async fn due_query_honors_activation_time_and_budget() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "j").await;
    let due = seed_schedule(&store, &job, 5000).await;
    seed_schedule(&store, &job, 99_000).await; // not yet due

    let mut exhausted = Schedule::builder()
        .kind(ScheduleKind::Recurring)
        .next_run_at_ms(1000u64)
        .max_runs(2u32)
        .build();
    exhausted.job_id = job.id.clone();
    exhausted.run_count = 2;
    store.create_schedule(&exhausted).await.unwrap();

    let found = store.due_schedules(10_000).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, due.id);
}

#[tokio::test]
async fn record_fire_advances_and_counts() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "j").await;
    let schedule = seed_schedule(&store, &job, 5000).await;

    let updated = store
        .record_schedule_fire(&schedule.id, 5000, Some(65_000))
        .await
        .unwrap();
    assert_eq!(updated.run_count, 1);
    assert_eq!(updated.last_run_at_ms, Some(5000));
    assert_eq!(updated.next_run_at_ms, Some(65_000));
    assert!(updated.is_active);
}

#[tokio::test]
async fn max_runs_deactivates_after_final_fire() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "j").await;
    let mut schedule = Schedule::builder()
        .kind(ScheduleKind::Recurring)
        .next_run_at_ms(1000u64)
        .max_runs(3u32)
        .build();
    schedule.job_id = job.id.clone();
    schedule.run_count = 2;
    store.create_schedule(&schedule).await.unwrap();

    // Third (final) fire: run_count reaches max_runs.
    let updated = store
        .record_schedule_fire(&schedule.id, 1000, Some(61_000))
        .await
        .unwrap();
    assert_eq!(updated.run_count, 3);
    assert!(!updated.is_active);
    // S5: exhausted schedules carry no next fire time.
    assert_eq!(updated.next_run_at_ms, None);
    assert!(store.due_schedules(100_000).await.unwrap().is_empty());
}

#[tokio::test]
async fn one_shot_fire_deactivates() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "j").await;
    let mut schedule = Schedule::builder().kind(ScheduleKind::Once).build();
    schedule.interval_seconds = None;
    schedule.next_run_at_ms = Some(1000);
    schedule.job_id = job.id.clone();
    store.create_schedule(&schedule).await.unwrap();

    let updated = store.record_schedule_fire(&schedule.id, 1000, None).await.unwrap();
    assert!(!updated.is_active);
    assert_eq!(updated.next_run_at_ms, None);
}

#[tokio::test]
async fn delete_and_not_found() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "j").await;
    let schedule = seed_schedule(&store, &job, 1).await;
    store.delete_schedule(&schedule.id).await.unwrap();
    let err = store.get_schedule(&schedule.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(matches!(
        store.delete_schedule(&schedule.id).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn list_filters_inactive() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "j").await;
    let schedule = seed_schedule(&store, &job, 1).await;
    seed_schedule(&store, &job, 2).await;
    store.set_schedule_active(&schedule.id, false).await.unwrap();

    assert_eq!(store.list_schedules(false).await.unwrap().len(), 2);
    assert_eq!(store.list_schedules(true).await.unwrap().len(), 1);
}
