// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_util::{open_temp, seed_job};
use crate::StoreError;
use oc_core::Job;

#[tokio::test]
async fn create_and_fetch_round_trip() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "deploy").await;
    let fetched = store.get_job(&job.id).await.unwrap();
    assert_eq!(fetched, job);
}

#[tokio::test]
async fn duplicate_active_name_conflicts() {
    let (store, _dir) = open_temp().await;
    seed_job(&store, "deploy").await;
    let dup = Job::builder().name("deploy").build();
    let err = store.create_job(&dup).await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {:?}", err);
}

#[tokio::test]
async fn soft_delete_frees_the_name() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "deploy").await;
    store.delete_job(&job.id, 2_000_000).await.unwrap();

    assert!(store.get_active_job_by_name("deploy").await.unwrap().is_none());
    // The row is retained for audit.
    let fetched = store.get_job(&job.id).await.unwrap();
    assert!(!fetched.is_active);

    // A new job can reuse the name.
    let reuse = Job::builder().name("deploy").build();
    store.create_job(&reuse).await.unwrap();
}

#[tokio::test]
async fn update_bumps_version_and_retains_history() {
    let (store, _dir) = open_temp().await;
    let job = seed_job(&store, "deploy").await;

    let v2 = serde_json::json!({"nodes": [{"id": "start", "type": "start", "data": {}}], "edges": []});
    let updated = store.update_job(&job.id, None, Some("second"), &v2, 2_000_000).await.unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.description.as_deref(), Some("second"));
    assert_eq!(updated.definition, v2);

    let versions = store.job_versions(&job.id).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].0, 1);
    assert_eq!(versions[1].0, 2);
    assert_eq!(versions[0].1, job.definition);
}

#[tokio::test]
async fn update_missing_job_is_not_found() {
    let (store, _dir) = open_temp().await;
    let ghost = Job::builder().build();
    let err = store
        .update_job(&ghost.id, None, None, &ghost.definition, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn list_active_is_name_ordered_and_excludes_deleted() {
    let (store, _dir) = open_temp().await;
    let b = seed_job(&store, "beta").await;
    seed_job(&store, "alpha").await;
    store.delete_job(&b.id, 1).await.unwrap();

    let names: Vec<String> =
        store.list_active_jobs().await.unwrap().into_iter().map(|j| j.name).collect();
    assert_eq!(names, vec!["alpha"]);
}

#[tokio::test]
async fn health_probe_reports_ok() {
    let (store, _dir) = open_temp().await;
    let health = store.health().await;
    assert!(health.ok);
    assert!(health.pool_size >= 1);
}
