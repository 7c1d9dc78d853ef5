// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for store tests: a temp-file store plus entity builders.

use crate::Store;
use oc_core::test_support::ssh_exec_step;
use oc_core::{Job, JobRun, JobRunStep, RunPriority};
use tempfile::TempDir;

pub(crate) async fn open_temp() -> (Store, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("oc.db")).await.expect("open store");
    (store, dir)
}

/// Insert a job and return it.
pub(crate) async fn seed_job(store: &Store, name: &str) -> Job {
    let job = Job::builder().name(name).build();
    store.create_job(&job).await.expect("create job");
    job
}

/// Materialize a run with `commands.len()` sequential ssh.exec steps.
pub(crate) async fn seed_run(
    store: &Store,
    job: &Job,
    commands: &[&str],
    priority: RunPriority,
) -> (JobRun, Vec<JobRunStep>) {
    let mut run = JobRun::builder().priority(priority).build();
    run.job_id = job.id.clone();
    let steps: Vec<JobRunStep> = commands
        .iter()
        .enumerate()
        .map(|(i, command)| {
            JobRunStep::from_execution(&run.id, ssh_exec_step(i as u32, command))
        })
        .collect();
    store.materialize_run(&run, &steps).await.expect("materialize run");
    (run, steps)
}
