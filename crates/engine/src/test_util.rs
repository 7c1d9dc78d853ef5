// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: an in-process engine stack over a temp store with a
//! fake executor standing in for every protocol driver.

use crate::bus::StatusBus;
use crate::completion::CompletionNotifier;
use crate::dispatcher::{CancelRegistry, Dispatcher, DispatcherConfig};
use crate::orchestrator::{Orchestrator, RunRequest, StaticTargets};
use oc_core::test_support::fixed_clock;
use oc_core::{FakeClock, Job, JobRun, RunPriority, RunTrigger, Target};
use oc_exec::{ExecutorRegistry, FakeExecutor};
use oc_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) struct TestStack {
    pub store: Store,
    pub bus: StatusBus,
    pub clock: FakeClock,
    pub fake: FakeExecutor,
    pub orchestrator: Arc<Orchestrator<FakeClock>>,
    pub dispatcher: Arc<Dispatcher<FakeClock>>,
    pub cancels: CancelRegistry,
    #[allow(dead_code)]
    dir: TempDir,
}

pub(crate) async fn stack() -> TestStack {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(&dir.path().join("oc.db")).await.expect("open store");
    let bus = StatusBus::default();
    let clock = fixed_clock();
    let cancels = CancelRegistry::new();

    let target = Target::builder().name("linux-01").hostname("linux-01").build();
    let targets = Arc::new(StaticTargets::with(&[target]));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        bus.clone(),
        targets.clone(),
        cancels.clone(),
        clock.clone(),
    ));

    let fake = FakeExecutor::new();
    let mut registry = ExecutorRegistry::new();
    registry.register_many(
        &["ssh.exec", "http.get", "notify.email", "condition"],
        Arc::new(fake.clone()),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        registry,
        bus.clone(),
        targets,
        None,
        cancels.clone(),
        CompletionNotifier::disabled(),
        clock.clone(),
        DispatcherConfig::default(),
    ));

    TestStack { store, bus, clock, fake, orchestrator, dispatcher, cancels, dir }
}

/// Workflow: start → N sequential ssh commands → end.
pub(crate) fn command_chain(commands: &[&str]) -> serde_json::Value {
    let mut nodes = vec![serde_json::json!({ "id": "start", "type": "start", "data": {} })];
    let mut edges = Vec::new();
    let mut previous = "start".to_string();
    for (i, command) in commands.iter().enumerate() {
        let id = format!("s{:02}", i);
        nodes.push(serde_json::json!({
            "id": id,
            "type": "action.command",
            "data": { "command": command, "target": "linux-01" }
        }));
        edges.push(serde_json::json!({ "source": previous, "target": id }));
        previous = id;
    }
    nodes.push(serde_json::json!({ "id": "end", "type": "end", "data": {} }));
    edges.push(serde_json::json!({ "source": previous, "target": "end" }));
    serde_json::json!({ "nodes": nodes, "edges": edges })
}

pub(crate) async fn seed_job(store: &Store, definition: serde_json::Value) -> Job {
    let job = Job::builder().name("spec-job").definition(definition).build();
    store.create_job(&job).await.expect("create job");
    job
}

pub(crate) async fn start_run(stack: &TestStack, job: &Job) -> JobRun {
    start_run_with(stack, job, HashMap::new()).await
}

pub(crate) async fn start_run_with(
    stack: &TestStack,
    job: &Job,
    parameters: HashMap<String, serde_json::Value>,
) -> JobRun {
    stack
        .orchestrator
        .run(RunRequest {
            job_id: job.id.clone(),
            parameters,
            priority: RunPriority::Normal,
            trigger: RunTrigger::Manual,
            requested_by: "tester".to_string(),
            schedule_id: None,
        })
        .await
        .expect("run request")
}

/// Drive the dispatcher until the queue drains (bounded).
pub(crate) async fn drain(stack: &TestStack) {
    for _ in 0..64 {
        match stack.dispatcher.tick().await {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => panic!("tick failed: {}", e),
        }
    }
}
