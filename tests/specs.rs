// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios over the in-process engine stack: translator →
//! store → dispatch → fan-out, with a fake executor standing in for the
//! protocol drivers.

use oc_core::test_support::fixed_clock;
use oc_core::{
    Clock, FakeClock, Job, JobRun, RunPriority, RunStatus, RunTrigger, Schedule, ScheduleKind,
    StatusEvent, StepStatus, Target,
};
use oc_engine::{
    CancelRegistry, CompletionNotifier, Dispatcher, DispatcherConfig, Janitor, JanitorConfig,
    Orchestrator, RunRequest, Scheduler, SchedulerConfig, StaticTargets, StatusBus,
};
use oc_exec::{ExecutorRegistry, FakeExecutor, FakeOutcome};
use oc_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Stack {
    store: Store,
    bus: StatusBus,
    clock: FakeClock,
    fake: FakeExecutor,
    orchestrator: Arc<Orchestrator<FakeClock>>,
    dispatcher: Arc<Dispatcher<FakeClock>>,
    cancels: CancelRegistry,
    _dir: TempDir,
}

async fn stack() -> Stack {
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
    registry.register_many(&["ssh.exec", "condition"], Arc::new(fake.clone()));

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

    Stack { store, bus, clock, fake, orchestrator, dispatcher, cancels, _dir: dir }
}

fn command_chain(commands: &[&str]) -> serde_json::Value {
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

async fn seed_job(store: &Store, name: &str, definition: serde_json::Value) -> Job {
    let job = Job::builder().name(name).definition(definition).build();
    store.create_job(&job).await.expect("create job");
    job
}

async fn start_run(
    stack: &Stack,
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

async fn drain(stack: &Stack) {
    for _ in 0..64 {
        match stack.dispatcher.tick().await {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => panic!("tick failed: {}", e),
        }
    }
}

/// S1 — trivial success: single echo step, run succeeds, stdout captured.
#[tokio::test]
async fn s1_trivial_success() {
    let stack = stack().await;
    let job = seed_job(&stack.store, "noop", command_chain(&["echo hello"])).await;
    stack.fake.on("echo hello", FakeOutcome::Succeed { stdout: "hello\n".to_string() });

    let run = start_run(&stack, &job, HashMap::new()).await;
    drain(&stack).await;

    let finished = stack.store.get_run(&run.id).await.unwrap();
    assert_eq!(finished.status, RunStatus::Succeeded);
    assert_eq!(finished.result_data.as_ref().unwrap().steps_succeeded, 1);

    let steps = stack.store.get_run_steps(&run.id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Succeeded);
    assert!(steps[0].stdout.contains("hello"));
}

/// S2 — parameter rendering: `{{ message }}` renders into the command;
/// a missing parameter fails before any step exists.
#[tokio::test]
async fn s2_parameter_rendering() {
    let stack = stack().await;
    let job = seed_job(&stack.store, "greeter", command_chain(&["echo {{ message }}"])).await;
    stack.fake.on("echo world", FakeOutcome::Succeed { stdout: "world\n".to_string() });

    let run = start_run(
        &stack,
        &job,
        [("message".to_string(), serde_json::json!("world"))].into_iter().collect(),
    )
    .await;
    drain(&stack).await;

    let steps = stack.store.get_run_steps(&run.id).await.unwrap();
    assert!(steps[0].stdout.contains("world"));

    // Strict undefined: no parameter → validation error, no run row.
    let before = stack.store.list_runs(None, None, 100).await.unwrap().len();
    let result = stack
        .orchestrator
        .run(RunRequest {
            job_id: job.id.clone(),
            parameters: HashMap::new(),
            priority: RunPriority::Normal,
            trigger: RunTrigger::Manual,
            requested_by: "tester".to_string(),
            schedule_id: None,
        })
        .await;
    assert!(result.is_err());
    assert_eq!(stack.store.list_runs(None, None, 100).await.unwrap().len(), before);
}

/// S3 — mid-run failure: true, false, echo-after → failed run, trailing
/// step aborted, aggregation fires exactly once.
#[tokio::test]
async fn s3_mid_run_failure() {
    let stack = stack().await;
    let job =
        seed_job(&stack.store, "fails", command_chain(&["true", "false", "echo after"])).await;
    stack.fake.on("false", FakeOutcome::Fail { exit_code: 1, stderr: "exit 1".to_string() });

    let run = start_run(&stack, &job, HashMap::new()).await;
    let mut rx = stack.bus.subscribe();
    drain(&stack).await;

    let finished = stack.store.get_run(&run.id).await.unwrap();
    assert_eq!(finished.status, RunStatus::Failed);
    let steps = stack.store.get_run_steps(&run.id).await.unwrap();
    let statuses: Vec<StepStatus> = steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Succeeded, StepStatus::Failed, StepStatus::Aborted]
    );
    assert_eq!(steps[1].exit_code, Some(1));

    let mut terminal_updates = 0;
    while let Ok(event) = rx.try_recv() {
        if let StatusEvent::JobStatusUpdate { status, .. } = event {
            if status.is_terminal() {
                terminal_updates += 1;
            }
        }
    }
    assert_eq!(terminal_updates, 1);
}

/// S4 — cancellation: a long-running step aborts cooperatively and the
/// per-run subscriber sees job_completed with status canceled.
#[tokio::test]
async fn s4_cancellation() {
    let stack = stack().await;
    let job = seed_job(&stack.store, "sleeper", command_chain(&["sleep 300"])).await;
    stack.fake.on("sleep 300", FakeOutcome::BlockUntilCancel);

    let run = start_run(&stack, &job, HashMap::new()).await;
    let run_topic = oc_core::Topic::Run(run.id.clone());
    let mut rx = stack.bus.subscribe();

    let dispatcher = stack.dispatcher.clone();
    let worker = tokio::spawn(async move { dispatcher.tick().await });
    for _ in 0..100 {
        if stack.cancels.in_flight() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    stack.orchestrator.cancel(&run.id).await.unwrap();
    worker.await.unwrap().unwrap();

    let finished = stack.store.get_run(&run.id).await.unwrap();
    assert_eq!(finished.status, RunStatus::Canceled);
    let steps = stack.store.get_run_steps(&run.id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Aborted);
    assert_eq!(steps[0].retry_count, 0);

    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        if let StatusEvent::JobCompleted { status, .. } = &event {
            assert_eq!(*status, RunStatus::Canceled);
            assert!(event.topics().contains(&run_topic));
            saw_completed = true;
        }
    }
    assert!(saw_completed);
}

/// S5 — schedule with max_runs=3: exactly three attributed runs, then
/// the schedule deactivates with no next fire time.
#[tokio::test]
async fn s5_schedule_exhaustion() {
    let stack = stack().await;
    let job = seed_job(&stack.store, "noop", command_chain(&["true"])).await;

    let mut schedule = Schedule::builder().kind(ScheduleKind::Recurring).build();
    schedule.job_id = job.id.clone();
    schedule.interval_seconds = Some(60);
    schedule.next_run_at_ms = Some(stack.clock.epoch_ms());
    schedule.max_runs = Some(3);
    stack.store.create_schedule(&schedule).await.unwrap();

    let scheduler = Scheduler::new(
        stack.store.clone(),
        stack.orchestrator.clone(),
        stack.clock.clone(),
        SchedulerConfig::default(),
    );
    for _ in 0..5 {
        scheduler.tick().await.unwrap();
        stack.clock.advance(Duration::from_secs(60));
    }

    let runs = stack.store.list_runs(None, Some(job.id.as_str()), 10).await.unwrap();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.schedule_id.as_ref() == Some(&schedule.id)));
    assert!(runs.iter().all(|r| r.trigger == RunTrigger::Scheduled));

    let spent = stack.store.get_schedule(&schedule.id).await.unwrap();
    assert!(!spent.is_active);
    assert_eq!(spent.next_run_at_ms, None);
}

/// S6 — worker crash recovery: an expired lease of a dead worker is
/// requeued with retry_count+1 and another worker completes the run.
#[tokio::test]
async fn s6_worker_crash_recovery() {
    let stack = stack().await;
    let definition = serde_json::json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "slow", "type": "action.command",
              "data": { "command": "slow", "target": "linux-01",
                        "timeout": 60, "max_retries": 1 } }
        ],
        "edges": [ { "source": "start", "target": "slow" } ]
    });
    let job = seed_job(&stack.store, "crashy", definition).await;
    let run = start_run(&stack, &job, HashMap::new()).await;

    // A doomed worker leases the step and dies silently.
    let leased = stack
        .store
        .lease_next_step("doomed", stack.clock.epoch_ms())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(leased.step.index, 0);

    // After timeout + grace + liveness, the janitor reclaims the lease.
    stack.clock.advance(Duration::from_secs(180));
    let janitor = Janitor::new(
        stack.store.clone(),
        stack.bus.clone(),
        stack.clock.clone(),
        JanitorConfig::default(),
    );
    let reports = janitor.sweep().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].action, oc_store::OrphanAction::Requeued);

    let requeued = stack.store.get_step(&leased.step.id).await.unwrap();
    assert_eq!(requeued.status, StepStatus::Queued);
    assert_eq!(requeued.retry_count, 1);

    // The healthy worker picks it up and the run completes.
    drain(&stack).await;
    let finished = stack.store.get_run(&run.id).await.unwrap();
    assert_eq!(finished.status, RunStatus::Succeeded);
}

/// export(jobs) then import yields the same active set
/// by name, with versions advanced by one on update.
#[tokio::test]
async fn export_import_round_trip() {
    let stack = stack().await;
    seed_job(&stack.store, "alpha", command_chain(&["a"])).await;
    seed_job(&stack.store, "beta", command_chain(&["b"])).await;

    let jobs = stack.store.list_active_jobs().await.unwrap();
    let bundle = oc_wire::ExportBundle::from_jobs(&jobs, "tester", stack.clock.epoch_ms());
    bundle.validate().unwrap();

    // Import into the same store: update-in-place by name.
    for document in &bundle.jobs {
        let name = document["name"].as_str().unwrap();
        let existing = stack.store.get_active_job_by_name(name).await.unwrap().unwrap();
        stack
            .store
            .update_job(&existing.id, None, None, document, stack.clock.epoch_ms())
            .await
            .unwrap();
    }

    let after = stack.store.list_active_jobs().await.unwrap();
    let names: Vec<&str> = after.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(after.iter().all(|j| j.version == 2));
}
