// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn ssh_exec(command: &str) -> StepPayload {
    StepPayload::SshExec {
        command: command.to_string(),
        shell: RemoteShell::Sh,
        working_directory: None,
        environment: BTreeMap::new(),
    }
}

#[test]
fn step_status_terminal_classification() {
    assert!(!StepStatus::Queued.is_terminal());
    assert!(!StepStatus::Running.is_terminal());
    assert!(StepStatus::Succeeded.is_terminal());
    assert!(StepStatus::Failed.is_terminal());
    assert!(StepStatus::Aborted.is_terminal());
    assert!(StepStatus::Skipped.is_terminal());
}

#[parameterized(
    queued = { "queued", StepStatus::Queued },
    running = { "running", StepStatus::Running },
    succeeded = { "succeeded", StepStatus::Succeeded },
    failed = { "failed", StepStatus::Failed },
    aborted = { "aborted", StepStatus::Aborted },
    skipped = { "skipped", StepStatus::Skipped },
)]
fn step_status_parses(text: &str, expected: StepStatus) {
    let parsed: StepStatus = text.parse().unwrap();
    assert_eq!(parsed, expected);
    assert_eq!(expected.to_string(), text);
}

#[test]
fn type_tags_match_executor_registry_keys() {
    assert_eq!(ssh_exec("true").type_tag(), "ssh.exec");
    let http = StepPayload::Http {
        method: HttpMethod::Post,
        url: "https://example.net".to_string(),
        headers: BTreeMap::new(),
        body: None,
        auth: None,
        verify_ssl: true,
        follow_redirects: true,
        expected_status: vec![200],
    };
    assert_eq!(http.type_tag(), "http.post");
    let notify = StepPayload::Notify {
        channel: NotifyChannel::Slack,
        recipients: vec![],
        subject: None,
        body: "hi".to_string(),
        priority: "normal".to_string(),
        send_on: SendOn::Always,
        dedupe_key: None,
    };
    assert_eq!(notify.type_tag(), "notify.slack");
}

#[test]
fn control_payloads_are_not_remote() {
    let cond = StepPayload::Condition {
        expression: "true".to_string(),
        true_branch: None,
        false_branch: None,
    };
    assert!(!cond.is_remote());
    assert!(ssh_exec("true").is_remote());
}

#[test]
fn payload_serde_round_trip_preserves_kind_tag() {
    let payload = StepPayload::Webhook {
        url: "https://hooks.example.net/x".to_string(),
        payload: serde_json::json!({"a": 1}),
        headers: BTreeMap::new(),
        secret: Some("s3cret".to_string()),
        retry_count: 2,
        retry_delay_secs: 1,
    };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["kind"], "webhook");
    let back: StepPayload = serde_json::from_value(json).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn http_payload_defaults_apply_on_deserialize() {
    let payload: StepPayload = serde_json::from_value(serde_json::json!({
        "kind": "http",
        "method": "get",
        "url": "https://example.net/health"
    }))
    .unwrap();
    match payload {
        StepPayload::Http { verify_ssl, follow_redirects, expected_status, .. } => {
            assert!(verify_ssl);
            assert!(follow_redirects);
            assert_eq!(expected_status, vec![200, 201, 202, 204]);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn from_execution_starts_queued_with_dense_index() {
    let run_id = RunId::fresh();
    let exec = ExecutionStep {
        node_id: "n1".to_string(),
        index: 3,
        payload: ssh_exec("echo hello"),
        target_id: None,
        target_host: Some("linux-01".to_string()),
        credential_hint: None,
        timeout_secs: 60,
        retry: RetryPolicy::default(),
        continue_on_failure: false,
    };
    let step = JobRunStep::from_execution(&run_id, exec);
    assert_eq!(step.status, StepStatus::Queued);
    assert_eq!(step.index, 3);
    assert_eq!(step.step_type, "ssh.exec");
    assert_eq!(step.run_id, run_id);
    assert!(step.lease_token.is_none());
    assert!(step.id.as_str().starts_with("stp-"));
}

#[test]
fn outcome_constructors() {
    let ok = StepOutcome::succeeded("hello").with_metric("bytes", 5);
    assert_eq!(ok.status, StepResultStatus::Succeeded);
    assert_eq!(ok.exit_code, 0);
    assert_eq!(ok.metrics["bytes"], 5);

    let bad = StepOutcome::failed(2, "boom");
    assert_eq!(bad.status, StepResultStatus::Failed);
    assert_eq!(bad.exit_code, 2);

    let skip = StepOutcome::skipped("send_on filter");
    assert_eq!(skip.status, StepResultStatus::Skipped);
}
