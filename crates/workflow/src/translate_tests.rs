// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oc_core::step::{HttpMethod, SendOn, StepPayload, TransferDirection};
use oc_core::test_support::fixed_clock;
use oc_core::Target;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

fn params(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn resolver() -> BTreeMap<String, Target> {
    let mut map = BTreeMap::new();
    map.insert("linux-01".to_string(), Target::builder().name("linux-01").build());
    map
}

fn linear_definition() -> serde_json::Value {
    json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "greet", "type": "action.command",
              "data": { "command": "echo {{ message }}", "target": "linux-01" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "source": "start", "target": "greet" },
            { "source": "greet", "target": "end" }
        ]
    })
}

#[test]
fn linear_graph_emits_one_rendered_step() {
    let report = translate(
        &linear_definition(),
        &params(&[("message", json!("world"))]),
        &fixed_clock(),
        &resolver(),
    )
    .unwrap();
    assert_eq!(report.steps.len(), 1);
    let step = &report.steps[0];
    assert_eq!(step.index, 0);
    assert_eq!(step.node_id, "greet");
    assert!(step.target_id.is_some());
    match &step.payload {
        StepPayload::SshExec { command, .. } => assert_eq!(command, "echo world"),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn missing_parameter_fails_before_any_step() {
    let err = translate(&linear_definition(), &HashMap::new(), &fixed_clock(), &resolver())
        .unwrap_err();
    match err {
        TranslateError::Template(TemplateError::Eval { field, .. }) => {
            assert_eq!(field, "greet.command");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn declared_parameter_defaults_fill_gaps() {
    let mut definition = linear_definition();
    definition["parameters"] = json!({ "message": { "type": "string", "default": "hi" } });
    let report =
        translate(&definition, &HashMap::new(), &fixed_clock(), &resolver()).unwrap();
    match &report.steps[0].payload {
        StepPayload::SshExec { command, .. } => assert_eq!(command, "echo hi"),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn empty_graph_is_a_valid_trivial_workflow() {
    let report = translate(
        &json!({"nodes": [], "edges": []}),
        &HashMap::new(),
        &fixed_clock(),
        &NullResolver,
    )
    .unwrap();
    assert!(report.steps.is_empty());
}

#[test]
fn unknown_node_types_are_skipped_with_warnings() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "widget", "type": "vendor.widget", "data": {} },
            { "id": "run", "type": "action.command", "data": { "command": "true" } }
        ],
        "edges": [ { "source": "start", "target": "run" } ]
    });
    let report =
        translate(&definition, &HashMap::new(), &fixed_clock(), &NullResolver).unwrap();
    assert_eq!(report.steps.len(), 1);
    assert!(report.warnings.iter().any(|w| w.contains("vendor.widget")));
}

#[test]
fn all_unknown_nodes_is_an_error() {
    let definition = json!({
        "nodes": [ { "id": "a", "type": "vendor.widget", "data": {} } ],
        "edges": []
    });
    let err =
        translate(&definition, &HashMap::new(), &fixed_clock(), &NullResolver).unwrap_err();
    assert!(matches!(err, TranslateError::AllNodesUnknown));
}

#[test]
fn unresolved_target_keeps_hostname_for_diagnostics() {
    let report = translate(
        &linear_definition(),
        &params(&[("message", json!("x"))]),
        &fixed_clock(),
        &NullResolver,
    )
    .unwrap();
    let step = &report.steps[0];
    assert!(step.target_id.is_none());
    assert_eq!(step.target_host.as_deref(), Some("linux-01"));
    assert!(report.warnings.iter().any(|w| w.contains("unresolved target")));
}

#[test]
fn indices_are_dense_and_ordered() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "a", "type": "action.command", "data": { "command": "a" } },
            { "id": "b", "type": "action.command", "data": { "command": "b" } },
            { "id": "c", "type": "action.command", "data": { "command": "c" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "source": "start", "target": "a" },
            { "source": "a", "target": "b" },
            { "source": "b", "target": "c" },
            { "source": "c", "target": "end" }
        ]
    });
    let report =
        translate(&definition, &HashMap::new(), &fixed_clock(), &NullResolver).unwrap();
    let order: Vec<_> = report.steps.iter().map(|s| s.node_id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    let indices: Vec<_> = report.steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn translation_is_deterministic() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "fan1", "type": "action.command", "data": { "command": "one" } },
            { "id": "fan2", "type": "action.command", "data": { "command": "two" } },
            { "id": "join", "type": "join", "data": {} }
        ],
        "edges": [
            { "source": "start", "target": "fan1" },
            { "source": "start", "target": "fan2" },
            { "source": "fan1", "target": "join" },
            { "source": "fan2", "target": "join" }
        ]
    });
    let first =
        translate(&definition, &HashMap::new(), &fixed_clock(), &NullResolver).unwrap();
    let second =
        translate(&definition, &HashMap::new(), &fixed_clock(), &NullResolver).unwrap();
    let a = serde_json::to_string(&first.steps).unwrap();
    let b = serde_json::to_string(&second.steps).unwrap();
    assert_eq!(a, b);
}

#[test]
fn unbounded_cycle_fails_validation() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "a", "type": "action.command", "data": { "command": "a" } },
            { "id": "b", "type": "action.command", "data": { "command": "b" } }
        ],
        "edges": [
            { "source": "start", "target": "a" },
            { "source": "a", "target": "b" },
            { "source": "b", "target": "a" }
        ]
    });
    let err =
        translate(&definition, &HashMap::new(), &fixed_clock(), &NullResolver).unwrap_err();
    assert!(matches!(err, TranslateError::Validation(_)));
}

#[test]
fn http_node_materializes_with_rendered_body() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "call", "type": "action.http",
              "data": {
                  "url": "https://api.example.net/v1/{{ resource }}",
                  "method": "POST",
                  "headers": { "X-Env": "{{ env }}" },
                  "body": { "name": "{{ resource }}" },
                  "auth": { "type": "bearer", "token": "{{ token }}" },
                  "expected_status_codes": [200, 409]
              } }
        ],
        "edges": [ { "source": "start", "target": "call" } ]
    });
    let report = translate(
        &definition,
        &params(&[
            ("resource", json!("widgets")),
            ("env", json!("prod")),
            ("token", json!("tok")),
        ]),
        &fixed_clock(),
        &NullResolver,
    )
    .unwrap();
    match &report.steps[0].payload {
        StepPayload::Http { method, url, headers, body, expected_status, .. } => {
            assert_eq!(*method, HttpMethod::Post);
            assert_eq!(url, "https://api.example.net/v1/widgets");
            assert_eq!(headers["X-Env"], "prod");
            assert_eq!(body.as_ref().unwrap(), &json!({"name": "widgets"}));
            assert_eq!(expected_status, &vec![200, 409]);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    assert_eq!(report.steps[0].type_tag(), "http.post");
}

#[test]
fn webhook_node_materializes_signed_call() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "hook", "type": "action.http",
              "data": {
                  "webhook": true,
                  "url": "https://hooks.example.net/ci",
                  "payload": { "run": "{{ run_name }}" },
                  "secret": "shhh",
                  "retry_count": 2
              } }
        ],
        "edges": [ { "source": "start", "target": "hook" } ]
    });
    let report = translate(
        &definition,
        &params(&[("run_name", json!("nightly"))]),
        &fixed_clock(),
        &NullResolver,
    )
    .unwrap();
    match &report.steps[0].payload {
        StepPayload::Webhook { url, payload, secret, retry_count, .. } => {
            assert_eq!(url, "https://hooks.example.net/ci");
            assert_eq!(payload, &json!({"run": "nightly"}));
            assert_eq!(secret.as_deref(), Some("shhh"));
            assert_eq!(*retry_count, 2);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn file_transfer_modes() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "up", "type": "action.file_transfer",
              "data": { "source_path": "/tmp/a", "dest_path": "/srv/a",
                        "target": "linux-01" } },
            { "id": "down", "type": "action.file_transfer",
              "data": { "source_path": "/srv/b", "dest_path": "/tmp/b",
                        "direction": "download", "target": "linux-01" } },
            { "id": "mirror", "type": "action.file_transfer",
              "data": { "transfer_mode": "sync", "source_path": "/tmp/tree",
                        "dest_path": "/srv/tree", "exclude": ["*.log"],
                        "target": "linux-01" } }
        ],
        "edges": [
            { "source": "start", "target": "up" },
            { "source": "up", "target": "down" },
            { "source": "down", "target": "mirror" }
        ]
    });
    let report =
        translate(&definition, &HashMap::new(), &fixed_clock(), &resolver()).unwrap();
    assert!(matches!(report.steps[0].payload, StepPayload::SftpUpload { .. }));
    match &report.steps[1].payload {
        StepPayload::SftpDownload { remote_path, local_path, .. } => {
            assert_eq!(remote_path, "/srv/b");
            assert_eq!(local_path, "/tmp/b");
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    match &report.steps[2].payload {
        StepPayload::SftpSync { exclude, direction, .. } => {
            assert_eq!(exclude, &vec!["*.log".to_string()]);
            assert_eq!(*direction, TransferDirection::Upload);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn notification_defers_subject_and_body_rendering() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "mail", "type": "action.notification",
              "data": {
                  "notification_type": "email",
                  "recipients": ["{{ owner }}@example.net"],
                  "subject": "Job {{ job.name }} finished",
                  "message": "Status: {{ job.status }}",
                  "send_on": "failure"
              } }
        ],
        "edges": [ { "source": "start", "target": "mail" } ]
    });
    let report = translate(
        &definition,
        &params(&[("owner", json!("ops"))]),
        &fixed_clock(),
        &NullResolver,
    )
    .unwrap();
    match &report.steps[0].payload {
        StepPayload::Notify { recipients, subject, body, send_on, .. } => {
            // Recipients render now; subject/body wait for the job context.
            assert_eq!(recipients, &vec!["ops@example.net".to_string()]);
            assert_eq!(subject.as_deref(), Some("Job {{ job.name }} finished"));
            assert_eq!(body, "Status: {{ job.status }}");
            assert_eq!(*send_on, SendOn::Failure);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[test]
fn retry_and_failure_flags_carry_through() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "fetch", "type": "action.http",
              "data": { "url": "https://example.net", "max_retries": 5,
                        "retry_delay_secs": 10, "continue_on_failure": true,
                        "timeout": 45 } }
        ],
        "edges": [ { "source": "start", "target": "fetch" } ]
    });
    let report =
        translate(&definition, &HashMap::new(), &fixed_clock(), &NullResolver).unwrap();
    let step = &report.steps[0];
    assert_eq!(step.retry.max_retries, 5);
    assert_eq!(step.retry.base_delay_secs, 10);
    assert!(step.continue_on_failure);
    assert_eq!(step.timeout_secs, 45);
}

#[test]
fn loop_and_condition_nodes_materialize() {
    let definition = json!({
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "check", "type": "condition.if",
              "data": { "condition": "{{ count }} > 3",
                        "true_branch": "loop", "false_branch": "end" } },
            { "id": "loop", "type": "condition.while",
              "data": { "condition": "count < 10", "max_iterations": 4 } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "source": "start", "target": "check" },
            { "source": "check", "target": "loop", "sourceHandle": "true" },
            { "source": "loop", "target": "end" }
        ]
    });
    let report = translate(
        &definition,
        &params(&[("count", json!(5))]),
        &fixed_clock(),
        &NullResolver,
    )
    .unwrap();
    match &report.steps[0].payload {
        StepPayload::Condition { expression, true_branch, .. } => {
            assert_eq!(expression, "5 > 3");
            assert_eq!(true_branch.as_deref(), Some("loop"));
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    match &report.steps[1].payload {
        StepPayload::WhileLoop { max_iterations, .. } => assert_eq!(*max_iterations, 4),
        other => panic!("unexpected payload: {:?}", other),
    }
    // While timeout scales with the iteration bound.
    assert_eq!(report.steps[1].timeout_secs, 40);
}
