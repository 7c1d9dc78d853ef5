// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn builder_defaults_are_active_v1() {
    let job = Job::builder().build();
    assert_eq!(job.version, 1);
    assert!(job.is_active);
    assert!(job.id.as_str().starts_with("job-"));
}

#[test]
fn parameter_defaults_extracts_declared_defaults() {
    let job = Job::builder()
        .definition(serde_json::json!({
            "parameters": {
                "message": { "type": "string", "default": "hello" },
                "count": { "type": "number" }
            },
            "nodes": [],
            "edges": []
        }))
        .build();
    let defaults = job.parameter_defaults();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].0, "message");
    assert_eq!(defaults[0].1, serde_json::json!("hello"));
}

#[test]
fn parameter_defaults_empty_without_declarations() {
    let job = Job::builder().build();
    assert!(job.parameter_defaults().is_empty());
}

#[test]
fn definition_json_round_trips_unknown_fields() {
    let definition = serde_json::json!({
        "nodes": [],
        "edges": [],
        "metadata": { "editor": "v3", "grid": true },
        "x-vendor": { "keep": "me" }
    });
    let job = Job::builder().definition(definition.clone()).build();
    let json = serde_json::to_value(&job).unwrap();
    assert_eq!(json["definition"], definition);
}
