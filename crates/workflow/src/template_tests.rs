// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use serde_json::json;

fn ctx() -> Context {
    let mut ctx = Context::new();
    ctx.insert("message", json!("world"));
    ctx.insert("host", json!("db-01"));
    ctx.insert("port", json!(5432));
    ctx
}

#[test]
fn renders_plain_text_unchanged() {
    assert_eq!(render_str("echo hello", &ctx(), "command").unwrap(), "echo hello");
}

#[test]
fn substitutes_variables() {
    assert_eq!(
        render_str("echo {{ message }}", &ctx(), "command").unwrap(),
        "echo world"
    );
    assert_eq!(
        render_str("{{ host }}:{{ port }}", &ctx(), "url").unwrap(),
        "db-01:5432"
    );
}

#[test]
fn strict_undefined_raises_with_field_name() {
    let err = render_str("echo {{ missing }}", &ctx(), "node-1.command").unwrap_err();
    match err {
        TemplateError::Eval { field, source } => {
            assert_eq!(field, "node-1.command");
            assert_eq!(source, EvalError::Undefined("missing".to_string()));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn unclosed_braces_raise() {
    let err = render_str("echo {{ message", &ctx(), "command").unwrap_err();
    assert!(matches!(err, TemplateError::Unclosed { .. }));
}

#[test]
fn filters_apply_in_templates() {
    assert_eq!(
        render_str("{{ missing | default('none') | upper }}", &ctx(), "f").unwrap(),
        "NONE"
    );
}

#[test]
fn render_json_recurses_into_objects_and_arrays() {
    let body = json!({
        "host": "{{ host }}",
        "nested": { "msg": "{{ message }}" },
        "list": ["{{ port }}", 7],
        "untouched": 42
    });
    let rendered = render_json(&body, &ctx(), "body").unwrap();
    assert_eq!(
        rendered,
        json!({
            "host": "db-01",
            "nested": { "msg": "world" },
            "list": ["5432", 7],
            "untouched": 42
        })
    );
}

#[test]
fn eval_condition_truthiness() {
    assert!(eval_condition("port == 5432", &ctx(), "cond").unwrap());
    assert!(!eval_condition("message == 'mars'", &ctx(), "cond").unwrap());
    assert!(eval_condition("bogus ==", &ctx(), "cond").is_err());
}

proptest! {
    /// Rendering is pure: the same template and context always produce
    /// identical output.
    #[test]
    fn rendering_is_deterministic(prefix in "[a-z ]{0,12}", suffix in "[a-z ]{0,12}") {
        let template = format!("{}{{{{ message }}}}{}", prefix, suffix);
        let first = render_str(&template, &ctx(), "t").unwrap();
        let second = render_str(&template, &ctx(), "t").unwrap();
        prop_assert_eq!(first, second);
    }

    /// Templates without braces render to themselves.
    #[test]
    fn plain_text_is_identity(text in "[a-zA-Z0-9 .,;:/_-]{0,40}") {
        prop_assert_eq!(render_str(&text, &ctx(), "t").unwrap(), text);
    }
}
