// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn ctx() -> Context {
    let mut ctx = Context::new();
    ctx.insert("message", json!("world"));
    ctx.insert("count", json!(5));
    ctx.insert("ratio", json!(0.5));
    ctx.insert("enabled", json!(true));
    ctx.insert("tags", json!(["a", "b", "c"]));
    ctx.insert("job", json!({"name": "deploy", "status": "succeeded", "steps": {"failed": 0}}));
    ctx
}

fn eval(input: &str) -> Value {
    parse(input).unwrap().eval(&ctx()).unwrap()
}

#[test]
fn path_lookup_and_attribute_access() {
    assert_eq!(eval("message"), json!("world"));
    assert_eq!(eval("job.name"), json!("deploy"));
    assert_eq!(eval("job.steps.failed"), json!(0));
}

#[test]
fn undefined_variable_raises() {
    let err = parse("missing").unwrap().eval(&ctx()).unwrap_err();
    assert_eq!(err, EvalError::Undefined("missing".to_string()));

    let err = parse("job.owner").unwrap().eval(&ctx()).unwrap_err();
    assert_eq!(err, EvalError::Undefined("job.owner".to_string()));
}

#[test]
fn literals() {
    assert_eq!(eval("'single'"), json!("single"));
    assert_eq!(eval("\"double\""), json!("double"));
    assert_eq!(eval("42"), json!(42));
    assert_eq!(eval("-3"), json!(-3));
    assert_eq!(eval("2.5"), json!(2.5));
    assert_eq!(eval("true"), json!(true));
    assert_eq!(eval("null"), json!(null));
}

#[parameterized(
    eq_true = { "count == 5", true },
    eq_false = { "count == 4", false },
    ne = { "message != 'world'", false },
    lt = { "count < 10", true },
    le = { "count <= 5", true },
    gt = { "ratio > 0.1", true },
    ge = { "count >= 6", false },
    string_cmp = { "message == 'world'", true },
    string_lt = { "'abc' < 'abd'", true },
    int_float = { "count == 5.0", true },
)]
fn comparisons(input: &str, expected: bool) {
    assert_eq!(eval(input), json!(expected));
}

#[parameterized(
    and_true = { "enabled and count > 1", true },
    and_false = { "enabled and count > 9", false },
    or_short = { "enabled or missing", true },
    not_expr = { "not (count == 5)", false },
    nested = { "(count > 1 and count < 10) or false", true },
)]
fn boolean_logic(input: &str, expected: bool) {
    assert!(evaluate_bool(input, &ctx()).unwrap() == expected);
}

#[test]
fn or_short_circuit_skips_undefined_right() {
    // `enabled` is truthy, so the undefined right side is never evaluated.
    assert!(evaluate_bool("enabled or missing", &ctx()).unwrap());
    // Without short-circuit the undefined side raises.
    assert!(evaluate_bool("missing or enabled", &ctx()).is_err());
}

#[test]
fn default_filter_absorbs_undefined() {
    assert_eq!(eval("missing | default('fallback')"), json!("fallback"));
    assert_eq!(eval("message | default('fallback')"), json!("world"));
}

#[test]
fn default_filter_replaces_null() {
    let mut ctx = ctx();
    ctx.insert("nothing", json!(null));
    assert_eq!(
        parse("nothing | default('x')").unwrap().eval(&ctx).unwrap(),
        json!("x")
    );
}

#[test]
fn length_filter() {
    assert_eq!(eval("message | length"), json!(5));
    assert_eq!(eval("tags | length"), json!(3));
    assert_eq!(eval("job | length"), json!(3));
    assert!(parse("count | length").unwrap().eval(&ctx()).is_err());
}

#[test]
fn join_filter() {
    assert_eq!(eval("tags | join(', ')"), json!("a, b, c"));
    assert!(parse("message | join(',')").unwrap().eval(&ctx()).is_err());
}

#[test]
fn case_filters() {
    assert_eq!(eval("message | upper"), json!("WORLD"));
    assert_eq!(eval("'ABC' | lower"), json!("abc"));
}

#[test]
fn filters_chain() {
    assert_eq!(eval("missing | default('abc') | upper"), json!("ABC"));
}

#[test]
fn unknown_filter_is_rejected() {
    let err = parse("message | shell_exec").unwrap().eval(&ctx()).unwrap_err();
    assert_eq!(err, EvalError::UnknownFilter("shell_exec".to_string()));
}

#[test]
fn arbitrary_syntax_is_rejected_at_parse_time() {
    assert!(parse("__import__('os')").is_err());
    assert!(parse("a + b").is_err());
    assert!(parse("a[0]").is_err());
    assert!(parse("{'k': 1}").is_err());
    assert!(parse("").is_err());
}

#[test]
fn truthiness_rules() {
    assert!(!truthy(&json!(null)));
    assert!(!truthy(&json!(false)));
    assert!(!truthy(&json!(0)));
    assert!(!truthy(&json!("")));
    assert!(!truthy(&json!([])));
    assert!(truthy(&json!("x")));
    assert!(truthy(&json!(1)));
    assert!(truthy(&json!([0])));
}

#[test]
fn type_mismatch_on_ordering() {
    let err = parse("message < 5").unwrap().eval(&ctx()).unwrap_err();
    assert!(matches!(err, EvalError::TypeMismatch(..)));
}

#[test]
fn stringify_values() {
    assert_eq!(stringify(&json!(null)), "");
    assert_eq!(stringify(&json!("s")), "s");
    assert_eq!(stringify(&json!(3)), "3");
    assert_eq!(stringify(&json!(true)), "true");
    assert_eq!(stringify(&json!([1, 2])), "[1,2]");
}
