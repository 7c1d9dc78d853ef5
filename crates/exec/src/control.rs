// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control and data steps evaluated in-process: condition, loop,
//! decision, parallel, data.transform, data.validate.

use crate::executor::{ExecFailure, StepContext, StepExecutor};
use async_trait::async_trait;
use oc_core::step::StepPayload;
use oc_core::StepOutcome;
use oc_workflow::expr;
use oc_workflow::template::Context;
use serde_json::Value;

pub struct ControlExecutor;

impl ControlExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ControlExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for ControlExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
        let template_ctx = context_of(ctx);
        match &ctx.step.payload {
            StepPayload::Condition { expression, true_branch, false_branch } => {
                let result = evaluate(expression, &template_ctx)?;
                let branch = if result { true_branch } else { false_branch };
                Ok(StepOutcome::succeeded(result.to_string())
                    .with_metric("expression", expression.clone())
                    .with_metric("result", result)
                    .with_metric(
                        "branch",
                        branch.clone().unwrap_or_else(|| "none".to_string()),
                    ))
            }
            StepPayload::WhileLoop { expression, max_iterations, .. } => {
                let result = evaluate(expression, &template_ctx)?;
                Ok(StepOutcome::succeeded(result.to_string())
                    .with_metric("result", result)
                    .with_metric("max_iterations", *max_iterations))
            }
            StepPayload::ForEachLoop { items, item_variable, .. } => {
                let count = match items {
                    Value::Array(list) => list.len() as u64,
                    Value::String(_) => 1,
                    _ => 0,
                };
                Ok(StepOutcome::succeeded(format!("{} items", count))
                    .with_metric("items", count)
                    .with_metric("item_variable", item_variable.clone()))
            }
            StepPayload::Decision { branches, default_branch } => {
                Ok(StepOutcome::succeeded(format!("{} branches", branches.len()))
                    .with_metric("branches", branches.len() as u64)
                    .with_metric(
                        "default_branch",
                        default_branch.clone().unwrap_or_else(|| "none".to_string()),
                    ))
            }
            StepPayload::Parallel { branches, wait_for_all, max_concurrent } => {
                Ok(StepOutcome::succeeded(format!("{} parallel branches", branches.len()))
                    .with_metric("branches", branches.len() as u64)
                    .with_metric("wait_for_all", *wait_for_all)
                    .with_metric("max_concurrent", *max_concurrent))
            }
            StepPayload::DataTransform { input_data, transformation_type, output_format, .. } => {
                let input = input_data.clone().unwrap_or(Value::Null);
                let output = match transformation_type.as_str() {
                    "aggregate" => aggregate(&input),
                    _ => input,
                };
                let rendered = if output_format == "json" {
                    serde_json::to_string(&output)
                        .map_err(|e| ExecFailure::validation(format!("serialize output: {}", e)))?
                } else {
                    oc_workflow::expr::stringify(&output)
                };
                Ok(StepOutcome::succeeded(rendered)
                    .with_metric("transformation_type", transformation_type.clone()))
            }
            StepPayload::DataValidate { input_data, rules, fail_on_error } => {
                let input = input_data.clone().unwrap_or(Value::Null);
                let violations = validate_rules(&input, rules);
                if violations.is_empty() {
                    Ok(StepOutcome::succeeded("valid").with_metric("violations", 0u64))
                } else if *fail_on_error {
                    Ok(StepOutcome::failed(1, violations.join("; "))
                        .with_metric("violations", violations.len() as u64))
                } else {
                    Ok(StepOutcome::succeeded(violations.join("; "))
                        .with_metric("violations", violations.len() as u64))
                }
            }
            other => Err(ExecFailure::validation(format!(
                "control executor cannot handle {}",
                other.type_tag()
            ))),
        }
    }
}

fn context_of(ctx: &StepContext) -> Context {
    let mut template_ctx = Context::new();
    if let Value::Object(map) = &ctx.job_context {
        template_ctx.extend_object(map);
    }
    template_ctx
}

fn evaluate(expression: &str, ctx: &Context) -> Result<bool, ExecFailure> {
    expr::evaluate_bool(expression, ctx)
        .map_err(|e| ExecFailure::validation(format!("expression {:?}: {}", expression, e)))
}

/// Aggregate transform: element count plus numeric sum where sensible.
fn aggregate(input: &Value) -> Value {
    match input {
        Value::Array(items) => {
            let sum: f64 = items.iter().filter_map(Value::as_f64).sum();
            serde_json::json!({ "count": items.len(), "sum": sum })
        }
        other => serde_json::json!({ "count": if other.is_null() { 0 } else { 1 } }),
    }
}

/// Rules: `[{"field": "name", "required": true}, ...]` checked against an
/// object input. Unknown rule shapes are reported, not ignored.
fn validate_rules(input: &Value, rules: &Value) -> Vec<String> {
    let Some(rules) = rules.as_array() else {
        return vec!["validation_rules must be an array".to_string()];
    };
    let mut violations = Vec::new();
    for rule in rules {
        let Some(field) = rule.get("field").and_then(Value::as_str) else {
            violations.push("rule missing 'field'".to_string());
            continue;
        };
        let required = rule.get("required").and_then(Value::as_bool).unwrap_or(false);
        let present = input.get(field).map(|v| !v.is_null()).unwrap_or(false);
        if required && !present {
            violations.push(format!("required field missing: {}", field));
        }
    }
    violations
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
