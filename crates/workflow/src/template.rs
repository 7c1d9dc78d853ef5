// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template rendering: `{{ expression }}` substitution over strings and
//! JSON documents.
//!
//! Rendering is pure — the same template and context always produce
//! byte-identical output. Undefined variables raise.

use crate::expr::{self, stringify, EvalError};
use serde_json::Value;
use thiserror::Error;

pub use crate::expr::Context;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("template error in {field:?}: {source}")]
    Eval {
        field: String,
        #[source]
        source: EvalError,
    },
    #[error("unclosed '{{{{' in {field:?}")]
    Unclosed { field: String },
}

/// Render a template string against the context.
///
/// `field` names the workflow field being rendered; it appears in errors
/// so authors can locate the offending node.
pub fn render_str(template: &str, ctx: &Context, field: &str) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                return Ok(out);
            }
            Some(open) => {
                out.push_str(&rest[..open]);
                let after = &rest[open + 2..];
                let close = after
                    .find("}}")
                    .ok_or_else(|| TemplateError::Unclosed { field: field.to_string() })?;
                let expr_src = &after[..close];
                let expr = expr::parse(expr_src)
                    .map_err(|source| TemplateError::Eval { field: field.to_string(), source })?;
                let value = expr
                    .eval(ctx)
                    .map_err(|source| TemplateError::Eval { field: field.to_string(), source })?;
                out.push_str(&stringify(&value));
                rest = &after[close + 2..];
            }
        }
    }
}

/// Recursively render every string in a JSON document (object values,
/// array elements, and bare strings). Keys are left untouched.
pub fn render_json(value: &Value, ctx: &Context, field: &str) -> Result<Value, TemplateError> {
    Ok(match value {
        Value::String(s) => Value::String(render_str(s, ctx, field)?),
        Value::Array(items) => Value::Array(
            items.iter().map(|v| render_json(v, ctx, field)).collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_json(v, ctx, field)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

/// Evaluate a rendered expression as a boolean condition.
pub fn eval_condition(expression: &str, ctx: &Context, field: &str) -> Result<bool, TemplateError> {
    expr::evaluate_bool(expression, ctx)
        .map_err(|source| TemplateError::Eval { field: field.to_string(), source })
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
