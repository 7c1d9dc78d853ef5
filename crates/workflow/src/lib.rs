// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oc-workflow: workflow graph parsing, templating, and translation to
//! ordered execution steps.

pub mod expr;
pub mod graph;
pub mod template;
pub mod translate;
pub mod validate;

pub use expr::{evaluate_bool, EvalError, Expr};
pub use graph::{EdgeDef, NodeDef, NodeType, ParameterDecl, WorkflowDefinition};
pub use template::{render_json, render_str, Context, TemplateError};
pub use translate::{
    translate, NullResolver, TargetResolver, TranslateError, TranslationReport, Translator,
};
pub use validate::{validate_graph, CycleClass, ValidationIssue};
