// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job: a named, versioned workflow definition.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job (workflow definition).
    ///
    /// A job keeps its ID across versions; edits bump `version` and leave
    /// prior versions retained for audit.
    pub struct JobId("job-");
}

/// A named, versioned workflow definition.
///
/// The definition itself is held as the raw JSON document the caller
/// submitted (nodes + edges + declared parameters). The workflow crate
/// parses it into typed form at translation time; keeping the raw value
/// here preserves unknown fields bit-exactly for export (forward compat).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Unique among active jobs.
    pub name: String,
    /// Monotone; bumped on every definition edit.
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw workflow definition JSON (nodes + edges + parameters).
    pub definition: serde_json::Value,
    /// Soft-delete flag. Inactive jobs are retained but cannot be run.
    pub is_active: bool,
    pub created_by: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Job {
    /// Declared parameter defaults from the definition's `parameters` map.
    ///
    /// Returns `(name, default)` for every declared parameter that carries
    /// a `default` field. Callers merge these under run-supplied values.
    pub fn parameter_defaults(&self) -> Vec<(String, serde_json::Value)> {
        let mut out = Vec::new();
        if let Some(params) = self.definition.get("parameters").and_then(|p| p.as_object()) {
            for (name, decl) in params {
                if let Some(default) = decl.get("default") {
                    out.push((name.clone(), default.clone()));
                }
            }
        }
        out
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            name: String = "test-job",
            created_by: String = "tester",
        }
        set {
            version: u32 = 1,
            definition: serde_json::Value = serde_json::json!({"nodes": [], "edges": []}),
            is_active: bool = true,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            description: String = None,
        }
        computed {
            id: JobId = JobId::fresh(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
