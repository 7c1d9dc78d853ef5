// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Export bundle: bulk job export to a canonical JSON document with
//! create-or-update import semantics.

use oc_core::Job;
use serde::{Deserialize, Serialize};

pub const EXPORT_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExportMetadata {
    pub exported_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub job_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub format_version: String,
    /// ISO-8601.
    pub export_timestamp: String,
    pub export_metadata: ExportMetadata,
    /// Workflow definition documents, each carrying its `name`.
    pub jobs: Vec<serde_json::Value>,
}

impl ExportBundle {
    /// Build a bundle from the active job set. Each entry is the job's
    /// definition with `name`/`version`/`description` folded in, so a
    /// bundle round-trips through import by name.
    pub fn from_jobs(jobs: &[Job], exported_by: &str, now_ms: u64) -> Self {
        let documents = jobs
            .iter()
            .map(|job| {
                let mut doc = job.definition.clone();
                if let serde_json::Value::Object(map) = &mut doc {
                    map.insert("name".to_string(), serde_json::Value::from(job.name.clone()));
                    map.insert("version".to_string(), serde_json::Value::from(job.version));
                    if let Some(description) = &job.description {
                        map.insert(
                            "description".to_string(),
                            serde_json::Value::from(description.clone()),
                        );
                    }
                }
                doc
            })
            .collect::<Vec<_>>();
        Self {
            format_version: EXPORT_FORMAT_VERSION.to_string(),
            export_timestamp: oc_core::format_epoch_ms(now_ms),
            export_metadata: ExportMetadata {
                exported_by: exported_by.to_string(),
                description: None,
                job_count: documents.len(),
            },
            jobs: documents,
        }
    }

    /// Format check before import; a mismatch maps to a 400.
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != EXPORT_FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version {:?}, expected {:?}",
                self.format_version, EXPORT_FORMAT_VERSION
            ));
        }
        for (i, doc) in self.jobs.iter().enumerate() {
            if doc.get("name").and_then(|n| n.as_str()).unwrap_or("").is_empty() {
                return Err(format!("jobs[{}] is missing a name", i));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
