// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution-time template context: `job`, `user`, `target`,
//! `system`, plus the run parameters at the top level.

use oc_core::{Clock, Job, JobRun, Target};

pub fn build_job_context(
    job: &Job,
    run: &JobRun,
    target: Option<&Target>,
    clock: &impl Clock,
) -> serde_json::Value {
    let (total, succeeded, failed, skipped) = match &run.result_data {
        Some(data) => {
            (data.steps_total, data.steps_succeeded, data.steps_failed, data.steps_skipped)
        }
        None => (0, 0, 0, 0),
    };
    let execution_ms = match (run.started_at_ms, run.finished_at_ms) {
        (Some(start), Some(end)) => end.saturating_sub(start),
        (Some(start), None) => clock.epoch_ms().saturating_sub(start),
        _ => 0,
    };

    let mut context = serde_json::json!({
        "job": {
            "id": run.job_id.as_str(),
            "run_id": run.id.as_str(),
            "name": job.name,
            "status": run.status.to_string(),
            "execution_time_ms": execution_ms,
            "steps_total": total,
            "steps_succeeded": succeeded,
            "steps_failed": failed,
            "steps_skipped": skipped,
        },
        "user": {
            "id": run.requested_by,
            "username": run.requested_by,
        },
        "system": {
            "timestamp": oc_core::format_epoch_ms(clock.epoch_ms()),
            "epoch_ms": clock.epoch_ms(),
        },
    });

    if let Some(target) = target {
        context["target"] = serde_json::json!({
            "id": target.id.as_str(),
            "name": target.name,
            "hostname": target.hostname,
            "os_type": target.os_type,
        });
    }

    // Run parameters surface at the top level, same as at translation.
    if let serde_json::Value::Object(map) = &mut context {
        for (key, value) in &run.parameters {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    context
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
