// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering of API documents.

use anyhow::Result;
use oc_core::format_elapsed_ms;
use serde_json::Value;

pub fn value(doc: &Value, json_out: bool, line: fn(&Value) -> String) -> Result<()> {
    if json_out {
        println!("{}", serde_json::to_string_pretty(doc)?);
    } else {
        println!("{}", line(doc));
    }
    Ok(())
}

pub fn list(docs: &Value, json_out: bool, line: fn(&Value) -> String) -> Result<()> {
    if json_out {
        println!("{}", serde_json::to_string_pretty(docs)?);
        return Ok(());
    }
    match docs.as_array() {
        Some(items) if items.is_empty() => println!("(none)"),
        Some(items) => {
            for item in items {
                println!("{}", line(item));
            }
        }
        None => println!("{}", docs),
    }
    Ok(())
}

fn field<'a>(doc: &'a Value, key: &str) -> &'a str {
    doc[key].as_str().unwrap_or("-")
}

pub fn job_line(job: &Value) -> String {
    format!(
        "{}  {}  v{}  {}",
        field(job, "id"),
        field(job, "name"),
        job["version"].as_u64().unwrap_or(0),
        if job["is_active"].as_bool().unwrap_or(false) { "active" } else { "inactive" },
    )
}

pub fn run_line(run: &Value) -> String {
    let duration = run["result_data"]["duration_ms"]
        .as_u64()
        .map(format_elapsed_ms)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {}  {}  by {}  {}",
        field(run, "id"),
        field(run, "status"),
        field(run, "trigger"),
        field(run, "requested_by"),
        duration,
    )
}

pub fn step_line(step: &Value) -> String {
    format!(
        "[{}] {}  {}  exit={}",
        step["index"].as_u64().unwrap_or(0),
        field(step, "step_type"),
        field(step, "status"),
        step["exit_code"].as_i64().map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
    )
}

pub fn schedule_line(schedule: &Value) -> String {
    let cadence = schedule["cron_expression"]
        .as_str()
        .map(str::to_string)
        .or_else(|| schedule["interval_seconds"].as_u64().map(|s| format!("every {}s", s)))
        .unwrap_or_else(|| "once".to_string());
    format!(
        "{}  {}  {}  {}  runs={}  {}",
        field(schedule, "id"),
        field(schedule, "name"),
        field(schedule, "schedule_type"),
        cadence,
        schedule["run_count"].as_u64().unwrap_or(0),
        if schedule["is_active"].as_bool().unwrap_or(false) { "active" } else { "inactive" },
    )
}

pub fn worker_line(worker: &Value) -> String {
    format!(
        "{}  tasks={}  {}",
        field(worker, "hostname"),
        worker["active_task_count"].as_u64().unwrap_or(0),
        if worker["alive"].as_bool().unwrap_or(false) { "alive" } else { "dead" },
    )
}
