// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand implementations.

use crate::client::DaemonClient;
use crate::output;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum JobCommand {
    /// Create a job from a definition file.
    Create {
        name: String,
        /// Path to the workflow definition JSON.
        definition: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// Replace a job's definition (bumps the version).
    Update {
        id: String,
        definition: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// Soft-delete a job.
    Delete { id: String },
    /// List active jobs.
    List,
    /// Show one job.
    Show { id: String },
    /// Export all active jobs to a bundle file (or stdout).
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a bundle with create-or-update semantics.
    Import { bundle: PathBuf },
}

#[derive(Subcommand)]
pub enum RunCommand {
    /// Start a run of a job.
    Start {
        job_id: String,
        /// Run parameters as `name=value` pairs (values parsed as JSON
        /// when possible, else strings).
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Cancel a run.
    Cancel { id: String },
    /// Show a run.
    Show { id: String },
    /// Show a run's steps.
    Steps { id: String },
    /// List recent runs.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        job_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// Create a schedule for a job.
    Create {
        name: String,
        job_id: String,
        /// once | recurring | cron
        #[arg(long = "type", default_value = "recurring")]
        schedule_type: String,
        #[arg(long)]
        cron: Option<String>,
        #[arg(long)]
        interval_seconds: Option<u64>,
        #[arg(long)]
        max_runs: Option<u32>,
    },
    /// List schedules.
    List,
    /// Delete a schedule.
    Delete { id: String },
}

#[derive(Args)]
pub struct WatchArgs {
    /// Run id to follow; omitted means all run transitions.
    #[arg(long)]
    pub run: Option<String>,
}

fn parse_params(params: &[String]) -> Result<Value> {
    let mut map = serde_json::Map::new();
    for pair in params {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter {:?} is not name=value", pair))?;
        let parsed = serde_json::from_str(value).unwrap_or(Value::String(value.to_string()));
        map.insert(key.to_string(), parsed);
    }
    Ok(Value::Object(map))
}

fn read_json(path: &PathBuf) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub async fn job(client: &DaemonClient, command: JobCommand, json_out: bool) -> Result<()> {
    match command {
        JobCommand::Create { name, definition, description } => {
            let body = json!({
                "name": name,
                "definition": read_json(&definition)?,
                "description": description,
            });
            let created = client.post("/api/v1/jobs", &body).await?;
            output::value(&created, json_out, output::job_line)
        }
        JobCommand::Update { id, definition, description } => {
            let body = json!({
                "definition": read_json(&definition)?,
                "description": description,
            });
            let updated = client.put(&format!("/api/v1/jobs/{}", id), &body).await?;
            output::value(&updated, json_out, output::job_line)
        }
        JobCommand::Delete { id } => {
            client.delete(&format!("/api/v1/jobs/{}", id)).await?;
            println!("deleted {}", id);
            Ok(())
        }
        JobCommand::List => {
            let jobs = client.get("/api/v1/jobs").await?;
            output::list(&jobs, json_out, output::job_line)
        }
        JobCommand::Show { id } => {
            let job = client.get(&format!("/api/v1/jobs/{}", id)).await?;
            output::value(&job, json_out, output::job_line)
        }
        JobCommand::Export { out } => {
            let bundle = client.get("/api/v1/export").await?;
            let rendered = serde_json::to_string_pretty(&bundle)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!(
                        "exported {} job(s) to {}",
                        bundle["export_metadata"]["job_count"],
                        path.display()
                    );
                }
                None => println!("{}", rendered),
            }
            Ok(())
        }
        JobCommand::Import { bundle } => {
            let body = json!({ "bundle": read_json(&bundle)? });
            let report = client.post("/api/v1/import", &body).await?;
            if json_out {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "created {}, updated {}, failed {}",
                    report["created"].as_array().map(Vec::len).unwrap_or(0),
                    report["updated"].as_array().map(Vec::len).unwrap_or(0),
                    report["failed"].as_array().map(Vec::len).unwrap_or(0),
                );
            }
            Ok(())
        }
    }
}

pub async fn run(client: &DaemonClient, command: RunCommand, json_out: bool) -> Result<()> {
    match command {
        RunCommand::Start { job_id, params, priority } => {
            let body = json!({ "parameters": parse_params(&params)?, "priority": priority });
            let run = client.post(&format!("/api/v1/jobs/{}/run", job_id), &body).await?;
            output::value(&run, json_out, output::run_line)
        }
        RunCommand::Cancel { id } => {
            let run = client.post(&format!("/api/v1/runs/{}/cancel", id), &json!({})).await?;
            output::value(&run, json_out, output::run_line)
        }
        RunCommand::Show { id } => {
            let run = client.get(&format!("/api/v1/runs/{}", id)).await?;
            output::value(&run, json_out, output::run_line)
        }
        RunCommand::Steps { id } => {
            let steps = client.get(&format!("/api/v1/runs/{}/steps", id)).await?;
            output::list(&steps, json_out, output::step_line)
        }
        RunCommand::List { status, job_id, limit } => {
            let mut path = format!("/api/v1/runs?limit={}", limit);
            if let Some(status) = status {
                path.push_str(&format!("&status={}", status));
            }
            if let Some(job_id) = job_id {
                path.push_str(&format!("&job_id={}", job_id));
            }
            let runs = client.get(&path).await?;
            output::list(&runs, json_out, output::run_line)
        }
    }
}

pub async fn schedule(
    client: &DaemonClient,
    command: ScheduleCommand,
    json_out: bool,
) -> Result<()> {
    match command {
        ScheduleCommand::Create {
            name,
            job_id,
            schedule_type,
            cron,
            interval_seconds,
            max_runs,
        } => {
            let body = json!({
                "name": name,
                "job_id": job_id,
                "schedule_type": schedule_type,
                "cron_expression": cron,
                "interval_seconds": interval_seconds,
                "max_runs": max_runs,
            });
            let created = client.post("/api/v1/schedules", &body).await?;
            output::value(&created, json_out, output::schedule_line)
        }
        ScheduleCommand::List => {
            let schedules = client.get("/api/v1/schedules").await?;
            output::list(&schedules, json_out, output::schedule_line)
        }
        ScheduleCommand::Delete { id } => {
            client.delete(&format!("/api/v1/schedules/{}", id)).await?;
            println!("deleted {}", id);
            Ok(())
        }
    }
}

pub async fn health(client: &DaemonClient, json_out: bool) -> Result<()> {
    let health = client.get("/healthz").await?;
    if json_out {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!(
            "status={} db_ok={} db_latency={}ms active_runs={} queued_steps={} workers={}",
            health["status"].as_str().unwrap_or("?"),
            health["database_ok"],
            health["database_latency_ms"],
            health["active_runs"],
            health["queued_steps"],
            health["alive_workers"],
        );
    }
    Ok(())
}

pub async fn workers(client: &DaemonClient, json_out: bool) -> Result<()> {
    let workers = client.get("/api/v1/workers").await?;
    output::list(&workers, json_out, output::worker_line)
}

/// Subscribe to the stream endpoint and print frames until interrupted.
pub async fn watch(base_url: &str, args: WatchArgs) -> Result<()> {
    let ws_url = format!(
        "ws{}/api/v1/stream",
        base_url
            .trim_end_matches('/')
            .strip_prefix("http")
            .ok_or_else(|| anyhow!("daemon url must start with http"))?
    );
    let (mut socket, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .with_context(|| format!("connecting to {}", ws_url))?;

    let topics = match &args.run {
        Some(run_id) => json!([{ "topic": "run", "run_id": run_id }]),
        None => json!([
            { "topic": "job_monitoring" },
            { "topic": "queue_monitoring" },
            { "topic": "worker_monitoring" }
        ]),
    };
    socket
        .send(tokio_tungstenite::tungstenite::Message::text(
            json!({ "topics": topics }).to_string(),
        ))
        .await?;

    while let Some(message) = socket.next().await {
        match message? {
            tokio_tungstenite::tungstenite::Message::Text(text) => {
                let frame: Value = serde_json::from_str(&text)?;
                println!(
                    "{} {} {}",
                    frame["timestamp"].as_str().unwrap_or(""),
                    frame["type"].as_str().unwrap_or("?"),
                    serde_json::to_string(&frame["data"])?,
                );
            }
            tokio_tungstenite::tungstenite::Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
