// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound snapshot DTOs. Thin projections of the core entities so the
//! surface stays stable while internals move.

use oc_core::{
    Job, JobRun, JobRunStep, RunPriority, RunResultData, RunStatus, Schedule, StepStatus,
    WorkerRegistration,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: String,
    pub name: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub definition: serde_json::Value,
    pub is_active: bool,
    pub created_by: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            name: job.name.clone(),
            version: job.version,
            description: job.description.clone(),
            definition: job.definition.clone(),
            is_active: job.is_active,
            created_by: job.created_by.clone(),
            created_at_ms: job.created_at_ms,
            updated_at_ms: job.updated_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: String,
    pub job_id: String,
    pub job_version: u32,
    pub status: RunStatus,
    pub priority: RunPriority,
    pub trigger: String,
    pub requested_by: String,
    pub correlation_id: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_hostname: Option<String>,
    pub queued_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<RunResultData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&JobRun> for RunResponse {
    fn from(run: &JobRun) -> Self {
        Self {
            id: run.id.to_string(),
            job_id: run.job_id.to_string(),
            job_version: run.job_version,
            status: run.status,
            priority: run.priority,
            trigger: run.trigger.to_string(),
            requested_by: run.requested_by.clone(),
            correlation_id: run.correlation_id.to_string(),
            parameters: run.parameters.clone(),
            schedule_id: run.schedule_id.as_ref().map(|s| s.to_string()),
            worker_hostname: run.worker_hostname.clone(),
            queued_at_ms: run.queued_at_ms,
            started_at_ms: run.started_at_ms,
            finished_at_ms: run.finished_at_ms,
            result_data: run.result_data.clone(),
            error_message: run.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResponse {
    pub id: String,
    pub run_id: String,
    pub index: u32,
    pub step_type: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl From<&JobRunStep> for StepResponse {
    fn from(step: &JobRunStep) -> Self {
        Self {
            id: step.id.to_string(),
            run_id: step.run_id.to_string(),
            index: step.index,
            step_type: step.step_type.clone(),
            status: step.status,
            target_host: step.target_host.clone(),
            exit_code: step.exit_code,
            stdout: step.stdout.clone(),
            stderr: step.stderr.clone(),
            error: step.error.clone(),
            retry_count: step.retry_count,
            started_at_ms: step.started_at_ms,
            finished_at_ms: step.finished_at_ms,
            metrics: step.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub id: String,
    pub job_id: String,
    pub name: String,
    #[serde(rename = "schedule_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<u64>,
    pub run_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,
    pub is_active: bool,
    pub created_by: String,
}

impl From<&Schedule> for ScheduleResponse {
    fn from(schedule: &Schedule) -> Self {
        Self {
            id: schedule.id.to_string(),
            job_id: schedule.job_id.to_string(),
            name: schedule.name.clone(),
            kind: schedule.kind.to_string(),
            cron_expression: schedule.cron_expression.clone(),
            interval_seconds: schedule.interval_seconds,
            next_run_at_ms: schedule.next_run_at_ms,
            last_run_at_ms: schedule.last_run_at_ms,
            run_count: schedule.run_count,
            max_runs: schedule.max_runs,
            is_active: schedule.is_active,
            created_by: schedule.created_by.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub hostname: String,
    pub queues: Vec<String>,
    pub active_task_count: u32,
    pub last_heartbeat_ms: u64,
    pub alive: bool,
}

impl WorkerResponse {
    pub fn from_registration(worker: &WorkerRegistration, now_ms: u64, window_secs: u64) -> Self {
        Self {
            hostname: worker.hostname.clone(),
            queues: worker.queues.clone(),
            active_task_count: worker.active_task_count,
            last_heartbeat_ms: worker.last_heartbeat_ms,
            alive: worker.is_alive(now_ms, window_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database_ok: bool,
    pub database_latency_ms: u64,
    pub pool_size: u32,
    pub idle_connections: usize,
    pub active_runs: u64,
    pub queued_steps: u64,
    pub alive_workers: u64,
}

/// Result of an import (create-or-update semantics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImportReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub failed: Vec<(String, String)>,
}
