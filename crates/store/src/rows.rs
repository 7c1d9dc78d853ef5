// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row ↔ domain mapping. Status enums travel as text, JSON payloads as
//! serialized columns; parse failures surface as corruption, never panic.

use crate::StoreError;
use oc_core::{
    CorrelationId, Job, JobId, JobRun, JobRunStep, RetryPolicy, RunId, RunPriority, RunResultData,
    RunStatus, RunTrigger, Schedule, ScheduleId, ScheduleKind, StepId, StepPayload, StepStatus,
    TargetId, WorkerRegistration,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{}: {}", what, detail))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| corrupt(what, e))
}

fn opt_ms(row: &SqliteRow, col: &str) -> Result<Option<u64>, StoreError> {
    Ok(row.try_get::<Option<i64>, _>(col)?.map(|v| v as u64))
}

pub(crate) fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    Ok(Job {
        id: JobId::from_string(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        version: row.try_get::<i64, _>("version")? as u32,
        description: row.try_get("description")?,
        definition: parse_json(&row.try_get::<String, _>("definition")?, "job.definition")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_by: row.try_get("created_by")?,
        created_at_ms: row.try_get::<i64, _>("created_at_ms")? as u64,
        updated_at_ms: row.try_get::<i64, _>("updated_at_ms")? as u64,
    })
}

pub(crate) fn run_from_row(row: &SqliteRow) -> Result<JobRun, StoreError> {
    let priority = match row.try_get::<i64, _>("priority")? {
        2 => RunPriority::High,
        0 => RunPriority::Low,
        _ => RunPriority::Normal,
    };
    let status: RunStatus = row
        .try_get::<String, _>("status")?
        .parse()
        .map_err(|e| corrupt("run.status", e))?;
    let trigger: RunTrigger = row
        .try_get::<String, _>("trigger_kind")?
        .parse()
        .map_err(|e| corrupt("run.trigger", e))?;
    let result_data: Option<RunResultData> = match row.try_get::<Option<String>, _>("result_data")? {
        Some(raw) => Some(parse_json(&raw, "run.result_data")?),
        None => None,
    };
    Ok(JobRun {
        id: RunId::from_string(row.try_get::<String, _>("id")?),
        job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        job_version: row.try_get::<i64, _>("job_version")? as u32,
        status,
        priority,
        trigger,
        requested_by: row.try_get("requested_by")?,
        parameters: parse_json(&row.try_get::<String, _>("parameters")?, "run.parameters")?,
        correlation_id: CorrelationId(row.try_get("correlation_id")?),
        schedule_id: row
            .try_get::<Option<String>, _>("schedule_id")?
            .map(ScheduleId::from_string),
        worker_hostname: row.try_get("worker_hostname")?,
        queued_at_ms: row.try_get::<i64, _>("queued_at_ms")? as u64,
        started_at_ms: opt_ms(row, "started_at_ms")?,
        finished_at_ms: opt_ms(row, "finished_at_ms")?,
        retry_count: row.try_get::<i64, _>("retry_count")? as u32,
        result_data,
        error_message: row.try_get("error_message")?,
    })
}

pub(crate) fn step_from_row(row: &SqliteRow) -> Result<JobRunStep, StoreError> {
    let status: StepStatus = row
        .try_get::<String, _>("status")?
        .parse()
        .map_err(|e| corrupt("step.status", e))?;
    let payload: StepPayload = parse_json(&row.try_get::<String, _>("payload")?, "step.payload")?;
    let retry: RetryPolicy =
        parse_json(&row.try_get::<String, _>("retry_policy")?, "step.retry_policy")?;
    let metrics: serde_json::Map<String, serde_json::Value> =
        parse_json(&row.try_get::<String, _>("metrics")?, "step.metrics")?;
    Ok(JobRunStep {
        id: StepId::from_string(row.try_get::<String, _>("id")?),
        run_id: RunId::from_string(row.try_get::<String, _>("run_id")?),
        index: row.try_get::<i64, _>("step_index")? as u32,
        step_type: row.try_get("step_type")?,
        payload,
        target_id: row.try_get::<Option<String>, _>("target_id")?.map(TargetId::from_string),
        target_host: row.try_get("target_host")?,
        credential_hint: row.try_get("credential_hint")?,
        timeout_secs: row.try_get::<i64, _>("timeout_secs")? as u64,
        retry,
        continue_on_failure: row.try_get::<i64, _>("continue_on_failure")? != 0,
        status,
        exit_code: row.try_get("exit_code")?,
        stdout: row.try_get("stdout")?,
        stderr: row.try_get("stderr")?,
        error: row.try_get("error")?,
        lease_token: row.try_get("lease_token")?,
        retry_count: row.try_get::<i64, _>("retry_count")? as u32,
        eta_ms: row.try_get::<i64, _>("eta_ms")? as u64,
        started_at_ms: opt_ms(row, "started_at_ms")?,
        finished_at_ms: opt_ms(row, "finished_at_ms")?,
        metrics,
    })
}

pub(crate) fn schedule_from_row(row: &SqliteRow) -> Result<Schedule, StoreError> {
    let kind: ScheduleKind = row
        .try_get::<String, _>("kind")?
        .parse()
        .map_err(|e| corrupt("schedule.kind", e))?;
    Ok(Schedule {
        id: ScheduleId::from_string(row.try_get::<String, _>("id")?),
        job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        name: row.try_get("name")?,
        kind,
        cron_expression: row.try_get("cron_expression")?,
        interval_seconds: row.try_get::<Option<i64>, _>("interval_seconds")?.map(|v| v as u64),
        next_run_at_ms: opt_ms(row, "next_run_at_ms")?,
        last_run_at_ms: opt_ms(row, "last_run_at_ms")?,
        run_count: row.try_get::<i64, _>("run_count")? as u32,
        max_runs: row.try_get::<Option<i64>, _>("max_runs")?.map(|v| v as u32),
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        parameters: parse_json(&row.try_get::<String, _>("parameters")?, "schedule.parameters")?,
        created_by: row.try_get("created_by")?,
    })
}

pub(crate) fn worker_from_row(row: &SqliteRow) -> Result<WorkerRegistration, StoreError> {
    Ok(WorkerRegistration {
        hostname: row.try_get("hostname")?,
        queues: parse_json(&row.try_get::<String, _>("queues")?, "worker.queues")?,
        active_task_count: row.try_get::<i64, _>("active_task_count")? as u32,
        last_heartbeat_ms: row.try_get::<i64, _>("last_heartbeat_ms")? as u64,
    })
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| corrupt(what, e))
}
