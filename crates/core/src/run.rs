// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JobRun: one execution attempt of a Job, and its status machine.

use crate::step::StepStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job run.
    pub struct RunId("run-");
}

/// Opaque trace string, unique per run. Propagated through logs, executor
/// metrics, and stream frames so a run can be followed across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a job run.
///
/// ```text
/// queued ─(first step leased)──▶ running
/// running ─(all steps succeeded)──▶ succeeded
/// running ─(any step failed, budget exhausted)──▶ failed
/// queued|running ─(cancel requested)──▶ canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled)
    }
}

crate::simple_display! {
    RunStatus {
        Queued => "queued",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Canceled => "canceled",
    }
}

crate::parse_kind! {
    RunStatus {
        "queued" => Queued,
        "running" => Running,
        "succeeded" => Succeeded,
        "failed" => Failed,
        "canceled" => Canceled,
    }
}

/// Dispatch priority. High preempts FIFO ordering within the queue but
/// never preempts a running step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl RunPriority {
    /// Sort key for the lease query (`ORDER BY priority DESC`).
    pub fn rank(&self) -> i64 {
        match self {
            RunPriority::High => 2,
            RunPriority::Normal => 1,
            RunPriority::Low => 0,
        }
    }
}

crate::simple_display! {
    RunPriority {
        High => "high",
        Normal => "normal",
        Low => "low",
    }
}

crate::parse_kind! {
    RunPriority {
        "high" => High,
        "normal" => Normal,
        "low" => Low,
    }
}

/// How a run came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    #[default]
    Manual,
    Scheduled,
}

crate::simple_display! {
    RunTrigger {
        Manual => "manual",
        Scheduled => "scheduled",
    }
}

crate::parse_kind! {
    RunTrigger {
        "manual" => Manual,
        "scheduled" => Scheduled,
    }
}

/// Aggregated outcome metrics for a finished (or finishing) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunResultData {
    pub steps_total: u32,
    pub steps_succeeded: u32,
    pub steps_failed: u32,
    pub steps_skipped: u32,
    pub steps_aborted: u32,
    pub duration_ms: u64,
    /// Per-step summary: (index, type tag, status, exit code).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub index: u32,
    pub step_type: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One execution attempt of a Job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: RunId,
    pub job_id: crate::job::JobId,
    /// Version of the job definition this run was materialized from.
    pub job_version: u32,
    pub status: RunStatus,
    pub priority: RunPriority,
    pub trigger: RunTrigger,
    pub requested_by: String,
    /// Caller-supplied parameter values for this run.
    pub parameters: HashMap<String, serde_json::Value>,
    pub correlation_id: CorrelationId,
    /// Set by the schedule that fired this run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<crate::schedule::ScheduleId>,
    /// Hostname of the worker that leased the first step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_hostname: Option<String>,
    pub queued_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<RunResultData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Run-status aggregation rule, evaluated each time a step terminates.
///
/// Input is the multiset of sibling step statuses paired with each step's
/// `continue_on_failure` flag. A failed step that declared
/// `continue_on_failure` counts as non-fatal (treated like skipped).
///
/// Returns `Some(terminal)` when the run should transition, `None` while
/// steps are still outstanding. Cancellation short-circuits elsewhere and
/// never reaches this function.
pub fn aggregate_run_status(steps: &[(StepStatus, bool)]) -> Option<RunStatus> {
    let mut outstanding = false;
    let mut fatal_failure = false;
    for (status, continue_on_failure) in steps {
        match status {
            StepStatus::Queued | StepStatus::Running => outstanding = true,
            StepStatus::Failed if !continue_on_failure => fatal_failure = true,
            StepStatus::Aborted => fatal_failure = true,
            _ => {}
        }
    }
    if outstanding {
        return None;
    }
    if fatal_failure {
        Some(RunStatus::Failed)
    } else {
        Some(RunStatus::Succeeded)
    }
}

crate::builder! {
    pub struct JobRunBuilder => JobRun {
        into {
            requested_by: String = "tester",
        }
        set {
            job_version: u32 = 1,
            status: RunStatus = RunStatus::Queued,
            priority: RunPriority = RunPriority::Normal,
            trigger: RunTrigger = RunTrigger::Manual,
            parameters: HashMap<String, serde_json::Value> = HashMap::new(),
            queued_at_ms: u64 = 1_000_000,
            retry_count: u32 = 0,
        }
        option {
            schedule_id: crate::schedule::ScheduleId = None,
            worker_hostname: String = None,
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
            result_data: RunResultData = None,
            error_message: String = None,
        }
        computed {
            id: RunId = RunId::fresh(),
            job_id: crate::job::JobId = crate::job::JobId::fresh(),
            correlation_id: CorrelationId = CorrelationId::fresh(),
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
