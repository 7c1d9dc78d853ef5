// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status events pushed through the live fan-out.

use crate::run::{CorrelationId, RunId, RunResultData, RunStatus};
use crate::step::StepStatus;
use serde::{Deserialize, Serialize};

/// Observer topics a subscriber can declare interest in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "topic", content = "run_id")]
pub enum Topic {
    JobMonitoring,
    QueueMonitoring,
    WorkerMonitoring,
    SystemHealth,
    /// Per-run subscription.
    Run(RunId),
}

/// A state transition or monitor sample pushed to observers.
///
/// Every run transition emits exactly one `RunStatusChanged` to
/// `job_monitoring` and to each per-run subscriber, in that order;
/// ordering is preserved within a run, not across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// A run moved through its state machine.
    JobStatusUpdate {
        run_id: RunId,
        job_id: crate::job::JobId,
        status: RunStatus,
        correlation_id: CorrelationId,
        timestamp_ms: u64,
    },
    /// A run reached a terminal status; carries the aggregate result.
    JobCompleted {
        run_id: RunId,
        job_id: crate::job::JobId,
        status: RunStatus,
        correlation_id: CorrelationId,
        result: RunResultData,
        timestamp_ms: u64,
    },
    /// Terminal failure detail frame.
    RunFailed {
        run_id: RunId,
        correlation_id: CorrelationId,
        reason: String,
        timestamp_ms: u64,
    },
    /// A step transition within a run.
    StepStatusUpdate {
        run_id: RunId,
        step_index: u32,
        step_type: String,
        status: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i64>,
        timestamp_ms: u64,
    },
    /// Queue depth per priority class (diff-emitted).
    QueueDepth {
        high: u64,
        normal: u64,
        low: u64,
        timestamp_ms: u64,
    },
    /// Worker fleet health (diff-emitted).
    WorkerHealth {
        workers: Vec<WorkerHealthEntry>,
        timestamp_ms: u64,
    },
    /// Aggregate system health sample.
    SystemHealth {
        active_runs: u64,
        queued_steps: u64,
        alive_workers: u64,
        timestamp_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealthEntry {
    pub hostname: String,
    pub active_tasks: u32,
    pub alive: bool,
    pub last_heartbeat_ms: u64,
}

impl StatusEvent {
    /// Frame type string used on the wire (`{type, data, timestamp}`).
    pub fn frame_type(&self) -> &'static str {
        match self {
            StatusEvent::JobStatusUpdate { .. } => "job_status_update",
            StatusEvent::JobCompleted { .. } => "job_completed",
            StatusEvent::RunFailed { .. } => "run_failed",
            StatusEvent::StepStatusUpdate { .. } => "step_status_update",
            StatusEvent::QueueDepth { .. } => "queue_depth",
            StatusEvent::WorkerHealth { .. } => "worker_health",
            StatusEvent::SystemHealth { .. } => "system_health",
        }
    }

    /// Topics this event is delivered to, in emission order.
    pub fn topics(&self) -> Vec<Topic> {
        match self {
            StatusEvent::JobStatusUpdate { run_id, .. }
            | StatusEvent::JobCompleted { run_id, .. }
            | StatusEvent::RunFailed { run_id, .. }
            | StatusEvent::StepStatusUpdate { run_id, .. } => {
                vec![Topic::JobMonitoring, Topic::Run(run_id.clone())]
            }
            StatusEvent::QueueDepth { .. } => vec![Topic::QueueMonitoring],
            StatusEvent::WorkerHealth { .. } => vec![Topic::WorkerMonitoring],
            StatusEvent::SystemHealth { .. } => vec![Topic::SystemHealth],
        }
    }

    /// One-line summary for log spans.
    pub fn log_summary(&self) -> String {
        match self {
            StatusEvent::JobStatusUpdate { run_id, status, .. } => {
                format!("job_status_update run={} status={}", run_id, status)
            }
            StatusEvent::JobCompleted { run_id, status, .. } => {
                format!("job_completed run={} status={}", run_id, status)
            }
            StatusEvent::RunFailed { run_id, reason, .. } => {
                format!("run_failed run={} reason={}", run_id, crate::id::short(reason, 80))
            }
            StatusEvent::StepStatusUpdate { run_id, step_index, status, .. } => {
                format!("step_status_update run={} index={} status={}", run_id, step_index, status)
            }
            StatusEvent::QueueDepth { high, normal, low, .. } => {
                format!("queue_depth high={} normal={} low={}", high, normal, low)
            }
            StatusEvent::WorkerHealth { workers, .. } => {
                format!("worker_health workers={}", workers.len())
            }
            StatusEvent::SystemHealth { active_runs, .. } => {
                format!("system_health active_runs={}", active_runs)
            }
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        match self {
            StatusEvent::JobStatusUpdate { timestamp_ms, .. }
            | StatusEvent::JobCompleted { timestamp_ms, .. }
            | StatusEvent::RunFailed { timestamp_ms, .. }
            | StatusEvent::StepStatusUpdate { timestamp_ms, .. }
            | StatusEvent::QueueDepth { timestamp_ms, .. }
            | StatusEvent::WorkerHealth { timestamp_ms, .. }
            | StatusEvent::SystemHealth { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
