// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule: a trigger that creates runs on a cadence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a schedule.
    pub struct ScheduleId("sch-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Once,
    Recurring,
    Cron,
}

crate::simple_display! {
    ScheduleKind {
        Once => "once",
        Recurring => "recurring",
        Cron => "cron",
    }
}

crate::parse_kind! {
    ScheduleKind {
        "once" => Once,
        "recurring" => Recurring,
        "cron" => Cron,
    }
}

/// A trigger that creates JobRuns on a cadence.
///
/// Invariants: `recurring` requires `interval_seconds > 0`; `cron`
/// requires a valid 5-field expression; `next_run_at_ms` is the soonest
/// fire time ≥ now, or None when inactive/exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub job_id: crate::job::JobId,
    pub name: String,
    pub kind: ScheduleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<u64>,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,
    pub is_active: bool,
    /// Parameters bound to every run this schedule fires.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub created_by: String,
}

impl Schedule {
    /// Structural field coherence for the schedule kind. Cron expression
    /// syntax is validated by the scheduler (which owns the cron parser).
    pub fn validate_fields(&self) -> Result<(), String> {
        match self.kind {
            ScheduleKind::Cron => {
                if self.cron_expression.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err("cron schedule requires a cron_expression".to_string());
                }
                if self.interval_seconds.is_some() {
                    return Err("cron schedule must not set interval_seconds".to_string());
                }
            }
            ScheduleKind::Recurring => {
                match self.interval_seconds {
                    Some(s) if s > 0 => {}
                    _ => return Err("recurring schedule requires interval_seconds > 0".to_string()),
                }
                if self.cron_expression.is_some() {
                    return Err("recurring schedule must not set cron_expression".to_string());
                }
            }
            ScheduleKind::Once => {
                if self.cron_expression.is_some() || self.interval_seconds.is_some() {
                    return Err("one-shot schedule takes neither cron nor interval".to_string());
                }
            }
        }
        Ok(())
    }

    /// Whether the max-runs budget still permits firing.
    pub fn has_budget(&self) -> bool {
        match self.max_runs {
            Some(max) => self.run_count < max,
            None => true,
        }
    }
}

crate::builder! {
    pub struct ScheduleBuilder => Schedule {
        into {
            name: String = "test-schedule",
            created_by: String = "tester",
        }
        set {
            kind: ScheduleKind = ScheduleKind::Recurring,
            run_count: u32 = 0,
            is_active: bool = true,
            parameters: HashMap<String, serde_json::Value> = HashMap::new(),
        }
        option {
            cron_expression: String = None,
            interval_seconds: u64 = Some(60),
            next_run_at_ms: u64 = None,
            last_run_at_ms: u64 = None,
            max_runs: u32 = None,
        }
        computed {
            id: ScheduleId = ScheduleId::fresh(),
            job_id: crate::job::JobId = crate::job::JobId::fresh(),
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
