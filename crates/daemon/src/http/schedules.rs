// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule CRUD handlers.

use crate::state::{ApiError, AppState, Caller};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use oc_core::{Clock, JobId, Schedule, ScheduleId, ScheduleKind};
use oc_engine::scheduler::{initial_next_fire, validate_cron_expression};
use oc_wire::{CreateScheduleRequest, ScheduleResponse};

pub async fn create(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), ApiError> {
    // The job must exist and be active.
    let job = state.store.get_job(&JobId::from_string(&request.job_id)).await?;
    if !job.is_active {
        return Err(ApiError::validation("cannot schedule an inactive job"));
    }

    let mut schedule = Schedule {
        id: ScheduleId::fresh(),
        job_id: job.id,
        name: request.name,
        kind: request.kind,
        cron_expression: request.cron_expression,
        interval_seconds: request.interval_seconds,
        next_run_at_ms: None,
        last_run_at_ms: None,
        run_count: 0,
        max_runs: request.max_runs,
        is_active: true,
        parameters: request.parameters,
        created_by: identity.username,
    };
    schedule.validate_fields().map_err(ApiError::validation)?;
    if schedule.kind == ScheduleKind::Cron {
        if let Some(expression) = schedule.cron_expression.as_deref() {
            validate_cron_expression(expression).map_err(ApiError::validation)?;
        }
    }
    schedule.next_run_at_ms = initial_next_fire(&schedule, state.clock.epoch_ms());

    state.store.create_schedule(&schedule).await?;
    Ok((StatusCode::CREATED, Json(ScheduleResponse::from(&schedule))))
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduleResponse>>, ApiError> {
    let schedules = state.store.list_schedules(false).await?;
    Ok(Json(schedules.iter().map(ScheduleResponse::from).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let schedule = state.store.get_schedule(&ScheduleId::from_string(&id)).await?;
    Ok(Json(ScheduleResponse::from(&schedule)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_schedule(&ScheduleId::from_string(&id)).await?;
    Ok(StatusCode::OK)
}

/// Pause a schedule without losing its cadence bookkeeping.
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.set_schedule_active(&ScheduleId::from_string(&id), false).await?;
    Ok(StatusCode::OK)
}

/// Resume a paused schedule, recomputing its next fire time.
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let schedule_id = ScheduleId::from_string(&id);
    state.store.set_schedule_active(&schedule_id, true).await?;
    let mut schedule = state.store.get_schedule(&schedule_id).await?;
    if !schedule.has_budget() {
        state.store.set_schedule_active(&schedule_id, false).await?;
        return Err(ApiError::conflict("schedule has exhausted max_runs"));
    }
    schedule.next_run_at_ms = initial_next_fire(&schedule, state.clock.epoch_ms());
    state
        .store
        .record_schedule_next_fire(&schedule_id, schedule.next_run_at_ms)
        .await?;
    Ok(Json(ScheduleResponse::from(&schedule)))
}
