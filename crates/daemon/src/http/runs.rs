// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run control: start, cancel, snapshot views.

use crate::state::{ApiError, AppState, Caller};
use axum::extract::{Path, Query, State};
use axum::Json;
use oc_core::{JobId, RunId, RunStatus, RunTrigger};
use oc_engine::RunRequest;
use oc_wire::{RunJobRequest, RunResponse, StepResponse};
use serde::Deserialize;

pub async fn start(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    Json(request): Json<RunJobRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state
        .orchestrator
        .run(RunRequest {
            job_id: JobId::from_string(&id),
            parameters: request.parameters,
            priority: request.priority,
            trigger: RunTrigger::Manual,
            requested_by: identity.username,
            schedule_id: None,
        })
        .await?;
    // Returns immediately with the run id + correlation id; execution
    // proceeds asynchronously on the worker pool.
    Ok(Json(RunResponse::from(&run)))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state.orchestrator.cancel(&RunId::from_string(&id)).await?;
    Ok(Json(RunResponse::from(&run)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state.store.get_run(&RunId::from_string(&id)).await?;
    Ok(Json(RunResponse::from(&run)))
}

pub async fn steps(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StepResponse>>, ApiError> {
    // 404 for a missing run rather than an empty list.
    let run_id = RunId::from_string(&id);
    state.store.get_run(&run_id).await?;
    let steps = state.store.get_run_steps(&run_id).await?;
    Ok(Json(steps.iter().map(StepResponse::from).collect()))
}

#[derive(Debug, Deserialize, Default)]
pub struct RunFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<RunFilter>,
) -> Result<Json<Vec<RunResponse>>, ApiError> {
    let status = match filter.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<RunStatus>()
                .map_err(|e| ApiError::validation(e))?,
        ),
    };
    let runs = state
        .store
        .list_runs(status, filter.job_id.as_deref(), filter.limit.unwrap_or(100).min(1000))
        .await?;
    Ok(Json(runs.iter().map(RunResponse::from).collect()))
}
