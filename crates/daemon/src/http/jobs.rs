// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job CRUD, export, and import handlers.

use crate::state::{ApiError, AppState, Caller};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use oc_core::{Clock, Job, JobId};
use oc_wire::{CreateJobRequest, ExportBundle, ImportReport, ImportRequest, JobResponse,
    UpdateJobRequest};

/// Structural sanity before anything persists: the definition must be an
/// object with node/edge arrays. Full semantic validation happens at
/// translation time.
fn check_definition(definition: &serde_json::Value) -> Result<(), ApiError> {
    let Some(map) = definition.as_object() else {
        return Err(ApiError::validation("definition must be a JSON object"));
    };
    for key in ["nodes", "edges"] {
        if let Some(value) = map.get(key) {
            if !value.is_array() {
                return Err(ApiError::validation(format!("definition.{} must be an array", key)));
            }
        }
    }
    Ok(())
}

pub async fn create(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("job name must not be empty"));
    }
    check_definition(&request.definition)?;

    let now = state.clock.epoch_ms();
    let job = Job {
        id: JobId::fresh(),
        name: request.name,
        version: 1,
        description: request.description,
        definition: request.definition,
        is_active: true,
        created_by: identity.username,
        created_at_ms: now,
        updated_at_ms: now,
    };
    state.store.create_job(&job).await?;
    Ok((StatusCode::CREATED, Json(JobResponse::from(&job))))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<JobResponse>>, ApiError> {
    let jobs = state.store.list_active_jobs().await?;
    Ok(Json(jobs.iter().map(JobResponse::from).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.store.get_job(&JobId::from_string(&id)).await?;
    Ok(Json(JobResponse::from(&job)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateJobRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    check_definition(&request.definition)?;
    let job = state
        .store
        .update_job(
            &JobId::from_string(&id),
            request.name.as_deref(),
            request.description.as_deref(),
            &request.definition,
            state.clock.epoch_ms(),
        )
        .await?;
    Ok(Json(JobResponse::from(&job)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_job(&JobId::from_string(&id), state.clock.epoch_ms()).await?;
    Ok(StatusCode::OK)
}

pub async fn export(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Json<ExportBundle>, ApiError> {
    let jobs = state.store.list_active_jobs().await?;
    Ok(Json(ExportBundle::from_jobs(&jobs, &identity.username, state.clock.epoch_ms())))
}

/// Import with create-or-update semantics, keyed by job name:
/// export→import round-trips the active set, with versions advancing
/// by one on update.
pub async fn import(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportReport>, ApiError> {
    let bundle = request.bundle;
    bundle.validate().map_err(ApiError::validation)?;

    let mut report = ImportReport::default();
    let now = state.clock.epoch_ms();
    for document in &bundle.jobs {
        let name = document.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
        let description = document
            .get("description")
            .and_then(|d| d.as_str())
            .map(str::to_string);
        match state.store.get_active_job_by_name(&name).await? {
            Some(existing) => {
                match state
                    .store
                    .update_job(&existing.id, None, description.as_deref(), document, now)
                    .await
                {
                    Ok(_) => report.updated.push(name),
                    Err(e) => report.failed.push((name, e.to_string())),
                }
            }
            None => {
                let job = Job {
                    id: JobId::fresh(),
                    name: name.clone(),
                    version: 1,
                    description,
                    definition: document.clone(),
                    is_active: true,
                    created_by: identity.username.clone(),
                    created_at_ms: now,
                    updated_at_ms: now,
                };
                match state.store.create_job(&job).await {
                    Ok(()) => report.created.push(name),
                    Err(e) => report.failed.push((name, e.to_string())),
                }
            }
        }
    }
    Ok(Json(report))
}
