// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health probe and worker visibility.

use crate::state::{ApiError, AppState};
use axum::extract::State;
use axum::Json;
use oc_core::{Clock, DEFAULT_LIVENESS_WINDOW_SECS};
use oc_wire::{HealthResponse, WorkerResponse};

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let db = state.store.health().await;
    let now = state.clock.epoch_ms();
    let active_runs = state.store.count_active_runs().await.unwrap_or(0);
    let queued_steps = state.store.count_queued_steps().await.unwrap_or(0);
    let alive_workers = state
        .store
        .list_workers()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|w| w.is_alive(now, DEFAULT_LIVENESS_WINDOW_SECS))
        .count() as u64;

    Ok(Json(HealthResponse {
        status: if db.ok { "ok" } else { "degraded" }.to_string(),
        database_ok: db.ok,
        database_latency_ms: db.latency_ms,
        pool_size: db.pool_size,
        idle_connections: db.idle_connections,
        active_runs,
        queued_steps,
        alive_workers,
    }))
}

pub async fn workers(
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkerResponse>>, ApiError> {
    let now = state.clock.epoch_ms();
    let workers = state.store.list_workers().await?;
    Ok(Json(
        workers
            .iter()
            .map(|w| WorkerResponse::from_registration(w, now, DEFAULT_LIVENESS_WINDOW_SECS))
            .collect(),
    ))
}
