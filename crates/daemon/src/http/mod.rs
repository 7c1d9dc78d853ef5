// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-control surface router.

mod jobs;
mod runs;
mod schedules;
mod system;

use crate::state::AppState;
use crate::stream;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(system::health))
        .route("/api/v1/jobs", post(jobs::create).get(jobs::list))
        .route("/api/v1/jobs/:id", get(jobs::get).put(jobs::update).delete(jobs::delete))
        .route("/api/v1/jobs/:id/run", post(runs::start))
        .route("/api/v1/runs", get(runs::list))
        .route("/api/v1/runs/:id", get(runs::get))
        .route("/api/v1/runs/:id/steps", get(runs::steps))
        .route("/api/v1/runs/:id/cancel", post(runs::cancel))
        .route("/api/v1/schedules", post(schedules::create).get(schedules::list))
        .route("/api/v1/schedules/:id", get(schedules::get).delete(schedules::delete))
        .route("/api/v1/schedules/:id/activate", post(schedules::activate))
        .route("/api/v1/schedules/:id/deactivate", post(schedules::deactivate))
        .route("/api/v1/export", get(jobs::export))
        .route("/api/v1/import", post(jobs::import))
        .route("/api/v1/workers", get(system::workers))
        .route("/api/v1/stream", get(stream::subscribe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
