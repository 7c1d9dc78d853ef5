// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared HTTP handler state and the error-to-envelope mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use oc_core::{Identity, SystemClock};
use oc_engine::{EngineError, Orchestrator, StatusBus};
use oc_store::{Store, StoreError};
use oc_wire::{ErrorBody, ErrorCode};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub orchestrator: Arc<Orchestrator<SystemClock>>,
    pub bus: StatusBus,
    pub clock: SystemClock,
    pub worker_hostname: String,
}

/// API-facing error: an envelope plus its HTTP status.
#[derive(Debug)]
pub struct ApiError(pub ErrorBody);

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self(ErrorBody::new(ErrorCode::ValidationError, message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(ErrorBody::new(ErrorCode::NotFound, message))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self(ErrorBody::new(ErrorCode::Conflict, message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(m) => ApiError::validation(m),
            EngineError::Translate(inner) => ApiError::validation(inner.to_string()),
            EngineError::NotFound(m) => ApiError::not_found(m),
            EngineError::Conflict(m) => ApiError::conflict(m),
            EngineError::Store(inner) => inner.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => ApiError::not_found(m),
            StoreError::Conflict(m) => ApiError::conflict(m),
            StoreError::RunTerminal => ApiError::conflict("run already terminal"),
            other => {
                tracing::error!(error = %other, "store error surfaced to API");
                Self(ErrorBody::new(ErrorCode::Internal, "internal storage error"))
            }
        }
    }
}

/// Caller identity from trusted-ingress headers.
pub struct Caller(pub Identity);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let user_id = header("x-user-id");
        let identity = if user_id.is_empty() {
            Identity::anonymous()
        } else {
            let username = header("x-username");
            let role = header("x-user-role");
            Identity {
                user_id: user_id.clone(),
                username: if username.is_empty() { user_id } else { username },
                role: if role.is_empty() { "operator".to_string() } else { role },
            }
        };
        Ok(Caller(identity))
    }
}
