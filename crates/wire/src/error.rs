// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error envelope: every API response carries a code, a
//! human-readable message, and a context map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    PermissionDenied,
    Internal,
}

oc_core::simple_display! {
    ErrorCode {
        ValidationError => "validation_error",
        NotFound => "not_found",
        Conflict => "conflict",
        PermissionDenied => "permission_denied",
        Internal => "internal",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), context: BTreeMap::new() }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// HTTP status the surface maps this code to.
    pub fn http_status(&self) -> u16 {
        match self.code {
            ErrorCode::ValidationError => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::Internal => 500,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
