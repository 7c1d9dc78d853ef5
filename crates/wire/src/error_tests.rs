// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    validation = { ErrorCode::ValidationError, 400 },
    not_found = { ErrorCode::NotFound, 404 },
    conflict = { ErrorCode::Conflict, 409 },
    permission = { ErrorCode::PermissionDenied, 403 },
    internal = { ErrorCode::Internal, 500 },
)]
fn codes_map_to_http_statuses(code: ErrorCode, status: u16) {
    assert_eq!(ErrorBody::new(code, "x").http_status(), status);
}

#[test]
fn envelope_serializes_with_context() {
    let body = ErrorBody::new(ErrorCode::NotFound, "job not found")
        .with_context("resource", "job")
        .with_context("id", "job-123");
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["code"], "not_found");
    assert_eq!(json["message"], "job not found");
    assert_eq!(json["context"]["resource"], "job");

    let back: ErrorBody = serde_json::from_value(json).unwrap();
    assert_eq!(back, body);
}

#[test]
fn empty_context_is_omitted() {
    let json = serde_json::to_value(ErrorBody::new(ErrorCode::Internal, "boom")).unwrap();
    assert!(json.get("context").is_none());
}
