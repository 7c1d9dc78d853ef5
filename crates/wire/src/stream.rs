// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming frames: `{type, data, timestamp}` JSON messages.

use oc_core::StatusEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub data: serde_json::Value,
    /// ISO-8601 emission time.
    pub timestamp: String,
}

impl StreamFrame {
    /// Wrap a status event. The event's own payload becomes `data` with
    /// the discriminant lifted out into `type`.
    pub fn from_event(event: &StatusEvent) -> Self {
        let mut data = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(map) = &mut data {
            map.remove("type");
        }
        Self {
            frame_type: event.frame_type().to_string(),
            data,
            timestamp: oc_core::format_epoch_ms(event.timestamp_ms()),
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
