// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable time formatting for CLI and log output.

use chrono::{TimeZone, Utc};

/// Format a millisecond duration as `3ms`, `2.4s`, `5m12s`, or `2h03m`.
pub fn format_elapsed_ms(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let secs = ms / 1000;
    if secs < 60 {
        return format!("{}.{}s", secs, (ms % 1000) / 100);
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{}m{:02}s", mins, secs % 60);
    }
    format!("{}h{:02}m", mins / 60, mins % 60)
}

/// Epoch milliseconds as an ISO-8601 UTC timestamp (`2026-08-01T12:00:00Z`).
pub fn format_epoch_ms(ms: u64) -> String {
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => format!("{}ms", ms),
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
