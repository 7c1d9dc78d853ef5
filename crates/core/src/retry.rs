// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step retry policy and backoff computation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Declared per step; defaults depend on the step type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    /// When true the backoff is jittered ±50%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 0, base_delay_secs: 30, jitter: true }
    }
}

impl RetryPolicy {
    /// Type-tag-keyed defaults: 0 for exec steps, 3 for http/notify,
    /// 1 for file transfers.
    pub fn default_for(type_tag: &str) -> Self {
        let max_retries = match type_tag {
            t if t.starts_with("http.") => 3,
            t if t.starts_with("notify.") => 3,
            "webhook.call" => 3,
            t if t.starts_with("sftp.") => 1,
            "ssh.copy" | "winrm.copy" => 1,
            _ => 0,
        };
        Self { max_retries, base_delay_secs: 30, jitter: true }
    }

    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }
}

/// Exponential backoff: `base × 2^attempt`, optionally jittered ±50%.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.min(16); // cap the shift, not the caller's counter
    let base_ms = policy.base_delay_secs.saturating_mul(1000);
    let delay_ms = base_ms.saturating_mul(1u64 << exp);
    if !policy.jitter {
        return Duration::from_millis(delay_ms);
    }
    let spread = delay_ms / 2;
    let jittered = delay_ms - spread + jitter_within(spread * 2 + 1);
    Duration::from_millis(jittered)
}

fn jitter_within(bound_ms: u64) -> u64 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..bound_ms.max(1))
}

/// Failure classification for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network timeout, 5xx, connection refused/reset. Retried within budget.
    Transient,
    /// Non-zero exit code, unacceptable 4xx. Never retried.
    Protocol,
    /// Bad workflow/parameter/expression. Never retried.
    Validation,
    /// Dangerous command refusal, oversized payload. Never retried.
    Safety,
}

impl FailureKind {
    pub fn retryable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

crate::simple_display! {
    FailureKind {
        Transient => "transient",
        Protocol => "protocol",
        Validation => "validation",
        Safety => "safety",
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
