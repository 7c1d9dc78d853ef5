// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret redaction for executor output: credential material is
//! scrubbed from stdout/stderr echoes before anything is persisted).

use oc_core::{SecretMaterial, StepOutcome};

pub const REDACTED: &str = "********";

/// Replace any occurrence of the secret values in the text.
pub fn redact_text(text: &str, secrets: &[&str]) -> String {
    let mut out = text.to_string();
    for secret in secrets {
        if secret.len() >= 4 {
            out = out.replace(secret, REDACTED);
        }
    }
    out
}

/// Scrub stdout, stderr, and string metrics in place.
pub fn redact_outcome(outcome: &mut StepOutcome, secret: &SecretMaterial) {
    let values = secret.secret_values();
    if values.is_empty() {
        return;
    }
    outcome.stdout = redact_text(&outcome.stdout, &values);
    outcome.stderr = redact_text(&outcome.stderr, &values);
    for value in outcome.metrics.values_mut() {
        if let serde_json::Value::String(s) = value {
            *s = redact_text(s, &values);
        }
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
