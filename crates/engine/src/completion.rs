// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-completion notifications: fired by the engine after the
//! aggregation transition, on a separate path from step-level
//! notification steps.

use oc_core::{JobRun, RunStatus, SendOn};
use oc_exec::{NotificationClient, NotificationRequest};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CompletionNotifyConfig {
    /// Channel name the notification service understands (email, slack, …).
    pub channel: String,
    pub destination: String,
    pub send_on: SendOn,
}

/// No-op unless configured with a client and destination.
#[derive(Clone, Default)]
pub struct CompletionNotifier {
    client: Option<Arc<NotificationClient>>,
    config: Option<CompletionNotifyConfig>,
}

impl CompletionNotifier {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(client: Arc<NotificationClient>, config: CompletionNotifyConfig) -> Self {
        Self { client: Some(client), config: Some(config) }
    }

    pub async fn run_finished(&self, job_name: &str, run: &JobRun) {
        let (Some(client), Some(config)) = (&self.client, &self.config) else {
            return;
        };
        let failed = matches!(run.status, RunStatus::Failed | RunStatus::Canceled);
        let fire = match config.send_on {
            SendOn::Always => true,
            SendOn::Success => !failed,
            SendOn::Failure => failed,
        };
        if !fire {
            return;
        }

        let subject = format!("Job {:?} {}", job_name, run.status);
        let mut lines = vec![format!("Run {} finished with status {}.", run.id, run.status)];
        if let Some(data) = &run.result_data {
            lines.push(format!(
                "Steps: {} total, {} succeeded, {} failed, {} skipped.",
                data.steps_total, data.steps_succeeded, data.steps_failed, data.steps_skipped
            ));
            lines.push(format!(
                "Duration: {}.",
                oc_core::format_elapsed_ms(data.duration_ms)
            ));
            // Failure details: each failed step with its extracted error.
            for step in data.steps.iter().filter(|s| s.status == oc_core::StepStatus::Failed) {
                lines.push(format!(
                    "Step {} ({}) failed: {}",
                    step.index,
                    step.step_type,
                    step.error.as_deref().unwrap_or("no error detail")
                ));
            }
        }
        if let Some(message) = &run.error_message {
            lines.push(format!("Error: {}", message));
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "correlation_id".to_string(),
            serde_json::Value::from(run.correlation_id.as_str().to_string()),
        );
        metadata.insert(
            "dedupe_key".to_string(),
            serde_json::Value::from(format!("run-completion:{}", run.id)),
        );

        let request = NotificationRequest {
            channel: config.channel.clone(),
            destination: config.destination.clone(),
            payload: oc_exec::notify::NotificationPayload {
                subject: Some(subject),
                content: lines.join("\n"),
                metadata,
            },
        };
        if let Err(e) = client.send(&request).await {
            tracing::warn!(run = %run.id, error = %e, "run-completion notification failed");
        }
    }
}
