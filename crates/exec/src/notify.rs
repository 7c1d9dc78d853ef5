// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification dispatch: send_on gating, execution-time
//! rendering against the job context, and delivery through the external
//! notification service.

use crate::executor::{ExecFailure, StepContext, StepExecutor};
use async_trait::async_trait;
use oc_core::step::{SendOn, StepPayload};
use oc_core::{RunStatus, StepOutcome};
use oc_workflow::template::{render_str, Context};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Notification service contract: `POST /notifications`.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub channel: String,
    pub destination: String,
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Thin client for the external notification service.
pub struct NotificationClient {
    base_url: String,
    client: reqwest::Client,
}

impl NotificationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExecFailure> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ExecFailure::transient(format!("notification client: {}", e)))?;
        Ok(Self { base_url: base_url.into(), client })
    }

    pub async fn send(&self, request: &NotificationRequest) -> Result<(), ExecFailure> {
        let url = format!("{}/notifications", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ExecFailure::transient(format!("notification send: {}", e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let failure = if status.is_server_error() {
            ExecFailure::transient(format!("notification service returned {}", status))
        } else {
            ExecFailure::protocol(format!("notification service returned {}", status))
        };
        Err(failure)
    }
}

pub struct NotifyExecutor {
    client: Arc<NotificationClient>,
}

impl NotifyExecutor {
    pub fn new(client: Arc<NotificationClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepExecutor for NotifyExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
        self.execute_payload(ctx, &ctx.step.payload).await
    }
}

impl NotifyExecutor {
    async fn execute_payload(
        &self,
        ctx: &StepContext,
        payload: &StepPayload,
    ) -> Result<StepOutcome, ExecFailure> {
        match payload {
            StepPayload::Notify {
                channel,
                recipients,
                subject,
                body,
                priority,
                send_on,
                dedupe_key,
            } => {
                let template_ctx = template_context(ctx);
                if !should_send(*send_on, run_status_of(ctx)) {
                    return Ok(StepOutcome::skipped(format!(
                        "send_on={:?} did not match run status",
                        send_on
                    )));
                }

                // Subject and body render now, against the full job
                // context.
                let subject = match subject {
                    Some(raw) => Some(
                        render_str(raw, &template_ctx, "notification.subject")
                            .map_err(|e| ExecFailure::validation(e.to_string()))?,
                    ),
                    None => None,
                };
                let content = render_str(body, &template_ctx, "notification.body")
                    .map_err(|e| ExecFailure::validation(e.to_string()))?;

                let mut metadata = serde_json::Map::new();
                metadata.insert("priority".to_string(), serde_json::Value::from(priority.clone()));
                metadata.insert(
                    "correlation_id".to_string(),
                    serde_json::Value::from(ctx.run.correlation_id.as_str().to_string()),
                );
                if let Some(key) = dedupe_key {
                    // Idempotence against at-least-once delivery.
                    metadata.insert("dedupe_key".to_string(), serde_json::Value::from(key.clone()));
                }

                let destinations: Vec<String> = if recipients.is_empty() {
                    vec![String::new()]
                } else {
                    recipients.clone()
                };
                for destination in &destinations {
                    self.client
                        .send(&NotificationRequest {
                            channel: channel.to_string(),
                            destination: destination.clone(),
                            payload: NotificationPayload {
                                subject: subject.clone(),
                                content: content.clone(),
                                metadata: metadata.clone(),
                            },
                        })
                        .await?;
                }

                Ok(StepOutcome::succeeded(format!(
                    "sent {} notification to {} recipient(s)",
                    channel,
                    destinations.len()
                ))
                .with_metric("channel", channel.to_string())
                .with_metric("recipients", destinations.len() as u64))
            }
            StepPayload::NotifyConditional { condition, inner } => {
                let template_ctx = template_context(ctx);
                let fire = oc_workflow::evaluate_bool(condition, &template_ctx)
                    .map_err(|e| ExecFailure::validation(format!("condition: {}", e)))?;
                if !fire {
                    return Ok(StepOutcome::skipped(format!(
                        "condition {:?} evaluated false",
                        condition
                    )));
                }
                Box::pin(self.execute_payload(ctx, inner)).await
            }
            other => Err(ExecFailure::validation(format!(
                "notify executor cannot handle {}",
                other.type_tag()
            ))),
        }
    }
}

/// `send_on` filter against the run's current aggregate status.
fn should_send(send_on: SendOn, status: Option<RunStatus>) -> bool {
    match send_on {
        SendOn::Always => true,
        SendOn::Success => !matches!(status, Some(RunStatus::Failed | RunStatus::Canceled)),
        SendOn::Failure => matches!(status, Some(RunStatus::Failed | RunStatus::Canceled)),
    }
}

fn run_status_of(ctx: &StepContext) -> Option<RunStatus> {
    ctx.job_context
        .get("job")
        .and_then(|j| j.get("status"))
        .and_then(|s| s.as_str())
        .and_then(|s| s.parse().ok())
}

/// Template context: the job-context document's top-level entries
/// (job, user, target, system, plus the run parameters).
fn template_context(ctx: &StepContext) -> Context {
    let mut template_ctx = Context::new();
    if let serde_json::Value::Object(map) = &ctx.job_context {
        template_ctx.extend_object(map);
    }
    template_ctx
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
