// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP method steps and signed webhook calls.

use crate::executor::{ExecFailure, StepContext, StepExecutor};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use oc_core::step::{HttpAuth, HttpMethod, StepPayload};
use oc_core::StepOutcome;
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Response bodies beyond this are truncated in the audit summary.
const BODY_AUDIT_LIMIT: usize = 4096;

pub struct HttpExecutor;

impl HttpExecutor {
    pub fn new() -> Self {
        Self
    }

    fn client(
        &self,
        verify_ssl: bool,
        follow_redirects: bool,
        timeout_secs: u64,
    ) -> Result<reqwest::Client, ExecFailure> {
        let redirect = if follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .redirect(redirect)
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| ExecFailure::transient(format!("http client: {}", e)))
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for HttpExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
        match &ctx.step.payload {
            StepPayload::Http {
                method,
                url,
                headers,
                body,
                auth,
                verify_ssl,
                follow_redirects,
                expected_status,
            } => {
                let client = self.client(*verify_ssl, *follow_redirects, ctx.step.timeout_secs)?;
                self.request(
                    &client,
                    *method,
                    url,
                    headers,
                    body.as_ref(),
                    auth.as_ref(),
                    expected_status,
                )
                .await
            }
            StepPayload::Webhook { url, payload, headers, secret, retry_count, retry_delay_secs } => {
                let client = self.client(true, true, ctx.step.timeout_secs)?;
                self.webhook(
                    &client,
                    url,
                    payload,
                    headers,
                    secret.as_deref(),
                    *retry_count,
                    Duration::from_secs(*retry_delay_secs),
                )
                .await
            }
            other => Err(ExecFailure::validation(format!(
                "http executor cannot handle {}",
                other.type_tag()
            ))),
        }
    }
}

impl HttpExecutor {
    #[allow(clippy::too_many_arguments)]
    async fn request(
        &self,
        client: &reqwest::Client,
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        auth: Option<&HttpAuth>,
        expected_status: &[u16],
    ) -> Result<StepOutcome, ExecFailure> {
        let mut request = client.request(to_reqwest_method(method), url);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        request = match auth {
            Some(HttpAuth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(HttpAuth::Bearer { token }) => request.bearer_auth(token),
            None => request,
        };
        request = match body {
            Some(Value::String(text)) => request.body(text.clone()),
            Some(json) => request.json(json),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| classify_reqwest(&e, url))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ExecFailure::transient(format!("http body: {}", e)))?;
        let truncated = oc_core::short(&text, BODY_AUDIT_LIMIT).to_string();

        let accepted = expected_status.contains(&status);
        if accepted {
            Ok(StepOutcome::succeeded(truncated)
                .with_metric("status_code", status)
                .with_metric("response_bytes", text.len() as u64)
                .with_metric("request", format!("{} {}", method, url)))
        } else if (500..600).contains(&status) {
            // Transient: retried within the step budget.
            Err(ExecFailure::transient(format!("{} returned {}", url, status)))
        } else {
            let mut outcome = StepOutcome::failed(status as i64, truncated);
            outcome.metrics.insert("status_code".to_string(), Value::from(status));
            outcome
                .metrics
                .insert("request".to_string(), Value::from(format!("{} {}", method, url)));
            Ok(outcome)
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn webhook(
        &self,
        client: &reqwest::Client,
        url: &str,
        payload: &Value,
        headers: &BTreeMap<String, String>,
        secret: Option<&str>,
        retry_count: u32,
        retry_delay: Duration,
    ) -> Result<StepOutcome, ExecFailure> {
        // Sorted-key serialization so the signature is reproducible by
        // the receiver regardless of field order.
        let canonical = serde_json::to_string(&canonicalize(payload))
            .map_err(|e| ExecFailure::validation(format!("webhook payload: {}", e)))?;

        let mut request_headers = headers.clone();
        if let Some(secret) = secret {
            let signature = sign(&canonical, secret)?;
            request_headers.insert("X-Webhook-Signature".to_string(), signature.clone());
            request_headers
                .insert("X-Hub-Signature-256".to_string(), format!("sha256={}", signature));
        }

        let mut last_error = None;
        for attempt in 0..=retry_count {
            if attempt > 0 {
                // Webhook retries use a linear delay, not backoff.
                tokio::time::sleep(retry_delay).await;
            }
            let mut request = client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(canonical.clone());
            for (key, value) in &request_headers {
                request = request.header(key, value);
            }
            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    if (200..300).contains(&status) {
                        return Ok(StepOutcome::succeeded(oc_core::short(&body, BODY_AUDIT_LIMIT))
                            .with_metric("status_code", status)
                            .with_metric("attempts", attempt + 1)
                            .with_metric("signed", secret.is_some()));
                    }
                    if (400..500).contains(&status) {
                        // Client errors never retry.
                        let mut outcome = StepOutcome::failed(
                            status as i64,
                            oc_core::short(&body, BODY_AUDIT_LIMIT),
                        );
                        outcome
                            .metrics
                            .insert("status_code".to_string(), Value::from(status));
                        return Ok(outcome);
                    }
                    last_error = Some(format!("{} returned {}", url, status));
                    tracing::warn!(url, status, attempt, "webhook attempt failed, retrying");
                }
                Err(e) => {
                    last_error = Some(format!("webhook send: {}", e));
                    tracing::warn!(url, attempt, error = %e, "webhook attempt failed, retrying");
                }
            }
        }
        Err(ExecFailure::transient(
            last_error.unwrap_or_else(|| "webhook retries exhausted".to_string()),
        ))
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

fn classify_reqwest(error: &reqwest::Error, url: &str) -> ExecFailure {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ExecFailure::transient(format!("http {}: {}", url, error))
    } else {
        ExecFailure::protocol(format!("http {}: {}", url, error))
    }
}

/// Recursively sort object keys for canonical serialization.
pub(crate) fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex HMAC-SHA256 of the canonical payload.
pub(crate) fn sign(canonical: &str, secret: &str) -> Result<String, ExecFailure> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExecFailure::validation(format!("webhook secret: {}", e)))?;
    mac.update(canonical.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    Ok(out)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
