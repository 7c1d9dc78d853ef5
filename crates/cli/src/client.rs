// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP client for the daemon, mapping error envelopes to
//! human-readable failures.

use anyhow::{anyhow, Result};
use oc_wire::ErrorBody;
use serde_json::Value;

pub struct DaemonClient {
    base: String,
    user: Option<String>,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base: &str, user: Option<&str>) -> Result<Self> {
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            user: user.map(str::to_string),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base, path));
        if let Some(user) = &self.user {
            builder = builder
                .header("X-User-ID", user)
                .header("X-Username", user)
                .header("X-User-Role", "operator");
        }
        builder
    }

    async fn finish(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            if body.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)));
        }
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(envelope) => Err(anyhow!("{} ({})", envelope.message, envelope.code)),
            Err(_) => Err(anyhow!("daemon returned {}: {}", status, body)),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.finish(self.request(reqwest::Method::GET, path)).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.finish(self.request(reqwest::Method::POST, path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.finish(self.request(reqwest::Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.finish(self.request(reqwest::Method::DELETE, path)).await
    }
}
