// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asset-registry client: read-only
//! `GET /assets` with a short-lived snapshot cache.

use crate::executor::ExecFailure;
use oc_core::{Target, TargetId};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Registry snapshots are reused for ~5 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct AssetRow {
    id: String,
    name: String,
    hostname: String,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    os_type: Option<String>,
    #[serde(default)]
    device_type: Option<String>,
    #[serde(default)]
    service_type: Option<String>,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_true() -> bool {
    true
}

impl AssetRow {
    fn into_target(self) -> Target {
        Target {
            id: TargetId::from_string(self.id),
            name: self.name,
            hostname: self.hostname,
            ip_address: self.ip_address,
            port: self.port,
            os_type: self.os_type,
            device_type: self.device_type,
            service_type: self.service_type,
            is_active: self.is_active,
        }
    }
}

struct CachedSnapshot {
    fetched_at: Instant,
    targets: Vec<Target>,
}

pub struct TargetRegistryClient {
    base_url: String,
    client: reqwest::Client,
    cache: Mutex<Option<CachedSnapshot>>,
    ttl: Duration,
}

impl TargetRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExecFailure> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExecFailure::transient(format!("registry client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            cache: Mutex::new(None),
            ttl: DEFAULT_CACHE_TTL,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn fetch_all(&self) -> Result<Vec<Target>, ExecFailure> {
        let url = format!("{}/assets", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExecFailure::transient(format!("registry request: {}", e)))?;
        if !response.status().is_success() {
            return Err(ExecFailure::transient(format!(
                "registry returned {}",
                response.status()
            )));
        }
        let rows: Vec<AssetRow> = response
            .json()
            .await
            .map_err(|e| ExecFailure::transient(format!("registry response: {}", e)))?;
        Ok(rows.into_iter().map(AssetRow::into_target).collect())
    }

    /// All active targets, served from cache within the TTL.
    pub async fn targets(&self) -> Result<Vec<Target>, ExecFailure> {
        if let Some(cached) = self.cache.lock().as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.targets.clone());
            }
        }
        let targets: Vec<Target> =
            self.fetch_all().await?.into_iter().filter(|t| t.is_active).collect();
        *self.cache.lock() =
            Some(CachedSnapshot { fetched_at: Instant::now(), targets: targets.clone() });
        Ok(targets)
    }

    /// Hostname/IP/name → target map for the translator's resolver seam.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, Target>, ExecFailure> {
        let mut map = BTreeMap::new();
        for target in self.targets().await? {
            if let Some(ip) = target.ip_address.clone().filter(|ip| !ip.is_empty()) {
                map.insert(ip, target.clone());
            }
            map.insert(target.name.clone(), target.clone());
            map.insert(target.hostname.clone(), target);
        }
        Ok(map)
    }

    /// Find one target by hostname, IP, or name.
    pub async fn resolve(&self, host: &str) -> Result<Option<Target>, ExecFailure> {
        Ok(self.snapshot().await?.get(host).cloned())
    }
}
