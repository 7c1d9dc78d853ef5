// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credentials resolver: vault lookups with a short in-process
//! cache. Secret material is handed to executors by value and dropped
//! with the step context; nothing here persists it.

use crate::executor::ExecFailure;
use oc_core::{CredentialId, CredentialKind, CredentialRef, SecretMaterial, Target};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Seconds, not minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Vault contract: `GET /credentials/{id}` over mutually
/// authenticated transport.
pub struct VaultClient {
    base_url: String,
    client: reqwest::Client,
}

impl VaultClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExecFailure> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExecFailure::transient(format!("vault client: {}", e)))?;
        Ok(Self { base_url: base_url.into(), client })
    }

    pub async fn fetch(&self, reference: &str) -> Result<SecretMaterial, ExecFailure> {
        let url = format!("{}/credentials/{}", self.base_url.trim_end_matches('/'), reference);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExecFailure::transient(format!("vault request: {}", e)))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ExecFailure::validation(format!("credential {:?} not found", reference)));
        }
        if !status.is_success() {
            return Err(ExecFailure::transient(format!("vault returned {}", status)));
        }
        response
            .json::<SecretMaterial>()
            .await
            .map_err(|e| ExecFailure::transient(format!("vault response: {}", e)))
    }
}

struct CacheEntry {
    material: SecretMaterial,
    fetched_at: Instant,
}

/// Resolves the credential for a target: explicit hint first, else the
/// default credential for the target's service type.
pub struct CredentialsResolver {
    vault: VaultClient,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl CredentialsResolver {
    pub fn new(vault: VaultClient) -> Self {
        Self::with_ttl(vault, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(vault: VaultClient, ttl: Duration) -> Self {
        Self { vault, cache: Mutex::new(HashMap::new()), ttl }
    }

    /// Vault reference for a step: the author's hint wins; otherwise the
    /// service-type default entry.
    pub fn reference_for(target: &Target, hint: Option<&str>) -> String {
        match hint {
            Some(hint) if !hint.is_empty() => hint.to_string(),
            _ => {
                let service = target.service_type.as_deref().unwrap_or("ssh");
                format!("default-{}", service)
            }
        }
    }

    /// Classify vault material into the credential taxonomy.
    pub fn classify(material: &SecretMaterial) -> CredentialKind {
        if material.private_key.is_some() {
            CredentialKind::SshKey
        } else if material.certificate.is_some() {
            CredentialKind::Certificate
        } else if material.token.is_some() {
            if material.username.is_empty() {
                CredentialKind::ApiKey
            } else {
                CredentialKind::Token
            }
        } else {
            CredentialKind::UsernamePassword
        }
    }

    pub async fn resolve(
        &self,
        target: &Target,
        hint: Option<&str>,
    ) -> Result<SecretMaterial, ExecFailure> {
        let reference = Self::reference_for(target, hint);
        if let Some(entry) = self.cache.lock().get(&reference) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.material.clone());
            }
        }
        let material = self.vault.fetch(&reference).await?;

        // Flag authoring mistakes like an SSH key hinted onto a WinRM
        // target; the step still runs, its auth failure tells the rest.
        let resolved = CredentialRef {
            id: CredentialId::from_string(&reference),
            name: reference.clone(),
            kind: Self::classify(&material),
        };
        if let Some(service) = target.service_type.as_deref() {
            if !resolved.kind.suits_service(service) {
                tracing::warn!(
                    credential = %resolved.name,
                    kind = %resolved.kind,
                    service,
                    "credential kind does not suit the target service type"
                );
            }
        }

        self.cache.lock().insert(
            reference,
            CacheEntry { material: material.clone(), fetched_at: Instant::now() },
        );
        Ok(material)
    }

    /// Drop every cached secret (shutdown path).
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
