// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential references and in-memory secret material.
//!
//! The core persists only the reference; decrypted material exists for the
//! duration of a single step invocation and is redacted from all echoes.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Vault reference for a credential.
    pub struct CredentialId("crd-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    UsernamePassword,
    SshKey,
    Certificate,
    Token,
    ApiKey,
}

crate::simple_display! {
    CredentialKind {
        UsernamePassword => "username_password",
        SshKey => "ssh_key",
        Certificate => "certificate",
        Token => "token",
        ApiKey => "api_key",
    }
}

impl CredentialKind {
    /// Whether this credential kind suits a target's service type.
    pub fn suits_service(&self, service_type: &str) -> bool {
        match service_type {
            "ssh" => matches!(self, CredentialKind::SshKey | CredentialKind::UsernamePassword),
            "winrm" | "winrm_https" => matches!(self, CredentialKind::UsernamePassword),
            "http" | "https" => matches!(
                self,
                CredentialKind::ApiKey | CredentialKind::Token | CredentialKind::UsernamePassword
            ),
            _ => true,
        }
    }
}

/// Persisted, secret-free handle to a vault entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub id: CredentialId,
    pub name: String,
    pub kind: CredentialKind,
}

/// Decrypted secret material returned by the vault.
///
/// Deliberately does not derive `Debug`/`Serialize`: material must never
/// reach logs or step rows. The redacting [`std::fmt::Debug`] impl below
/// exists so containers holding secrets stay debuggable.
#[derive(Clone, Deserialize, Default)]
pub struct SecretMaterial {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// PEM-encoded private key.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("key_type", &self.key_type)
            .field("certificate", &self.certificate.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl SecretMaterial {
    /// All secret strings, for output redaction passes.
    pub fn secret_values(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for value in [
            self.password.as_deref(),
            self.private_key.as_deref(),
            self.passphrase.as_deref(),
            self.token.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !value.is_empty() {
                out.push(value);
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
