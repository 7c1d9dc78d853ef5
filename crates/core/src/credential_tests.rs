// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn material() -> SecretMaterial {
    SecretMaterial {
        username: "ops".to_string(),
        password: Some("hunter2".to_string()),
        private_key: Some("-----BEGIN KEY-----".to_string()),
        passphrase: None,
        key_type: Some("ed25519".to_string()),
        certificate: None,
        token: Some("tok-abc".to_string()),
    }
}

#[test]
fn debug_never_prints_secret_values() {
    let debug = format!("{:?}", material());
    assert!(!debug.contains("hunter2"));
    assert!(!debug.contains("BEGIN KEY"));
    assert!(!debug.contains("tok-abc"));
    assert!(debug.contains("<redacted>"));
    assert!(debug.contains("ops"));
}

#[test]
fn secret_values_collects_all_non_empty() {
    let m = material();
    let values = m.secret_values();
    assert_eq!(values.len(), 3);
    assert!(values.contains(&"hunter2"));

    let empty = SecretMaterial::default();
    assert!(empty.secret_values().is_empty());
}

#[test]
fn kind_suits_service() {
    assert!(CredentialKind::SshKey.suits_service("ssh"));
    assert!(!CredentialKind::SshKey.suits_service("winrm"));
    assert!(CredentialKind::UsernamePassword.suits_service("winrm"));
    assert!(CredentialKind::ApiKey.suits_service("http"));
    assert!(CredentialKind::Certificate.suits_service("custom"));
}

#[test]
fn vault_response_deserializes() {
    let material: SecretMaterial = serde_json::from_value(serde_json::json!({
        "username": "ops",
        "password": "pw",
        "key_type": "rsa"
    }))
    .unwrap();
    assert_eq!(material.username, "ops");
    assert_eq!(material.password.as_deref(), Some("pw"));
    assert!(material.private_key.is_none());
}
