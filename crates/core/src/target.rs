// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target: a managed endpoint from the external asset registry.
//!
//! The core holds only the fields it consumes; the registry remains the
//! source of truth.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a managed endpoint.
    pub struct TargetId("tgt-");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// OS family hint (linux, windows, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Service hint: ssh, winrm, winrm_https, http, snmp, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// WinRM management ports; seeing one on an SSH step means the target row
/// was registered for the wrong protocol.
const WINRM_PORTS: [u16; 2] = [5985, 5986];

impl Target {
    /// Address preference: explicit IP beats hostname.
    pub fn address(&self) -> &str {
        match self.ip_address.as_deref() {
            Some(ip) if !ip.is_empty() => ip,
            _ => &self.hostname,
        }
    }

    /// SSH port for this target. WinRM ports stored on an SSH target are
    /// treated as misconfiguration and fall back to 22.
    pub fn ssh_port(&self) -> u16 {
        match self.port {
            Some(p) if p != 0 && !WINRM_PORTS.contains(&p) => p,
            _ => 22,
        }
    }

    /// WinRM port, honoring an explicit override when it is a WinRM port.
    pub fn winrm_port(&self, use_tls: bool) -> u16 {
        match self.port {
            Some(p) if WINRM_PORTS.contains(&p) => p,
            _ => {
                if use_tls {
                    5986
                } else {
                    5985
                }
            }
        }
    }
}

crate::builder! {
    pub struct TargetBuilder => Target {
        into {
            name: String = "linux-01",
            hostname: String = "linux-01.example.net",
        }
        set {
            is_active: bool = true,
        }
        option {
            ip_address: String = None,
            port: u16 = None,
            os_type: String = Some("linux".to_string()),
            device_type: String = None,
            service_type: String = Some("ssh".to_string()),
        }
        computed {
            id: TargetId = TargetId::fresh(),
        }
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
