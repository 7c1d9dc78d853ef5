// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration from `OC_*` environment variables, resolved once
//! at startup and passed explicitly.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Data directory (lock file, logs default).
    pub data_dir: PathBuf,
    pub http_addr: SocketAddr,
    pub worker_hostname: String,
    /// Concurrent steps per worker process.
    pub prefetch: usize,
    pub poll_interval: Duration,
    pub scheduler_tick: Duration,
    pub max_db_connections: u32,
    /// External collaborators; absent means the feature degrades (no
    /// credentials, no registry targets, no notifications).
    pub vault_url: Option<String>,
    pub registry_url: Option<String>,
    pub notify_url: Option<String>,
    /// Run-completion notification destination, when configured.
    pub completion_channel: Option<String>,
    pub completion_destination: Option<String>,
    /// Log directory; None logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl DaemonConfig {
    /// Resolve from the environment with sensible defaults.
    pub fn from_env() -> Self {
        let data_dir = env_var("OC_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("opsconductor")
        });
        let db_path = env_var("OC_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("oc.db"));
        let worker_hostname = env_var("OC_WORKER_HOSTNAME")
            .or_else(|| env_var("HOSTNAME"))
            .unwrap_or_else(|| "oc-worker".to_string());

        Self {
            db_path,
            data_dir,
            http_addr: env_parse("OC_HTTP_ADDR", "127.0.0.1:8085".parse().unwrap_or(
                SocketAddr::from(([127, 0, 0, 1], 8085)),
            )),
            worker_hostname,
            prefetch: env_parse("OC_PREFETCH", 1),
            poll_interval: Duration::from_millis(env_parse("OC_POLL_INTERVAL_MS", 500)),
            scheduler_tick: Duration::from_secs(env_parse("OC_SCHEDULER_TICK_SECS", 30)),
            max_db_connections: env_parse("OC_MAX_DB_CONNECTIONS", 10),
            vault_url: env_var("OC_VAULT_URL"),
            registry_url: env_var("OC_REGISTRY_URL"),
            notify_url: env_var("OC_NOTIFY_URL"),
            completion_channel: env_var("OC_COMPLETION_NOTIFY_CHANNEL"),
            completion_destination: env_var("OC_COMPLETION_NOTIFY_DESTINATION"),
            log_dir: env_var("OC_LOG_DIR").map(PathBuf::from),
        }
    }

    /// Config rooted in a throwaway directory (tests, demos).
    pub fn ephemeral(dir: &std::path::Path) -> Self {
        Self {
            db_path: dir.join("oc.db"),
            data_dir: dir.to_path_buf(),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            worker_hostname: "oc-test-worker".to_string(),
            prefetch: 1,
            poll_interval: Duration::from_millis(50),
            scheduler_tick: Duration::from_millis(200),
            max_db_connections: 5,
            vault_url: None,
            registry_url: None,
            notify_url: None,
            completion_channel: None,
            completion_destination: None,
            log_dir: None,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
