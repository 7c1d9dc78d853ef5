// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon assembly and lifecycle: build the engine stack, run the
//! startup orphan sweep, spawn the loops, serve HTTP, drain on shutdown.

use crate::config::DaemonConfig;
use crate::state::AppState;
use crate::worker;
use fs2::FileExt;
use oc_core::SystemClock;
use oc_engine::{
    CancelRegistry, CompletionNotifier, CompletionNotifyConfig, Dispatcher, DispatcherConfig,
    Janitor, JanitorConfig, Monitor, MonitorConfig, Orchestrator, Scheduler, SchedulerConfig,
    StaticTargets, StatusBus, TargetSource,
};
use oc_exec::{
    CredentialsResolver, ExecutorRegistry, NotificationClient, TargetRegistryClient, VaultClient,
};
use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("another daemon instance holds the lock at {0}")]
    AlreadyRunning(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] oc_store::StoreError),
    #[error("client setup failed: {0}")]
    Client(String),
}

/// A running daemon: the bound HTTP address plus the shutdown handle.
pub struct DaemonHandle {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    loops: Vec<tokio::task::JoinHandle<()>>,
    _lock: File,
}

impl DaemonHandle {
    /// Signal shutdown and wait for every loop to drain.
    pub async fn stop(self) {
        self.shutdown.cancel();
        for handle in self.loops {
            let _ = handle.await;
        }
        let _ = self.server.await;
    }
}

pub struct Daemon {
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        Self { config }
    }

    /// Bring the whole stack up. Returns once the HTTP listener is
    /// bound; the loops keep running until the handle is stopped.
    pub async fn start(self) -> Result<DaemonHandle, DaemonError> {
        let config = self.config;
        std::fs::create_dir_all(&config.data_dir)?;

        // Single instance per data dir.
        let lock_path = config.data_dir.join("ocd.lock");
        let lock = File::create(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| DaemonError::AlreadyRunning(lock_path.display().to_string()))?;

        let store =
            oc_store::Store::open_with(&config.db_path, config.max_db_connections).await?;
        let bus = StatusBus::default();
        let clock = SystemClock;
        let cancels = CancelRegistry::new();

        // External collaborators, degrading gracefully when unset.
        let targets: Arc<dyn TargetSource> = match &config.registry_url {
            Some(url) => Arc::new(
                TargetRegistryClient::new(url.clone())
                    .map_err(|e| DaemonError::Client(e.to_string()))?,
            ),
            None => Arc::new(StaticTargets::default()),
        };
        let credentials = match &config.vault_url {
            Some(url) => Some(Arc::new(CredentialsResolver::new(
                VaultClient::new(url.clone()).map_err(|e| DaemonError::Client(e.to_string()))?,
            ))),
            None => None,
        };
        let notification_client = match &config.notify_url {
            Some(url) => Some(Arc::new(
                NotificationClient::new(url.clone())
                    .map_err(|e| DaemonError::Client(e.to_string()))?,
            )),
            None => None,
        };
        let completion = match (&notification_client, &config.completion_channel,
            &config.completion_destination)
        {
            (Some(client), Some(channel), Some(destination)) => CompletionNotifier::new(
                client.clone(),
                CompletionNotifyConfig {
                    channel: channel.clone(),
                    destination: destination.clone(),
                    send_on: oc_core::SendOn::Always,
                },
            ),
            _ => CompletionNotifier::disabled(),
        };

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            bus.clone(),
            targets.clone(),
            cancels.clone(),
            clock.clone(),
        ));

        let registry = match &notification_client {
            Some(client) => ExecutorRegistry::standard(client.clone()),
            None => {
                // Without a notification service, notify steps fail with
                // a clear transient error instead of silently passing.
                let fallback = NotificationClient::new("http://127.0.0.1:1")
                    .map_err(|e| DaemonError::Client(e.to_string()))?;
                ExecutorRegistry::standard(Arc::new(fallback))
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            registry,
            bus.clone(),
            targets,
            credentials,
            cancels.clone(),
            completion,
            clock.clone(),
            DispatcherConfig {
                worker_hostname: config.worker_hostname.clone(),
                poll_interval: config.poll_interval,
                prefetch: config.prefetch,
            },
        ));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            orchestrator.clone(),
            clock.clone(),
            SchedulerConfig { tick_interval: config.scheduler_tick },
        ));
        let janitor = Arc::new(Janitor::new(
            store.clone(),
            bus.clone(),
            clock.clone(),
            JanitorConfig::default(),
        ));
        let monitor = Arc::new(Monitor::new(
            store.clone(),
            bus.clone(),
            clock.clone(),
            MonitorConfig::default(),
        ));

        // Startup sweep: recover steps stranded by a previous crash.
        let recovered = janitor.sweep().await.unwrap_or_default();
        if !recovered.is_empty() {
            tracing::warn!(count = recovered.len(), "recovered orphaned steps at startup");
        }

        let shutdown = CancellationToken::new();
        let mut loops = Vec::new();
        loops.push(tokio::spawn(dispatcher.run_loop(shutdown.clone())));
        loops.push(tokio::spawn(scheduler.run_loop(shutdown.clone())));
        loops.push(tokio::spawn(janitor.run_loop(shutdown.clone())));
        loops.push(tokio::spawn(monitor.run_loop(shutdown.clone())));
        loops.push(tokio::spawn(worker::heartbeat_loop(
            store.clone(),
            config.worker_hostname.clone(),
            cancels.clone(),
            shutdown.clone(),
        )));

        let state = AppState {
            store,
            orchestrator,
            bus,
            clock,
            worker_hostname: config.worker_hostname.clone(),
        };
        let router = crate::http::router(state);
        let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, worker = %config.worker_hostname, "daemon listening");

        let server_shutdown = shutdown.clone();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with error");
            }
        });

        Ok(DaemonHandle { addr, shutdown, server, loops, _lock: lock })
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
