// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background monitor: diff-polls the store for queue, worker, and
//! aggregate health, emitting to the corresponding topics only when a
//! sample changed.

use crate::bus::StatusBus;
use crate::EngineError;
use oc_core::{Clock, StatusEvent, WorkerHealthEntry, DEFAULT_LIVENESS_WINDOW_SECS};
use oc_store::Store;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct MonitorConfig {
    pub queue_interval: Duration,
    pub worker_interval: Duration,
    pub system_interval: Duration,
    pub liveness_window_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            queue_interval: Duration::from_secs(5),
            worker_interval: Duration::from_secs(10),
            system_interval: Duration::from_secs(15),
            liveness_window_secs: DEFAULT_LIVENESS_WINDOW_SECS,
        }
    }
}

#[derive(Default)]
struct LastSamples {
    queue: Option<(u64, u64, u64)>,
    workers: Option<Vec<WorkerHealthEntry>>,
    system: Option<(u64, u64, u64)>,
}

pub struct Monitor<C: Clock> {
    store: Store,
    bus: StatusBus,
    clock: C,
    config: MonitorConfig,
    last: Mutex<LastSamples>,
}

impl<C: Clock> Monitor<C> {
    pub fn new(store: Store, bus: StatusBus, clock: C, config: MonitorConfig) -> Self {
        Self { store, bus, clock, config, last: Mutex::new(LastSamples::default()) }
    }

    pub async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut queue_tick = tokio::time::interval(self.config.queue_interval);
        let mut worker_tick = tokio::time::interval(self.config.worker_interval);
        let mut system_tick = tokio::time::interval(self.config.system_interval);
        loop {
            let result = tokio::select! {
                _ = queue_tick.tick() => self.sample_queues().await,
                _ = worker_tick.tick() => self.sample_workers().await,
                _ = system_tick.tick() => self.sample_system().await,
                () = shutdown.cancelled() => break,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "monitor sample failed");
            }
        }
    }

    /// Queue depth per priority class; emits only on change.
    pub async fn sample_queues(&self) -> Result<bool, EngineError> {
        let depths = self.store.queue_depths().await?;
        let changed = self.last.lock().queue.replace(depths) != Some(depths);
        if changed {
            let (high, normal, low) = depths;
            self.bus.publish(StatusEvent::QueueDepth {
                high,
                normal,
                low,
                timestamp_ms: self.clock.epoch_ms(),
            });
        }
        Ok(changed)
    }

    pub async fn sample_workers(&self) -> Result<bool, EngineError> {
        let now = self.clock.epoch_ms();
        let entries: Vec<WorkerHealthEntry> = self
            .store
            .list_workers()
            .await?
            .into_iter()
            .map(|w| WorkerHealthEntry {
                alive: w.is_alive(now, self.config.liveness_window_secs),
                hostname: w.hostname,
                active_tasks: w.active_task_count,
                last_heartbeat_ms: w.last_heartbeat_ms,
            })
            .collect();
        let changed = {
            let mut last = self.last.lock();
            let changed = last.workers.as_ref() != Some(&entries);
            last.workers = Some(entries.clone());
            changed
        };
        if changed {
            self.bus.publish(StatusEvent::WorkerHealth { workers: entries, timestamp_ms: now });
        }
        Ok(changed)
    }

    pub async fn sample_system(&self) -> Result<bool, EngineError> {
        let now = self.clock.epoch_ms();
        let active_runs = self.store.count_active_runs().await?;
        let queued_steps = self.store.count_queued_steps().await?;
        let alive_workers = self
            .store
            .list_workers()
            .await?
            .iter()
            .filter(|w| w.is_alive(now, self.config.liveness_window_secs))
            .count() as u64;
        let sample = (active_runs, queued_steps, alive_workers);
        let changed = self.last.lock().system.replace(sample) != Some(sample);
        if changed {
            self.bus.publish(StatusEvent::SystemHealth {
                active_runs,
                queued_steps,
                alive_workers,
                timestamp_ms: now,
            });
        }
        Ok(changed)
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
