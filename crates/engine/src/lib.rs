// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oc-engine: run orchestration, fair dispatch, scheduling, the
//! live-status fan-out, and the retry/cancellation controller, all
//! cooperating through the shared store.

pub mod bus;
pub mod completion;
pub mod context;
pub mod dispatcher;
pub mod janitor;
pub mod monitor;
pub mod orchestrator;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_util;

use thiserror::Error;

pub use bus::StatusBus;
pub use completion::{CompletionNotifier, CompletionNotifyConfig};
pub use context::build_job_context;
pub use dispatcher::{CancelRegistry, Dispatcher, DispatcherConfig};
pub use janitor::{Janitor, JanitorConfig};
pub use monitor::{Monitor, MonitorConfig};
pub use orchestrator::{Orchestrator, RunRequest, StaticTargets, TargetSource};
pub use scheduler::{validate_cron_expression, Scheduler, SchedulerConfig};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(oc_store::StoreError),
    #[error("translation: {0}")]
    Translate(#[from] oc_workflow::TranslateError),
}

impl From<oc_store::StoreError> for EngineError {
    fn from(e: oc_store::StoreError) -> Self {
        match e {
            oc_store::StoreError::NotFound(what) => EngineError::NotFound(what),
            oc_store::StoreError::Conflict(what) => EngineError::Conflict(what),
            oc_store::StoreError::RunTerminal => {
                EngineError::Conflict("run already terminal".to_string())
            }
            other => EngineError::Store(other),
        }
    }
}
