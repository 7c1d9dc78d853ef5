// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oc-core: Core domain types for the OpsConductor job execution subsystem

pub mod macros;

pub mod clock;
pub mod credential;
pub mod event;
pub mod id;
pub mod identity;
pub mod job;
pub mod retry;
pub mod run;
pub mod schedule;
pub mod step;
pub mod target;
pub mod time_fmt;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use credential::{CredentialId, CredentialKind, CredentialRef, SecretMaterial};
pub use event::{StatusEvent, Topic, WorkerHealthEntry};
pub use id::{short, IdBuf};
pub use identity::Identity;
pub use job::{Job, JobId};
pub use retry::{backoff_delay, FailureKind, RetryPolicy};
pub use run::{
    aggregate_run_status, CorrelationId, JobRun, RunId, RunPriority, RunResultData, RunStatus,
    RunTrigger, StepSummary,
};
pub use schedule::{Schedule, ScheduleId, ScheduleKind};
pub use step::{
    ExecutionStep, HttpAuth, HttpMethod, JobRunStep, NotifyChannel, RemoteShell, SendOn, StepId,
    StepOutcome, StepPayload, StepResultStatus, StepStatus, TransferDirection,
};
pub use target::{Target, TargetId};
pub use time_fmt::{format_elapsed_ms, format_epoch_ms};
pub use worker::{WorkerRegistration, DEFAULT_LIVENESS_WINDOW_SECS};
