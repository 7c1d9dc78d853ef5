// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for other crates' tests (behind `test-support`).

use crate::clock::FakeClock;
use crate::step::{ExecutionStep, RemoteShell, StepPayload};
use std::collections::BTreeMap;

/// A fake clock pinned to a known epoch so rendered timestamps are stable.
pub fn fixed_clock() -> FakeClock {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_750_000_000_000);
    clock
}

/// A minimal ssh.exec execution step for queue/engine tests.
pub fn ssh_exec_step(index: u32, command: &str) -> ExecutionStep {
    ExecutionStep {
        node_id: format!("node-{}", index),
        index,
        payload: StepPayload::SshExec {
            command: command.to_string(),
            shell: RemoteShell::Sh,
            working_directory: None,
            environment: BTreeMap::new(),
        },
        target_id: None,
        target_host: Some("linux-01.example.net".to_string()),
        credential_hint: None,
        timeout_secs: 60,
        retry: crate::retry::RetryPolicy::default(),
        continue_on_failure: false,
    }
}
