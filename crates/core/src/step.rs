// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JobRunStep: one executable unit within a run, plus the typed payloads
//! the translator materializes for each node type.

use crate::retry::RetryPolicy;
use crate::run::RunId;
use crate::target::TargetId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

crate::define_id! {
    /// Unique identifier for a job run step.
    pub struct StepId("stp-");
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Aborted,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Queued | StepStatus::Running)
    }
}

crate::simple_display! {
    StepStatus {
        Queued => "queued",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Aborted => "aborted",
        Skipped => "skipped",
    }
}

crate::parse_kind! {
    StepStatus {
        "queued" => Queued,
        "running" => Running,
        "succeeded" => Succeeded,
        "failed" => Failed,
        "aborted" => Aborted,
        "skipped" => Skipped,
    }
}

/// Result status an executor is allowed to report.
///
/// The worker framework maps this onto [`StepStatus`]; executors never
/// touch the step row themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResultStatus {
    Succeeded,
    Failed,
    /// Declined to act (e.g. a notification whose `send_on` filter did not
    /// match). Not a failure.
    Skipped,
}

crate::simple_display! {
    StepResultStatus {
        Succeeded => "succeeded",
        Failed => "failed",
        Skipped => "skipped",
    }
}

/// Uniform executor result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepResultStatus,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl StepOutcome {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            status: StepResultStatus::Succeeded,
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            metrics: serde_json::Map::new(),
        }
    }

    pub fn failed(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            status: StepResultStatus::Failed,
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            metrics: serde_json::Map::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StepResultStatus::Skipped,
            exit_code: 0,
            stdout: reason.into(),
            stderr: String::new(),
            metrics: serde_json::Map::new(),
        }
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

crate::simple_display! {
    HttpMethod {
        Get => "GET",
        Post => "POST",
        Put => "PUT",
        Delete => "DELETE",
        Patch => "PATCH",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    #[default]
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemoteShell {
    #[default]
    Sh,
    Bash,
    Powershell,
    Cmd,
}

/// Authentication for HTTP-family steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum HttpAuth {
    Basic { username: String, password: String },
    Bearer { token: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    #[default]
    Email,
    Slack,
    Teams,
    Webhook,
}

crate::simple_display! {
    NotifyChannel {
        Email => "email",
        Slack => "slack",
        Teams => "teams",
        Webhook => "webhook",
    }
}

/// When a notification step actually sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SendOn {
    #[default]
    Always,
    Success,
    Failure,
}

/// Typed per-node-type payload the translator materializes. All
/// strings are fully
/// rendered — executors perform no further templating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    SshExec {
        command: String,
        #[serde(default)]
        shell: RemoteShell,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_directory: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        environment: BTreeMap<String, String>,
    },
    SshCopy {
        source_path: String,
        dest_path: String,
        #[serde(default)]
        direction: TransferDirection,
        #[serde(default = "default_true")]
        overwrite: bool,
    },
    SftpUpload {
        source_path: String,
        dest_path: String,
        #[serde(default = "default_true")]
        overwrite: bool,
        #[serde(default = "default_true")]
        preserve_permissions: bool,
    },
    SftpDownload {
        remote_path: String,
        local_path: String,
        #[serde(default = "default_true")]
        overwrite: bool,
    },
    SftpSync {
        source_dir: String,
        dest_dir: String,
        #[serde(default)]
        direction: TransferDirection,
        #[serde(default = "default_true")]
        recursive: bool,
        #[serde(default = "default_true")]
        preserve_permissions: bool,
        #[serde(default)]
        preserve_times: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        include: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<String>,
    },
    Script {
        body: String,
        interpreter: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_directory: Option<String>,
    },
    WinrmExec {
        command: String,
        #[serde(default)]
        shell: RemoteShell,
        #[serde(default)]
        use_tls: bool,
    },
    WinrmCopy {
        dest_path: String,
        /// File content, base64-encoded by the translator.
        content_b64: String,
        #[serde(default)]
        use_tls: bool,
    },
    WindowsCommand {
        command_type: String,
        #[serde(default)]
        parameters: serde_json::Map<String, serde_json::Value>,
        #[serde(default)]
        use_tls: bool,
    },
    Http {
        method: HttpMethod,
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<HttpAuth>,
        #[serde(default = "default_true")]
        verify_ssl: bool,
        #[serde(default = "default_true")]
        follow_redirects: bool,
        /// Success = response status ∈ this set.
        #[serde(default = "default_expected_status")]
        expected_status: Vec<u16>,
    },
    Webhook {
        url: String,
        payload: serde_json::Value,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        /// HMAC-SHA256 signing secret; never echoed into metrics.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
        #[serde(default)]
        retry_count: u32,
        #[serde(default = "default_one")]
        retry_delay_secs: u64,
    },
    Database {
        connection_string: String,
        query: String,
        #[serde(default = "default_true")]
        fetch_results: bool,
    },
    Notify {
        channel: NotifyChannel,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        recipients: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        body: String,
        #[serde(default = "default_priority")]
        priority: String,
        #[serde(default)]
        send_on: SendOn,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dedupe_key: Option<String>,
    },
    NotifyConditional {
        /// Boolean template expression evaluated against the notification
        /// context at execution time.
        condition: String,
        inner: Box<StepPayload>,
    },
    Condition {
        expression: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        true_branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        false_branch: Option<String>,
    },
    WhileLoop {
        expression: String,
        max_iterations: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    ForEachLoop {
        items: serde_json::Value,
        item_variable: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    Decision {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        branches: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_branch: Option<String>,
    },
    Parallel {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        branches: Vec<String>,
        #[serde(default = "default_true")]
        wait_for_all: bool,
        #[serde(default = "default_max_concurrent")]
        max_concurrent: u32,
    },
    DataTransform {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_data: Option<serde_json::Value>,
        transformation_type: String,
        #[serde(default)]
        script: String,
        #[serde(default = "default_json_format")]
        output_format: String,
    },
    DataValidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_data: Option<serde_json::Value>,
        rules: serde_json::Value,
        #[serde(default = "default_true")]
        fail_on_error: bool,
    },
}

fn default_true() -> bool {
    true
}

fn default_one() -> u64 {
    1
}

fn default_priority() -> String {
    "normal".to_string()
}

fn default_max_concurrent() -> u32 {
    5
}

fn default_json_format() -> String {
    "json".to_string()
}

fn default_expected_status() -> Vec<u16> {
    vec![200, 201, 202, 204]
}

impl StepPayload {
    /// Executor-registry key for this payload.
    pub fn type_tag(&self) -> &'static str {
        match self {
            StepPayload::SshExec { .. } => "ssh.exec",
            StepPayload::SshCopy { .. } => "ssh.copy",
            StepPayload::SftpUpload { .. } => "sftp.upload",
            StepPayload::SftpDownload { .. } => "sftp.download",
            StepPayload::SftpSync { .. } => "sftp.sync",
            StepPayload::Script { .. } => "script",
            StepPayload::WinrmExec { .. } => "winrm.exec",
            StepPayload::WinrmCopy { .. } => "winrm.copy",
            StepPayload::WindowsCommand { .. } => "windows.command",
            StepPayload::Http { method, .. } => match method {
                HttpMethod::Get => "http.get",
                HttpMethod::Post => "http.post",
                HttpMethod::Put => "http.put",
                HttpMethod::Delete => "http.delete",
                HttpMethod::Patch => "http.patch",
            },
            StepPayload::Webhook { .. } => "webhook.call",
            StepPayload::Database { .. } => "database",
            StepPayload::Notify { channel, .. } => match channel {
                NotifyChannel::Email => "notify.email",
                NotifyChannel::Slack => "notify.slack",
                NotifyChannel::Teams => "notify.teams",
                NotifyChannel::Webhook => "notify.webhook",
            },
            StepPayload::NotifyConditional { .. } => "notify.conditional",
            StepPayload::Condition { .. } => "condition",
            StepPayload::WhileLoop { .. } | StepPayload::ForEachLoop { .. } => "loop",
            StepPayload::Decision { .. } => "decision",
            StepPayload::Parallel { .. } => "parallel",
            StepPayload::DataTransform { .. } => "data.transform",
            StepPayload::DataValidate { .. } => "data.validate",
        }
    }

    /// Whether the executor family for this payload talks to the network.
    /// Used by the retry controller to classify connection errors.
    pub fn is_remote(&self) -> bool {
        !matches!(
            self,
            StepPayload::Condition { .. }
                | StepPayload::WhileLoop { .. }
                | StepPayload::ForEachLoop { .. }
                | StepPayload::Decision { .. }
                | StepPayload::Parallel { .. }
                | StepPayload::DataTransform { .. }
                | StepPayload::DataValidate { .. }
        )
    }
}

/// Translator output: one ordered, fully-rendered executable step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Node id this step was materialized from (stable within the graph).
    pub node_id: String,
    /// Dense 0..N−1 position within the run.
    pub index: u32,
    pub payload: StepPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    /// Rendered hostname kept for diagnostics when resolution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,
    /// Credential name hint for the resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_hint: Option<String>,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl ExecutionStep {
    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }
}

/// Persisted form of a step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRunStep {
    pub id: StepId,
    pub run_id: RunId,
    pub index: u32,
    pub step_type: String,
    pub payload: StepPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_hint: Option<String>,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    #[serde(default)]
    pub continue_on_failure: bool,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Worker hostname + monotonic stamp; null unless currently leased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_token: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Earliest epoch-ms this step may be leased (retry backoff).
    #[serde(default)]
    pub eta_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl JobRunStep {
    /// Build the persisted row for a freshly materialized execution step.
    pub fn from_execution(run_id: &RunId, step: ExecutionStep) -> Self {
        Self {
            id: StepId::fresh(),
            run_id: run_id.clone(),
            index: step.index,
            step_type: step.payload.type_tag().to_string(),
            payload: step.payload,
            target_id: step.target_id,
            target_host: step.target_host,
            credential_hint: step.credential_hint,
            timeout_secs: step.timeout_secs,
            retry: step.retry,
            continue_on_failure: step.continue_on_failure,
            status: StepStatus::Queued,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            lease_token: None,
            retry_count: 0,
            eta_ms: 0,
            started_at_ms: None,
            finished_at_ms: None,
            metrics: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
