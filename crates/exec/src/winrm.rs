// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WinRM drivers: winrm.exec, winrm.copy, windows.command.
//!
//! Speaks the WS-Man shell protocol (create shell → run command →
//! receive streams → cleanup) over plain HTTP(S) with Basic
//! authentication; NTLM/Kerberos negotiation is left to whatever
//! transport fronts the WinRM listener. Certificate validation is off by
//! default and configurable, matching the managed-endpoint reality.

use crate::command_builder::{generate_command, validate_command};
use crate::executor::{ExecFailure, StepContext, StepExecutor};
use async_trait::async_trait;
use base64::Engine as _;
use oc_core::step::{RemoteShell, StepPayload};
use oc_core::StepOutcome;
use std::time::Duration;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";
const MAX_RECEIVE_ROUNDS: usize = 200;

pub struct WinrmConfig {
    pub verify_certificates: bool,
    pub request_timeout: Duration,
}

impl Default for WinrmConfig {
    fn default() -> Self {
        Self { verify_certificates: false, request_timeout: Duration::from_secs(60) }
    }
}

pub struct WinrmExecutor {
    config: WinrmConfig,
}

impl WinrmExecutor {
    pub fn new() -> Self {
        Self::with_config(WinrmConfig::default())
    }

    pub fn with_config(config: WinrmConfig) -> Self {
        Self { config }
    }

    fn client(&self) -> Result<reqwest::Client, ExecFailure> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.config.verify_certificates)
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| ExecFailure::transient(format!("winrm client: {}", e)))
    }
}

impl Default for WinrmExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for WinrmExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
        let target = ctx.require_target()?;
        let secret = ctx.require_secret()?;

        let (command, shell, use_tls) = match &ctx.step.payload {
            StepPayload::WinrmExec { command, shell, use_tls } => {
                validate_command(command)?;
                (command.clone(), *shell, *use_tls)
            }
            StepPayload::WindowsCommand { command_type, parameters, use_tls } => {
                let generated = generate_command("windows", command_type, parameters)?;
                (generated, RemoteShell::Powershell, *use_tls)
            }
            StepPayload::WinrmCopy { dest_path, content_b64, use_tls } => {
                (copy_command(dest_path, content_b64), RemoteShell::Powershell, *use_tls)
            }
            other => {
                return Err(ExecFailure::validation(format!(
                    "winrm executor cannot handle {}",
                    other.type_tag()
                )))
            }
        };

        let scheme = if use_tls { "https" } else { "http" };
        let endpoint = format!(
            "{}://{}:{}/wsman",
            scheme,
            target.address(),
            target.winrm_port(use_tls)
        );
        let session = WsmanSession {
            client: self.client()?,
            endpoint,
            username: secret.username.clone(),
            password: secret.password.clone().unwrap_or_default(),
        };

        let (command_line, arguments) = match shell {
            // PowerShell goes encoded to dodge quoting pitfalls.
            RemoteShell::Powershell | RemoteShell::Sh | RemoteShell::Bash => (
                "powershell.exe".to_string(),
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-EncodedCommand".to_string(),
                    encode_powershell(&command),
                ],
            ),
            RemoteShell::Cmd => ("cmd.exe".to_string(), vec!["/c".to_string(), command.clone()]),
        };

        let shell_id = session.create_shell().await?;
        let result = async {
            let command_id = session.start_command(&shell_id, &command_line, &arguments).await?;
            session.receive_until_done(&shell_id, &command_id).await
        }
        .await;
        // Always try to tear the shell down, even after a failure.
        session.delete_shell(&shell_id).await;

        let received = result?;
        let mut outcome = if received.exit_code == 0 {
            StepOutcome::succeeded(received.stdout)
        } else {
            let mut failed = StepOutcome::failed(received.exit_code, received.stderr.clone());
            failed.stdout = received.stdout;
            failed
        };
        if outcome.stderr.is_empty() {
            outcome.stderr = received.stderr;
        }
        Ok(outcome.with_metric("shell_id", shell_id))
    }
}

/// PowerShell here-string writer for winrm.copy.
fn copy_command(dest_path: &str, content_b64: &str) -> String {
    format!(
        "$b64 = @'\n{}\n'@\n$bytes = [Convert]::FromBase64String($b64)\n\
         [IO.File]::WriteAllBytes('{}', $bytes)\nWrite-Output \"wrote {}\"",
        content_b64,
        dest_path.replace('\'', "''"),
        dest_path.replace('\'', "''"),
    )
}

/// UTF-16LE + base64, the encoding `-EncodedCommand` expects.
fn encode_powershell(script: &str) -> String {
    let mut bytes = Vec::with_capacity(script.len() * 2);
    for unit in script.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

struct Received {
    stdout: String,
    stderr: String,
    exit_code: i64,
}

struct WsmanSession {
    client: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
}

impl WsmanSession {
    async fn post(&self, envelope: String) -> Result<String, ExecFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .map_err(|e| ExecFailure::transient(format!("winrm request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExecFailure::transient(format!("winrm response body: {}", e)))?;
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ExecFailure::protocol("winrm authentication rejected"));
        }
        if !status.is_success() {
            let fault = find_tag(&body, "Text").unwrap_or_else(|| status.to_string());
            let failure = if status.is_server_error() {
                ExecFailure::transient(format!("winrm fault: {}", fault))
            } else {
                ExecFailure::protocol(format!("winrm fault: {}", fault))
            };
            return Err(failure);
        }
        Ok(body)
    }

    async fn create_shell(&self) -> Result<String, ExecFailure> {
        let body = self
            .post(envelope(
                &self.endpoint,
                "http://schemas.xmlsoap.org/ws/2004/09/transfer/Create",
                None,
                "<rsp:Shell xmlns:rsp=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell\">\
                 <rsp:InputStreams>stdin</rsp:InputStreams>\
                 <rsp:OutputStreams>stdout stderr</rsp:OutputStreams>\
                 </rsp:Shell>",
            ))
            .await?;
        find_tag(&body, "ShellId")
            .ok_or_else(|| ExecFailure::protocol("winrm create returned no ShellId"))
    }

    async fn start_command(
        &self,
        shell_id: &str,
        command: &str,
        arguments: &[String],
    ) -> Result<String, ExecFailure> {
        let mut args_xml = String::new();
        for argument in arguments {
            args_xml.push_str(&format!(
                "<rsp:Arguments>{}</rsp:Arguments>",
                xml_escape(argument)
            ));
        }
        let body = self
            .post(envelope(
                &self.endpoint,
                "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Command",
                Some(shell_id),
                &format!(
                    "<rsp:CommandLine \
                     xmlns:rsp=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell\">\
                     <rsp:Command>{}</rsp:Command>{}</rsp:CommandLine>",
                    xml_escape(command),
                    args_xml
                ),
            ))
            .await?;
        find_tag(&body, "CommandId")
            .ok_or_else(|| ExecFailure::protocol("winrm command returned no CommandId"))
    }

    async fn receive_until_done(
        &self,
        shell_id: &str,
        command_id: &str,
    ) -> Result<Received, ExecFailure> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for _ in 0..MAX_RECEIVE_ROUNDS {
            let body = self
                .post(envelope(
                    &self.endpoint,
                    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/Receive",
                    Some(shell_id),
                    &format!(
                        "<rsp:Receive \
                         xmlns:rsp=\"http://schemas.microsoft.com/wbem/wsman/1/windows/shell\">\
                         <rsp:DesiredStream CommandId=\"{}\">stdout stderr</rsp:DesiredStream>\
                         </rsp:Receive>",
                        command_id
                    ),
                ))
                .await?;

            for (name, chunk) in find_streams(&body) {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(chunk.trim())
                    .unwrap_or_default();
                match name.as_str() {
                    "stderr" => stderr.extend_from_slice(&decoded),
                    _ => stdout.extend_from_slice(&decoded),
                }
            }

            if body.contains("CommandState/Done") {
                let exit_code = find_tag(&body, "ExitCode")
                    .and_then(|c| c.trim().parse::<i64>().ok())
                    .unwrap_or(-1);
                return Ok(Received {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code,
                });
            }
        }
        Err(ExecFailure::transient("winrm receive never reached Done state"))
    }

    async fn delete_shell(&self, shell_id: &str) {
        let result = self
            .post(envelope(
                &self.endpoint,
                "http://schemas.xmlsoap.org/ws/2004/09/transfer/Delete",
                Some(shell_id),
                "",
            ))
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, shell_id, "winrm shell cleanup failed");
        }
    }
}

/// A WS-Man SOAP envelope with the standard addressing headers.
fn envelope(endpoint: &str, action: &str, shell_id: Option<&str>, body: &str) -> String {
    let selector = match shell_id {
        Some(id) => format!(
            "<w:SelectorSet><w:Selector Name=\"ShellId\">{}</w:Selector></w:SelectorSet>",
            id
        ),
        None => String::new(),
    };
    format!(
        "<s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\" \
         xmlns:a=\"http://schemas.xmlsoap.org/ws/2004/08/addressing\" \
         xmlns:w=\"http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd\">\
         <s:Header>\
         <a:To>{}</a:To>\
         <a:ReplyTo><a:Address s:mustUnderstand=\"true\">\
         http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous\
         </a:Address></a:ReplyTo>\
         <w:ResourceURI s:mustUnderstand=\"true\">\
         http://schemas.microsoft.com/wbem/wsman/1/windows/shell/cmd\
         </w:ResourceURI>\
         <a:Action s:mustUnderstand=\"true\">{}</a:Action>\
         <w:MaxEnvelopeSize s:mustUnderstand=\"true\">153600</w:MaxEnvelopeSize>\
         <a:MessageID>uuid:{}</a:MessageID>\
         <w:OperationTimeout>PT60S</w:OperationTimeout>\
         {}\
         </s:Header>\
         <s:Body>{}</s:Body>\
         </s:Envelope>",
        xml_escape(endpoint),
        action,
        uuid::Uuid::new_v4(),
        selector,
        body
    )
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Extract the text of the first element with the given local name,
/// tolerating any namespace prefix.
pub(crate) fn find_tag(xml: &str, local: &str) -> Option<String> {
    let mut search = 0;
    while let Some(offset) = xml[search..].find('<') {
        let start = search + offset;
        let rest = &xml[start + 1..];
        let close = rest.find('>')?;
        let tag = &rest[..close];
        if !tag.starts_with('/') {
            let name = tag.split_whitespace().next().unwrap_or("");
            let name = name.trim_end_matches('/');
            let matches_local =
                name == local || name.rsplit(':').next().is_some_and(|n| n == local);
            if matches_local && !tag.ends_with('/') {
                let content_start = start + 1 + close + 1;
                let end = xml[content_start..].find("</")?;
                return Some(xml[content_start..content_start + end].to_string());
            }
        }
        search = start + 1;
    }
    None
}

/// Collect `(Name, base64)` pairs from every Stream element.
pub(crate) fn find_streams(xml: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut search = 0;
    while let Some(offset) = xml[search..].find("Stream ") {
        let tag_start = search + offset;
        let Some(tag_end_rel) = xml[tag_start..].find('>') else { break };
        let tag = &xml[tag_start..tag_start + tag_end_rel];
        let name = tag
            .split("Name=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap_or("stdout")
            .to_string();
        let content_start = tag_start + tag_end_rel + 1;
        if tag.ends_with('/') {
            search = content_start;
            continue;
        }
        let Some(end_rel) = xml[content_start..].find("</") else { break };
        out.push((name, xml[content_start..content_start + end_rel].to_string()));
        search = content_start + end_rel;
    }
    out
}

#[cfg(test)]
#[path = "winrm_tests.rs"]
mod tests;
