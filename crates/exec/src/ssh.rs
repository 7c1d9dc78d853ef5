// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH family drivers: ssh.exec, ssh.copy, script, and the SFTP
//! transfers (upload, download, sync).
//!
//! libssh2 is a blocking library; every session runs inside
//! `spawn_blocking` with the step timeout applied both to the TCP
//! connect and to libssh2 operations, keeping the async runtime clear
//! of blocking protocol work.

use crate::command_builder::{shell_quote, validate_command};
use crate::executor::{ExecFailure, StepContext, StepExecutor};
use async_trait::async_trait;
use glob::Pattern;
use oc_core::step::{RemoteShell, StepPayload, TransferDirection};
use oc_core::{SecretMaterial, StepOutcome, Target};
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct SshExecutor;

impl SshExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for SshExecutor {
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome, ExecFailure> {
        let target = ctx.require_target()?.clone();
        let secret = ctx.require_secret()?.clone();
        let payload = ctx.step.payload.clone();
        let timeout = Duration::from_secs(ctx.step.timeout_secs.max(1));
        let cancel = ctx.cancel.clone();

        tokio::task::spawn_blocking(move || {
            let session = connect(&target, &secret, timeout)?;
            match payload {
                StepPayload::SshExec { command, shell, working_directory, environment } => {
                    validate_command(&command)?;
                    let full = compose_command(&command, shell, working_directory.as_deref(),
                        &environment);
                    run_command(&session, &full, None)
                }
                StepPayload::Script { body, interpreter, args, working_directory } => {
                    validate_command(&body)?;
                    let mut invocation = shell_quote(&interpreter);
                    if !args.is_empty() {
                        invocation.push_str(" -s");
                        for arg in &args {
                            invocation.push(' ');
                            invocation.push_str(&shell_quote(arg));
                        }
                    }
                    if let Some(dir) = working_directory.as_deref() {
                        invocation = format!("cd {} && {}", shell_quote(dir), invocation);
                    }
                    run_command(&session, &invocation, Some(body.as_bytes()))
                }
                StepPayload::SshCopy { source_path, dest_path, direction, overwrite } => {
                    scp_copy(&session, &source_path, &dest_path, direction, overwrite)
                }
                StepPayload::SftpUpload { source_path, dest_path, overwrite,
                    preserve_permissions } => {
                    sftp_upload(&session, &source_path, &dest_path, overwrite,
                        preserve_permissions)
                }
                StepPayload::SftpDownload { remote_path, local_path, overwrite } => {
                    sftp_download(&session, &remote_path, &local_path, overwrite)
                }
                StepPayload::SftpSync {
                    source_dir,
                    dest_dir,
                    direction,
                    recursive,
                    preserve_permissions,
                    preserve_times,
                    include,
                    exclude,
                } => {
                    let options = SyncOptions {
                        recursive,
                        preserve_permissions,
                        preserve_times,
                        include: compile_globs(&include)?,
                        exclude: compile_globs(&exclude)?,
                        cancel,
                    };
                    match direction {
                        TransferDirection::Upload => {
                            sftp_sync_up(&session, &source_dir, &dest_dir, &options)
                        }
                        TransferDirection::Download => {
                            sftp_sync_down(&session, &source_dir, &dest_dir, &options)
                        }
                    }
                }
                other => Err(ExecFailure::validation(format!(
                    "ssh executor cannot handle {}",
                    other.type_tag()
                ))),
            }
        })
        .await
        .map_err(|e| ExecFailure::transient(format!("ssh task aborted: {}", e)))?
    }
}

/// Connect and authenticate: private key first when present, else
/// password.
fn connect(
    target: &Target,
    secret: &SecretMaterial,
    timeout: Duration,
) -> Result<Session, ExecFailure> {
    let port = target.ssh_port();
    let address = (target.address(), port)
        .to_socket_addrs()
        .map_err(|e| ExecFailure::transient(format!("resolve {}: {}", target.address(), e)))?
        .next()
        .ok_or_else(|| {
            ExecFailure::transient(format!("no address for {}", target.address()))
        })?;
    let connect_timeout = timeout.min(Duration::from_secs(10));
    let tcp = TcpStream::connect_timeout(&address, connect_timeout)
        .map_err(|e| ExecFailure::transient(format!("connect {}: {}", address, e)))?;

    let mut session =
        Session::new().map_err(|e| ExecFailure::transient(format!("ssh session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    session
        .handshake()
        .map_err(|e| ExecFailure::transient(format!("ssh handshake: {}", e)))?;

    let username = if secret.username.is_empty() { "root" } else { &secret.username };
    if let Some(key) = secret.private_key.as_deref() {
        session
            .userauth_pubkey_memory(username, None, key, secret.passphrase.as_deref())
            .map_err(|e| ExecFailure::protocol(format!("ssh key auth failed: {}", e)))?;
    } else if let Some(password) = secret.password.as_deref() {
        session
            .userauth_password(username, password)
            .map_err(|e| ExecFailure::protocol(format!("ssh password auth failed: {}", e)))?;
    } else {
        return Err(ExecFailure::validation("credential carries neither key nor password"));
    }
    Ok(session)
}

fn compose_command(
    command: &str,
    shell: RemoteShell,
    working_directory: Option<&str>,
    environment: &std::collections::BTreeMap<String, String>,
) -> String {
    let mut prefix = String::new();
    if let Some(dir) = working_directory {
        prefix.push_str(&format!("cd {} && ", shell_quote(dir)));
    }
    for (key, value) in environment {
        prefix.push_str(&format!("export {}={} && ", key, shell_quote(value)));
    }
    let shell_bin = match shell {
        RemoteShell::Bash => "bash -c",
        _ => "sh -c",
    };
    format!("{}{} {}", prefix, shell_bin, shell_quote(command))
}

/// Exec a command, optionally feeding stdin, and collect the uniform result.
fn run_command(
    session: &Session,
    command: &str,
    stdin: Option<&[u8]>,
) -> Result<StepOutcome, ExecFailure> {
    let mut channel = session
        .channel_session()
        .map_err(|e| ExecFailure::transient(format!("ssh channel: {}", e)))?;
    channel.exec(command).map_err(|e| ExecFailure::transient(format!("ssh exec: {}", e)))?;

    if let Some(data) = stdin {
        channel
            .write_all(data)
            .map_err(|e| ExecFailure::transient(format!("ssh stdin: {}", e)))?;
        channel
            .send_eof()
            .map_err(|e| ExecFailure::transient(format!("ssh stdin: {}", e)))?;
    }

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| ExecFailure::transient(format!("ssh stdout: {}", e)))?;
    let mut stderr = String::new();
    channel
        .stderr()
        .read_to_string(&mut stderr)
        .map_err(|e| ExecFailure::transient(format!("ssh stderr: {}", e)))?;
    channel
        .wait_close()
        .map_err(|e| ExecFailure::transient(format!("ssh close: {}", e)))?;
    let exit_code = channel
        .exit_status()
        .map_err(|e| ExecFailure::transient(format!("ssh exit status: {}", e)))?;

    let mut outcome = if exit_code == 0 {
        StepOutcome::succeeded(stdout)
    } else {
        let mut failed = StepOutcome::failed(exit_code as i64, stderr.clone());
        failed.stdout = stdout;
        failed
    };
    if outcome.stderr.is_empty() {
        outcome.stderr = stderr;
    }
    Ok(outcome)
}

fn scp_copy(
    session: &Session,
    source: &str,
    dest: &str,
    direction: TransferDirection,
    overwrite: bool,
) -> Result<StepOutcome, ExecFailure> {
    match direction {
        TransferDirection::Upload => {
            let data = std::fs::read(source)
                .map_err(|e| ExecFailure::validation(format!("read {}: {}", source, e)))?;
            let mut remote = session
                .scp_send(Path::new(dest), 0o644, data.len() as u64, None)
                .map_err(|e| ExecFailure::transient(format!("scp send: {}", e)))?;
            remote
                .write_all(&data)
                .map_err(|e| ExecFailure::transient(format!("scp write: {}", e)))?;
            Ok(StepOutcome::succeeded(format!("uploaded {} -> {}", source, dest))
                .with_metric("bytes", data.len() as u64))
        }
        TransferDirection::Download => {
            if !overwrite && Path::new(dest).exists() {
                return Err(ExecFailure::validation(format!(
                    "destination exists and overwrite is false: {}",
                    dest
                )));
            }
            let (mut remote, stat) = session
                .scp_recv(Path::new(source))
                .map_err(|e| ExecFailure::transient(format!("scp recv: {}", e)))?;
            let mut data = Vec::with_capacity(stat.size() as usize);
            remote
                .read_to_end(&mut data)
                .map_err(|e| ExecFailure::transient(format!("scp read: {}", e)))?;
            std::fs::write(dest, &data)
                .map_err(|e| ExecFailure::validation(format!("write {}: {}", dest, e)))?;
            Ok(StepOutcome::succeeded(format!("downloaded {} -> {}", source, dest))
                .with_metric("bytes", data.len() as u64))
        }
    }
}

fn sftp_of(session: &Session) -> Result<ssh2::Sftp, ExecFailure> {
    session.sftp().map_err(|e| ExecFailure::transient(format!("sftp open: {}", e)))
}

fn sftp_upload(
    session: &Session,
    source: &str,
    dest: &str,
    overwrite: bool,
    preserve_permissions: bool,
) -> Result<StepOutcome, ExecFailure> {
    let sftp = sftp_of(session)?;
    if !overwrite && sftp.stat(Path::new(dest)).is_ok() {
        return Err(ExecFailure::validation(format!(
            "remote path exists and overwrite is false: {}",
            dest
        )));
    }
    let data = std::fs::read(source)
        .map_err(|e| ExecFailure::validation(format!("read {}: {}", source, e)))?;
    let mut remote = sftp
        .create(Path::new(dest))
        .map_err(|e| ExecFailure::transient(format!("sftp create {}: {}", dest, e)))?;
    remote
        .write_all(&data)
        .map_err(|e| ExecFailure::transient(format!("sftp write: {}", e)))?;
    drop(remote);

    if preserve_permissions {
        if let Some(mode) = local_mode(source) {
            let stat = ssh2::FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: Some(mode),
                atime: None,
                mtime: None,
            };
            let _ = sftp.setstat(Path::new(dest), stat);
        }
    }
    Ok(StepOutcome::succeeded(format!("uploaded {} -> {}", source, dest))
        .with_metric("bytes", data.len() as u64))
}

fn sftp_download(
    session: &Session,
    remote_path: &str,
    local_path: &str,
    overwrite: bool,
) -> Result<StepOutcome, ExecFailure> {
    if !overwrite && Path::new(local_path).exists() {
        return Err(ExecFailure::validation(format!(
            "local path exists and overwrite is false: {}",
            local_path
        )));
    }
    let sftp = sftp_of(session)?;
    let mut remote = sftp
        .open(Path::new(remote_path))
        .map_err(|e| ExecFailure::transient(format!("sftp open {}: {}", remote_path, e)))?;
    let mut data = Vec::new();
    remote
        .read_to_end(&mut data)
        .map_err(|e| ExecFailure::transient(format!("sftp read: {}", e)))?;
    std::fs::write(local_path, &data)
        .map_err(|e| ExecFailure::validation(format!("write {}: {}", local_path, e)))?;
    Ok(StepOutcome::succeeded(format!("downloaded {} -> {}", remote_path, local_path))
        .with_metric("bytes", data.len() as u64))
}

struct SyncOptions {
    recursive: bool,
    preserve_permissions: bool,
    preserve_times: bool,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    cancel: CancellationToken,
}

impl SyncOptions {
    /// Include wins only if declared; exclude always wins.
    fn selected(&self, relative: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(relative)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.matches(relative))
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ExecFailure> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| ExecFailure::validation(format!("bad glob {:?}: {}", p, e)))
        })
        .collect()
}

/// Tree sync, local → remote. Partial success reports per-file errors in
/// metrics and fails the step.
fn sftp_sync_up(
    session: &Session,
    source_dir: &str,
    dest_dir: &str,
    options: &SyncOptions,
) -> Result<StepOutcome, ExecFailure> {
    let sftp = sftp_of(session)?;
    let mut files = Vec::new();
    walk_local(Path::new(source_dir), Path::new(source_dir), options.recursive, &mut files)
        .map_err(|e| ExecFailure::validation(format!("walk {}: {}", source_dir, e)))?;

    let mut transferred = 0u64;
    let mut bytes = 0u64;
    let mut errors: Vec<String> = Vec::new();

    for (absolute, relative) in files {
        if options.cancel.is_cancelled() {
            return Err(ExecFailure::protocol("canceled during sync"));
        }
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if !options.selected(&rel_str) {
            continue;
        }
        let dest = Path::new(dest_dir).join(&relative);
        if let Some(parent) = dest.parent() {
            ensure_remote_dir(&sftp, parent);
        }
        match std::fs::read(&absolute) {
            Ok(data) => {
                let result = sftp
                    .create(&dest)
                    .map_err(|e| e.to_string())
                    .and_then(|mut f| f.write_all(&data).map_err(|e| e.to_string()));
                match result {
                    Ok(()) => {
                        transferred += 1;
                        bytes += data.len() as u64;
                        if options.preserve_permissions || options.preserve_times {
                            apply_remote_stat(&sftp, &dest, &absolute, options);
                        }
                    }
                    Err(e) => errors.push(format!("{}: {}", rel_str, e)),
                }
            }
            Err(e) => errors.push(format!("{}: {}", rel_str, e)),
        }
    }

    sync_outcome(transferred, bytes, errors)
}

/// Tree sync, remote → local.
fn sftp_sync_down(
    session: &Session,
    source_dir: &str,
    dest_dir: &str,
    options: &SyncOptions,
) -> Result<StepOutcome, ExecFailure> {
    let sftp = sftp_of(session)?;
    let mut files = Vec::new();
    walk_remote(&sftp, Path::new(source_dir), Path::new(source_dir), options.recursive, &mut files)
        .map_err(|e| ExecFailure::transient(format!("walk remote {}: {}", source_dir, e)))?;

    let mut transferred = 0u64;
    let mut bytes = 0u64;
    let mut errors: Vec<String> = Vec::new();

    for (absolute, relative) in files {
        if options.cancel.is_cancelled() {
            return Err(ExecFailure::protocol("canceled during sync"));
        }
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if !options.selected(&rel_str) {
            continue;
        }
        let dest = Path::new(dest_dir).join(&relative);
        if let Some(parent) = dest.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let result = sftp.open(&absolute).map_err(|e| e.to_string()).and_then(|mut f| {
            let mut data = Vec::new();
            f.read_to_end(&mut data).map_err(|e| e.to_string())?;
            Ok(data)
        });
        match result {
            Ok(data) => match std::fs::write(&dest, &data) {
                Ok(()) => {
                    transferred += 1;
                    bytes += data.len() as u64;
                }
                Err(e) => errors.push(format!("{}: {}", rel_str, e)),
            },
            Err(e) => errors.push(format!("{}: {}", rel_str, e)),
        }
    }

    sync_outcome(transferred, bytes, errors)
}

fn sync_outcome(
    transferred: u64,
    bytes: u64,
    errors: Vec<String>,
) -> Result<StepOutcome, ExecFailure> {
    let mut outcome = if errors.is_empty() {
        StepOutcome::succeeded(format!("synced {} files ({} bytes)", transferred, bytes))
    } else {
        // Partial sync maps to failed at the step level, keeping the
        // per-file error list for diagnostics.
        StepOutcome::failed(1, format!("{} files failed to sync", errors.len()))
    };
    outcome = outcome
        .with_metric("files_transferred", transferred)
        .with_metric("bytes_transferred", bytes);
    if !errors.is_empty() {
        outcome.metrics.insert(
            "file_errors".to_string(),
            serde_json::Value::Array(errors.into_iter().map(serde_json::Value::from).collect()),
        );
    }
    Ok(outcome)
}

fn walk_local(
    root: &Path,
    dir: &Path,
    recursive: bool,
    out: &mut Vec<(PathBuf, PathBuf)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                walk_local(root, &path, recursive, out)?;
            }
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push((path.clone(), relative.to_path_buf()));
        }
    }
    Ok(())
}

fn walk_remote(
    sftp: &ssh2::Sftp,
    root: &Path,
    dir: &Path,
    recursive: bool,
    out: &mut Vec<(PathBuf, PathBuf)>,
) -> Result<(), ssh2::Error> {
    for (path, stat) in sftp.readdir(dir)? {
        if stat.is_dir() {
            if recursive {
                walk_remote(sftp, root, &path, recursive, out)?;
            }
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push((path.clone(), relative.to_path_buf()));
        }
    }
    Ok(())
}

fn ensure_remote_dir(sftp: &ssh2::Sftp, dir: &Path) {
    if sftp.stat(dir).is_ok() {
        return;
    }
    if let Some(parent) = dir.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_remote_dir(sftp, parent);
        }
    }
    let _ = sftp.mkdir(dir, 0o755);
}

fn apply_remote_stat(sftp: &ssh2::Sftp, dest: &Path, source: &Path, options: &SyncOptions) {
    let mut stat = ssh2::FileStat {
        size: None,
        uid: None,
        gid: None,
        perm: None,
        atime: None,
        mtime: None,
    };
    if options.preserve_permissions {
        stat.perm = local_mode(&source.to_string_lossy());
    }
    if options.preserve_times {
        if let Ok(meta) = std::fs::metadata(source) {
            if let Ok(modified) = meta.modified() {
                if let Ok(secs) = modified.duration_since(std::time::UNIX_EPOCH) {
                    stat.mtime = Some(secs.as_secs());
                    stat.atime = Some(secs.as_secs());
                }
            }
        }
    }
    if stat.perm.is_some() || stat.mtime.is_some() {
        let _ = sftp.setstat(dest, stat);
    }
}

#[cfg(unix)]
fn local_mode(path: &str) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn local_mode(_path: &str) -> Option<u32> {
    None
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
