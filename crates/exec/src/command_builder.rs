// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generated-command catalog and command safety validation.
//!
//! Catalog entries turn a templated name plus parameters into a
//! platform-specific command. Every generated or user-supplied command
//! passes the safety validator before leaving this module.

use crate::executor::ExecFailure;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Commands longer than this are refused outright.
pub const MAX_COMMAND_LEN: usize = 10 * 1024;

/// Patterns that are destructive no matter the context.
// The regex set is compile-time constant; expect is unreachable.
#[allow(clippy::expect_used)]
static DANGEROUS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"rm\s+-rf\s+/",
        r"del\s+/[sq]\s+\*",
        r"format\s+[a-z]:",
        r"shutdown\s+",
        r"\breboot\b",
        r"\bhalt\b",
        r"init\s+[06]",
        r"dd\s+if=.*of=/dev/",
        r"mkfs\.",
        r"\bfdisk\b",
        r"\bparted\b",
        r">\s*/dev/sd[a-z]",
        r"cat\s+.*>\s*/etc/",
        r"echo\s+.*>\s*/etc/",
        r"chmod\s+777",
        r"chown\s+.*root",
        r"sudo\s+su",
        r"su\s+-",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("constant regex pattern is valid"))
    .collect()
});

/// Shell metacharacters that warrant a warning outside allow-listed use.
const INJECTION_PATTERNS: [&str; 6] = [";", "&&", "||", "|", "`", "$("];

/// Validate a command against the denylist, the size cap, and the
/// injection warnings. Violations are hard failures with a fixed reason
/// and are never retried; suspicious-but-allowed patterns
/// only log.
pub fn validate_command(command: &str) -> Result<(), ExecFailure> {
    let lowered = command.to_lowercase();
    for pattern in DANGEROUS_PATTERNS.iter() {
        if pattern.is_match(&lowered) {
            return Err(ExecFailure::safety(format!(
                "command contains dangerous pattern: {}",
                pattern.as_str()
            )));
        }
    }
    if command.len() > MAX_COMMAND_LEN {
        return Err(ExecFailure::safety("command too long".to_string()));
    }
    for pattern in INJECTION_PATTERNS {
        if command.contains(pattern) && !is_safe_usage(command, pattern) {
            tracing::warn!(pattern, "potentially unsafe command pattern");
        }
    }
    Ok(())
}

/// Allow-listed contexts where shell metacharacters are routine.
fn is_safe_usage(command: &str, pattern: &str) -> bool {
    let safe_contexts: &[&str] = match pattern {
        "|" => &["Format-Table", "Format-List", "Select-Object", "Where-Object", "grep", "head"],
        "&&" => &["echo", "mkdir"],
        _ => return false,
    };
    safe_contexts.iter().any(|ctx| command.contains(ctx))
}

fn param_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn param_u64(params: &Map<String, Value>, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Quote a value for a single-quoted POSIX shell context.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quote a value for a single-quoted PowerShell context.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Generate a platform command from a catalog entry, then validate it.
pub fn generate_command(
    platform: &str,
    command_type: &str,
    params: &Map<String, Value>,
) -> Result<String, ExecFailure> {
    let command = match platform {
        "windows" => generate_windows(command_type, params)?,
        "linux" => generate_linux(command_type, params)?,
        other => {
            return Err(ExecFailure::validation(format!("unsupported platform: {}", other)))
        }
    };
    validate_command(&command)?;
    Ok(command)
}

fn generate_windows(command_type: &str, params: &Map<String, Value>) -> Result<String, ExecFailure> {
    Ok(match command_type {
        "system_info" => "Get-ComputerInfo | Select-Object WindowsProductName, WindowsVersion, \
             TotalPhysicalMemory, CsProcessors, CsSystemType, TimeZone, LastBootUpTime | Format-List"
            .to_string(),
        "disk_space" => match param_str(params, "drive") {
            Some(drive) => format!(
                "Get-WmiObject -Class Win32_LogicalDisk -Filter \"DeviceID={}\" | \
                 Select-Object DeviceID, Size, FreeSpace | Format-Table -AutoSize",
                ps_quote(drive)
            ),
            None => "Get-WmiObject -Class Win32_LogicalDisk | \
                 Select-Object DeviceID, Size, FreeSpace | Format-Table -AutoSize"
                .to_string(),
        },
        "running_services" => match param_str(params, "service_filter") {
            Some(filter) => format!(
                "Get-Service | Where-Object {{$_.Name -like '*{}*' -and $_.Status -eq 'Running'}} | \
                 Select-Object Name, Status, StartType | Format-Table -AutoSize",
                filter.replace('\'', "''")
            ),
            None => "Get-Service | Where-Object {$_.Status -eq 'Running'} | \
                 Select-Object Name, Status, StartType | Format-Table -AutoSize"
                .to_string(),
        },
        "installed_programs" => "Get-WmiObject -Class Win32_Product | \
             Select-Object Name, Version, Vendor, InstallDate | Sort-Object Name | \
             Format-Table -AutoSize"
            .to_string(),
        "network_config" => "Get-NetIPConfiguration | Select-Object InterfaceAlias, IPv4Address, \
             IPv6Address, DNSServer | Format-List"
            .to_string(),
        "event_logs" => {
            let log_name = param_str(params, "log_name").unwrap_or("System");
            let max_events = param_u64(params, "max_events", 50);
            format!(
                "Get-WinEvent -LogName {} -MaxEvents {} | \
                 Select-Object TimeCreated, Id, LevelDisplayName, Message | Format-Table -Wrap",
                ps_quote(log_name),
                max_events
            )
        }
        "process_list" => match param_str(params, "process_filter") {
            Some(filter) => format!(
                "Get-Process | Where-Object {{$_.ProcessName -like '*{}*'}} | \
                 Select-Object ProcessName, Id, CPU, WorkingSet | Format-Table -AutoSize",
                filter.replace('\'', "''")
            ),
            None => "Get-Process | Select-Object ProcessName, Id, CPU, WorkingSet | \
                 Format-Table -AutoSize"
                .to_string(),
        },
        "registry_query" => {
            let path = param_str(params, "path")
                .unwrap_or("HKLM:\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion");
            match param_str(params, "property") {
                Some(prop) => {
                    format!("Get-ItemProperty -Path {} -Name {}", ps_quote(path), ps_quote(prop))
                }
                None => format!("Get-ItemProperty -Path {}", ps_quote(path)),
            }
        }
        "user_accounts" => "Get-LocalUser | Select-Object Name, Enabled, LastLogon, \
             PasswordLastSet | Format-Table -AutoSize"
            .to_string(),
        "scheduled_tasks" => "Get-ScheduledTask | Where-Object {$_.State -eq 'Ready'} | \
             Select-Object TaskName, State, LastRunTime, NextRunTime | Format-Table -AutoSize"
            .to_string(),
        "iis_info" => "Import-Module WebAdministration; Get-Website | \
             Select-Object Name, State, PhysicalPath, Bindings | Format-Table -AutoSize"
            .to_string(),
        "custom_script" => param_str(params, "script")
            .ok_or_else(|| ExecFailure::validation("custom_script requires a 'script' parameter"))?
            .to_string(),
        other => {
            return Err(ExecFailure::validation(format!(
                "unsupported Windows command type: {}",
                other
            )))
        }
    })
}

fn generate_linux(command_type: &str, params: &Map<String, Value>) -> Result<String, ExecFailure> {
    Ok(match command_type {
        "system_info" => "uname -a && cat /etc/os-release && free -h && df -h".to_string(),
        "disk_space" => format!("df -h {}", shell_quote(param_str(params, "path").unwrap_or("/"))),
        "running_services" => match param_str(params, "service_filter") {
            Some(filter) => format!(
                "systemctl list-units --type=service --state=running | grep {}",
                shell_quote(filter)
            ),
            None => "systemctl list-units --type=service --state=running".to_string(),
        },
        "installed_packages" => "if command -v dpkg >/dev/null 2>&1; then dpkg -l; \
             elif command -v rpm >/dev/null 2>&1; then rpm -qa; else pacman -Q; fi"
            .to_string(),
        "network_config" => "ip addr show && ip route show".to_string(),
        "log_analysis" => {
            let lines = param_u64(params, "lines", 100);
            let file = param_str(params, "log_file").unwrap_or("/var/log/syslog");
            format!("tail -n {} {}", lines, shell_quote(file))
        }
        "process_list" => match param_str(params, "process_filter") {
            Some(filter) => format!("ps aux | grep {} | head -50", shell_quote(filter)),
            None => "ps aux | head -50".to_string(),
        },
        "memory_usage" => "free -h && vmstat 1 2".to_string(),
        "user_accounts" => "getent passwd | cut -d: -f1,3,6".to_string(),
        "cron_jobs" => "crontab -l 2>/dev/null; ls /etc/cron.d 2>/dev/null".to_string(),
        "docker_info" => "docker ps --format 'table {{.Names}}\\t{{.Status}}\\t{{.Image}}'"
            .to_string(),
        "custom_script" => param_str(params, "script")
            .ok_or_else(|| ExecFailure::validation("custom_script requires a 'script' parameter"))?
            .to_string(),
        other => {
            return Err(ExecFailure::validation(format!(
                "unsupported Linux command type: {}",
                other
            )))
        }
    })
}

#[cfg(test)]
#[path = "command_builder_tests.rs"]
mod tests;
