// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use oc_core::FailureKind;
use yare::parameterized;

fn params(pairs: &[(&str, serde_json::Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[parameterized(
    recursive_root_rm = { "rm -rf / --no-preserve-root" },
    windows_format = { "format c: /q" },
    shutdown = { "shutdown -h now" },
    reboot = { "sudo reboot" },
    disk_write = { "dd if=/dev/zero of=/dev/sda" },
    mkfs = { "mkfs.ext4 /dev/sdb1" },
    device_redirect = { "echo x > /dev/sda" },
    etc_overwrite = { "echo nameserver > /etc/resolv.conf" },
    world_writable = { "chmod 777 /var/www" },
    su_dash = { "su - admin" },
)]
fn dangerous_patterns_are_refused(command: &str) {
    let err = validate_command(command).unwrap_err();
    assert_eq!(err.kind, FailureKind::Safety);
}

#[test]
fn oversized_commands_are_refused() {
    let command = "echo ".to_string() + &"x".repeat(MAX_COMMAND_LEN);
    let err = validate_command(&command).unwrap_err();
    assert_eq!(err.kind, FailureKind::Safety);
    assert!(err.message.contains("too long"));
}

#[parameterized(
    plain = { "echo hello" },
    pipeline_allowed = { "ps aux | grep nginx" },
    powershell_pipe = { "Get-Service | Format-Table -AutoSize" },
    echo_chain = { "mkdir -p /tmp/x && echo done" },
)]
fn ordinary_commands_pass(command: &str) {
    assert!(validate_command(command).is_ok());
}

#[test]
fn windows_catalog_generates_validated_powershell() {
    let command = generate_command("windows", "disk_space", &params(&[("drive",
        serde_json::json!("C:"))])).unwrap();
    assert!(command.contains("Win32_LogicalDisk"));
    assert!(command.contains("'C:'"));

    let all = generate_command("windows", "system_info", &params(&[])).unwrap();
    assert!(all.contains("Get-ComputerInfo"));
}

#[test]
fn linux_catalog_quotes_parameters() {
    let command = generate_command("linux", "disk_space", &params(&[("path",
        serde_json::json!("/var/log; rm x"))])).unwrap();
    assert_eq!(command, "df -h '/var/log; rm x'");
}

#[test]
fn custom_script_requires_script_parameter() {
    let err = generate_command("windows", "custom_script", &params(&[])).unwrap_err();
    assert_eq!(err.kind, FailureKind::Validation);

    let ok = generate_command("windows", "custom_script", &params(&[("script",
        serde_json::json!("Get-Date"))])).unwrap();
    assert_eq!(ok, "Get-Date");
}

#[test]
fn generated_commands_still_pass_safety() {
    // A catalog entry smuggling a dangerous parameter is refused.
    let err = generate_command("linux", "custom_script", &params(&[("script",
        serde_json::json!("rm -rf /"))])).unwrap_err();
    assert_eq!(err.kind, FailureKind::Safety);
}

#[parameterized(
    unknown_platform = { "solaris", "system_info" },
    unknown_windows_type = { "windows", "mine_bitcoin" },
    unknown_linux_type = { "linux", "mystery" },
)]
fn unknown_catalog_entries_are_validation_errors(platform: &str, command_type: &str) {
    let err = generate_command(platform, command_type, &params(&[])).unwrap_err();
    assert_eq!(err.kind, FailureKind::Validation);
}

#[test]
fn shell_quote_escapes_single_quotes() {
    assert_eq!(shell_quote("plain"), "'plain'");
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
}
