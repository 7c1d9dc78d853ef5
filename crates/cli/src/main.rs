// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oc: operator CLI over the daemon's run-control surface.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "oc", version, about = "OpsConductor operator CLI")]
struct Cli {
    /// Daemon base URL.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8085", env = "OC_URL")]
    url: String,

    /// Identity forwarded as trusted-ingress headers.
    #[arg(long, global = true, env = "OC_USER")]
    user: Option<String>,

    /// Emit raw JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage workflow definitions.
    #[command(subcommand)]
    Job(commands::JobCommand),
    /// Start, inspect, and cancel runs.
    #[command(subcommand)]
    Run(commands::RunCommand),
    /// Manage schedules.
    #[command(subcommand)]
    Schedule(commands::ScheduleCommand),
    /// Subscribe to live status frames.
    Watch(commands::WatchArgs),
    /// Daemon health.
    Health,
    /// List registered workers.
    Workers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = client::DaemonClient::new(&cli.url, cli.user.as_deref())?;
    match cli.command {
        Command::Job(command) => commands::job(&client, command, cli.json).await,
        Command::Run(command) => commands::run(&client, command, cli.json).await,
        Command::Schedule(command) => commands::schedule(&client, command, cli.json).await,
        Command::Watch(args) => commands::watch(&cli.url, args).await,
        Command::Health => commands::health(&client, cli.json).await,
        Command::Workers => commands::workers(&client, cli.json).await,
    }
}
