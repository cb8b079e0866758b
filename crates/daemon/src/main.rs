// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Switchboard Daemon (sbd)
//!
//! Owns the agent sessions and serves every client surface:
//! - Realtime gateway: WebSocket at `/ws`
//! - Broadcast: server-sent events at `/events`
//! - Tool-session transports: JSON-RPC at `/mcp`

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::io::Write;

use sb_daemon::config::Config;
use sb_daemon::lifecycle::{self, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// Startup marker prefix written to the log before anything else.
/// Full format: "--- sbd: starting (pid: 12345) ---"
const STARTUP_MARKER_PREFIX: &str = "--- sbd: starting (pid: ";

const USAGE: &str = "\
Switchboard Daemon - keeps agent sessions running and bridges them to clients

USAGE:
    sbd

Listens on the configured bind address (default 127.0.0.1:7420):
    /ws        realtime gateway (WebSocket)
    /events    event broadcast (server-sent events)
    /mcp       tool-session transport (JSON-RPC)

Configuration is read from $SB_STATE_DIR/config.toml (default
~/.local/state/sb/config.toml) and SB_* environment variables.

OPTIONS:
    -h, --help       Print help information
    -v, --version    Print version information";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Info flags run before any config or lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        let version = format!("sbd {}", env!("CARGO_PKG_VERSION"));
        match arg.as_str() {
            "--version" | "-V" | "-v" => println!("{version}"),
            "--help" | "-h" | "help" => println!("{version}\n{USAGE}"),
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: sbd [--help | --version]");
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = Config::load()?;

    // Marker goes in before tracing starts so it is never interleaved
    append_to_log(&config, &format!("{STARTUP_MARKER_PREFIX}{}) ---", std::process::id()))?;
    let log_guard = setup_logging(&config)?;
    info!(state_dir = %config.state_dir.display(), "starting daemon");

    let daemon = match lifecycle::startup(&config).await {
        Ok(daemon) => daemon,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path).unwrap_or_default();
            eprintln!("sbd is already running");
            if !pid.trim().is_empty() {
                eprintln!("  pid: {}", pid.trim());
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Tracing is non-blocking and may not flush before exit
            let _ = append_to_log(&config, &format!("ERROR Failed to start daemon: {e}"));
            error!(error = %e, "failed to start daemon");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let shutdown = shutdown_signal()?;
    info!(addr = %daemon.local_addr()?, "daemon ready");

    // A parent process waiting on startup reads this line
    println!("READY");

    daemon.run(shutdown).await;
    Ok(())
}

/// Resolves on the first SIGTERM or SIGINT.
fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    })
}

/// Append one line to the daemon log synchronously.
fn append_to_log(config: &Config, line: &str) -> Result<(), LifecycleError> {
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn setup_logging(config: &Config) -> Result<WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = config.log_path.parent().ok_or(LifecycleError::NoStateDir)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or(LifecycleError::NoStateDir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .init();

    Ok(guard)
}
