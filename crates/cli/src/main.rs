// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sb - Switchboard CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod color;
mod commands;
mod env;
mod exit_error;
mod output;
mod table;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use commands::session::{self, Action, ModeArg, WorkspaceArg};
use commands::{attach, events};
use output::OutputFormat;

use crate::client::Endpoint;

#[derive(Parser)]
#[command(
    name = "sb",
    version,
    about = "Switchboard - drive agent sessions from the terminal",
    styles = color::styles()
)]
struct Cli {
    /// Gateway URL [env: SB_URL] [default: ws://127.0.0.1:7420/ws]
    #[arg(long, global = true)]
    url: Option<String>,

    /// Shared secret [env: SB_SHARED_SECRET] (defaults to the daemon's secret file)
    #[arg(long, global = true)]
    secret: Option<String>,

    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a session's output; stdin lines are sent as input
    Attach {
        /// Session id or name
        session: String,
        /// Keep terminal escape sequences
        #[arg(long)]
        raw: bool,
        /// Skip the buffered output
        #[arg(long)]
        no_replay: bool,
    },
    /// Send a line of input to a session
    Send {
        /// Session id or name
        session: String,
        /// Text to send (words are joined with spaces)
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Interrupt whatever the session is doing
    Interrupt {
        /// Session id or name
        session: String,
    },
    /// Approve a pending permission prompt
    Approve {
        /// Session id or name
        session: String,
    },
    /// Deny a pending permission prompt
    Deny {
        /// Session id or name
        session: String,
    },
    /// Print the session's current screen
    Capture {
        /// Session id or name
        session: String,
        /// Strip terminal escape sequences
        #[arg(long)]
        plain: bool,
    },
    /// List sessions
    List,
    /// Start a new agent session
    Spawn {
        /// Unique session name
        name: String,
        /// Project directory
        project: PathBuf,
        #[arg(long, value_enum, default_value_t)]
        mode: ModeArg,
        #[arg(long, value_enum, default_value_t)]
        workspace: WorkspaceArg,
    },
    /// Kill a session and forget it
    Kill {
        /// Session id or name
        session: String,
    },
    /// Restart an offline session's process in place
    Respawn {
        /// Session id or name
        session: String,
    },
    /// Follow bus events
    TailEvents {
        /// Replay events after this sequence number first
        #[arg(long)]
        since: Option<u64>,
    },
}

fn cli_command() -> clap::Command {
    Cli::command()
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let code = e
            .downcast_ref::<exit_error::ExitError>()
            .map_or(1, |c| c.code);
        let msg = format_error(&e);
        if !msg.is_empty() {
            eprintln!("Error: {}", msg);
        }
        std::process::exit(code);
    }
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, the
/// "Caused by" chain is skipped. Otherwise the full chain is rendered.
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();
    let chain_redundant = err
        .chain()
        .skip(1)
        .all(|cause| top.contains(&cause.to_string()));
    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {}: {}", i, cause));
    }
    buf
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    let Some(command) = cli.command else {
        // No subcommand provided: print help and exit 0
        cli_command().print_help()?;
        println!();
        return Ok(());
    };

    let endpoint = Endpoint::resolve(cli.url, cli.secret)?;

    // tail-events manages its own connection so it can resume
    if let Commands::TailEvents { since } = command {
        return events::tail(&endpoint, since, format).await;
    }

    let mut client = endpoint.connect(None).await?;
    let result = match command {
        Commands::Attach {
            session,
            raw,
            no_replay,
        } => attach::run(&mut client, session, raw, !no_replay).await,
        Commands::Send { session, text } => {
            let action = Action::Input(text.join(" "));
            session::deliver(&mut client, session, action, format).await
        }
        Commands::Interrupt { session } => {
            session::deliver(&mut client, session, Action::Interrupt, format).await
        }
        Commands::Approve { session } => {
            let action = Action::Permission { approved: true };
            session::deliver(&mut client, session, action, format).await
        }
        Commands::Deny { session } => {
            let action = Action::Permission { approved: false };
            session::deliver(&mut client, session, action, format).await
        }
        Commands::Capture { session, plain } => {
            session::capture(&mut client, session, plain, format).await
        }
        Commands::List => session::list(&mut client, format).await,
        Commands::Spawn {
            name,
            project,
            mode,
            workspace,
        } => session::spawn(&mut client, name, &project, mode, workspace, format).await,
        Commands::Kill { session } => session::kill(&mut client, session, format).await,
        Commands::Respawn { session } => session::respawn(&mut client, session, format).await,
        Commands::TailEvents { .. } => Ok(()),
    };
    client.close().await;
    result
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
