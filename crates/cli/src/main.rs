// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `varie` - thin control-socket client for the Varie workstation daemon.

mod client;
mod daemon_process;
mod env;

use clap::{Parser, Subcommand};

use client::DaemonClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "varie",
    version = VERSION,
    about = "Talk to the varied control socket"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuzzy-match a repo/session and dispatch a message to it,
    /// auto-provisioning a worker if no session is live
    Route {
        /// Repo name, path fragment, or task id to match against
        query: String,
        /// Message to send once a session is resolved
        message: String,
    },
    /// Send a message directly to a known session id
    Dispatch {
        #[arg(value_name = "SESSION_ID")]
        target_session_id: String,
        message: String,
    },
    /// List live worker sessions
    #[command(name = "list")]
    ListWorkers,
    /// Provision a new worker session for a repo
    #[command(name = "create-worker")]
    CreateWorker {
        repo: String,
        #[arg(value_name = "REPO_PATH")]
        repo_path: String,
        #[arg(long = "task")]
        task_id: Option<String>,
        #[arg(long = "claude-flags")]
        claude_flags: Option<String>,
    },
    /// Walk the filesystem for repos and refresh the projects registry
    Discover {
        /// Root to scan (defaults to the manager directory)
        path: Option<String>,
    },
    /// Manage the `varied` background process
    Daemon(DaemonArgs),
}

#[derive(clap::Args)]
struct DaemonArgs {
    #[command(subcommand)]
    command: DaemonCommand,
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Start `varied` in the background if it isn't already running
    Start,
    /// Stop a running `varied`
    Stop,
    /// Report whether `varied` is reachable and where its socket lives
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Route { query, message } => {
            let client = DaemonClient::connect_or_start()?;
            let response = client.route(&query, &message).await?;
            print_json(&response);
        }
        Commands::Dispatch {
            target_session_id,
            message,
        } => {
            let client = DaemonClient::connect_or_start()?;
            let response = client.dispatch(&target_session_id, &message).await?;
            print_json(&response);
        }
        Commands::ListWorkers => {
            let client = DaemonClient::connect()?;
            let response = client.list_workers().await?;
            print_json(&response);
        }
        Commands::CreateWorker {
            repo,
            repo_path,
            task_id,
            claude_flags,
        } => {
            let client = DaemonClient::connect_or_start()?;
            let response = client
                .create_worker(&repo, &repo_path, task_id.as_deref(), claude_flags.as_deref())
                .await?;
            print_json(&response);
        }
        Commands::Discover { path } => {
            let client = DaemonClient::connect_or_start()?;
            let response = client.discover_projects(path.as_deref()).await?;
            print_json(&response);
        }
        Commands::Daemon(args) => daemon_command(args.command).await?,
    }

    Ok(())
}

async fn daemon_command(command: DaemonCommand) -> anyhow::Result<()> {
    match command {
        DaemonCommand::Start => {
            let client = DaemonClient::connect_or_start()?;
            println!("varied listening on {}", client.socket_path().display());
        }
        DaemonCommand::Stop => {
            if client::stop_daemon()? {
                println!("varied stopped");
            } else {
                println!("varied was not running");
            }
        }
        DaemonCommand::Status => match DaemonClient::connect() {
            Ok(client) => {
                let response = client.list_workers().await?;
                let workers = response
                    .get("workers")
                    .and_then(|w| w.as_array())
                    .map(|w| w.len())
                    .unwrap_or(0);
                println!("varied running at {}", client.socket_path().display());
                println!("{workers} worker session(s)");
            }
            Err(client::ClientError::DaemonNotRunning) => {
                println!("varied is not running");
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}
