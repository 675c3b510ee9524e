// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `varied`: the Varie workstation daemon binary.
//!
//! Owns a fleet of PTY children, one per assistant session, and exposes
//! them over a control socket and (optionally) an outbound cloud relay
//! (spec.md §1–§6). Normally launched by the `varie` CLI; not meant to
//! be run by hand.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use varie_adapters::{PtySessionAdapter, RepoResolver};
use varie_core::{SessionKind, SystemClock, UuidIdGen};
use varie_daemon::dispatcher::Dispatcher;
use varie_daemon::lifecycle::{self, Config, LifecycleError};
use varie_daemon::listener::Listener;
use varie_daemon::relay_task;
use varie_daemon::session_manager::SessionManager;
use varie_storage::{DaemonConfig, ManagerState};

const VERSION: &str = env!("CARGO_PKG_VERSION");
/// 5-minute autosave of manager state (spec.md §5 "Scheduling model").
const MANAGER_STATE_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_ASSISTANT_CMD: &str = "claude";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("varied {VERSION}");
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("varied {VERSION}");
                println!("Varie workstation daemon — owns PTY sessions and the control socket");
                println!();
                println!("USAGE:");
                println!("    varied");
                println!();
                println!("The daemon is normally started by the `varie` CLI and should not");
                println!("be invoked directly. It listens on a Unix socket for commands from");
                println!("`varie` and hook scripts, and optionally relays activity to the");
                println!("configured cloud endpoint.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: varied [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.app_dir)?;

    let _lock = match lifecycle::acquire_lock(&config) {
        Ok(lock) => lock,
        Err(LifecycleError::LockFailed(_)) => {
            eprintln!("varied is already running");
            let descriptor = std::fs::read_to_string(&config.daemon_descriptor_path).unwrap_or_default();
            if !descriptor.is_empty() {
                eprintln!("{descriptor}");
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let _log_guard = setup_logging(&config)?;
    info!(version = VERSION, dev = config.dev, "starting varied");

    let machine_id = lifecycle::load_or_create_machine_id(&config)?;
    lifecycle::write_descriptor(&config, VERSION)?;

    let daemon_config = DaemonConfig::load(&config.config_path)?;

    let resolver = Arc::new(RepoResolver::new());
    if let Ok(found) = varie_adapters::discover(&config.manager_dir) {
        resolver.ingest_scanned(found);
    }
    let learned = varie_storage::LearnedRepos::load(&config.learned_repos_path)?;
    resolver.ingest_learned(learned.iter().cloned());

    let assistant_cmd = if daemon_config.skip_permissions {
        format!("{DEFAULT_ASSISTANT_CMD} --dangerously-skip-permissions")
    } else {
        DEFAULT_ASSISTANT_CMD.to_string()
    };

    let (lifecycle_tx, lifecycle_rx) = tokio::sync::mpsc::channel(256);

    let sessions = SessionManager::new(
        PtySessionAdapter::new(),
        Arc::new(SystemClock::default()),
        Arc::new(UuidIdGen),
        lifecycle_tx,
    );

    let dispatcher = Arc::new(Dispatcher::new(
        sessions.clone(),
        resolver.clone(),
        config.home.clone(),
        config.manager_dir.clone(),
        config.projects_path.clone(),
        assistant_cmd,
        Arc::new(SystemClock::default()),
    ));

    register_orchestrator(&sessions, &config);

    let listener = Listener::bind(config.socket_path.clone(), dispatcher.clone())?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(listener.run(shutdown_rx));

    if daemon_config.cloud_relay {
        let config_path = config.config_path.clone();
        let token_provider = move || {
            DaemonConfig::load(&config_path)
                .ok()
                .and_then(|c| c.cloud_relay_token)
        };
        relay_task::spawn(
            machine_id,
            VERSION.to_string(),
            token_provider,
            dispatcher.clone(),
            lifecycle_rx,
        )
        .await;
    } else {
        // Nobody needs lifecycle events; drain so the bounded channel
        // never backs up and blocks session creation/teardown.
        tokio::spawn(async move {
            let mut lifecycle_rx = lifecycle_rx;
            while lifecycle_rx.recv().await.is_some() {}
        });
    }

    spawn_manager_state_autosave(sessions.clone(), config.manager_state_path.clone());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "varied ready");
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    let _ = shutdown_tx.send(());
    sessions.close_all().await;
    let now = chrono::Utc::now();
    if let Err(e) = ManagerState::new(now).save(&config.manager_state_path) {
        warn!(error = %e, "failed to save manager state on shutdown");
    }
    lifecycle::cleanup(&config);

    Ok(())
}

/// Register the daemon's own long-lived orchestrator session so it is
/// visible to `list_workers` and status snapshots from the moment the
/// daemon starts (spec.md §3 "Session kinds").
fn register_orchestrator(
    sessions: &SessionManager<PtySessionAdapter, SystemClock, UuidIdGen>,
    config: &Config,
) {
    let id = varie_core::SessionId::from(format!("orchestrator-{}", std::process::id()));
    sessions.register_external(
        id,
        "manager",
        config.manager_dir.clone(),
        SessionKind::Orchestrator,
        None,
    );
}

fn spawn_manager_state_autosave(
    sessions: SessionManager<PtySessionAdapter, SystemClock, UuidIdGen>,
    path: std::path::PathBuf,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MANAGER_STATE_AUTOSAVE_INTERVAL);
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            let mut state = ManagerState::new(now);
            state.active_sessions = sessions
                .list()
                .into_iter()
                .map(|s| varie_storage::ActiveSessionSummary {
                    session_id: s.id.as_str().to_string(),
                    repo: s.repo,
                    kind: match s.kind {
                        SessionKind::Orchestrator => "orchestrator".to_string(),
                        SessionKind::Worker => "worker".to_string(),
                    },
                })
                .collect();
            if let Err(e) = state.save(&path) {
                error!(error = %e, "failed to autosave manager state");
            }
        }
    });
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = config
        .log_path
        .file_name()
        .ok_or(LifecycleError::InvalidLogPath)?;
    let file_appender = tracing_appender::rolling::never(
        config
            .log_path
            .parent()
            .ok_or(LifecycleError::InvalidLogPath)?,
        file_name,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
