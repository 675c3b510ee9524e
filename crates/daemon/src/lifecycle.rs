// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, single-instance lock,
//! machine identity, and the socket descriptor file (spec.md §4.2, §4.5,
//! §6).

use std::fs::File;
use std::path::PathBuf;

use fs2::FileExt;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use varie_storage::paths;

/// All well-known paths the daemon needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub app_dir: PathBuf,
    pub manager_dir: PathBuf,
    pub config_path: PathBuf,
    pub projects_path: PathBuf,
    pub manager_state_path: PathBuf,
    pub manager_claude_md_path: PathBuf,
    pub learned_repos_path: PathBuf,
    pub machine_id_path: PathBuf,
    pub daemon_descriptor_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub socket_path: PathBuf,
    pub dev: bool,
}

impl Config {
    /// Resolve every path under `~/.varie/` (or `$VARIE_HOME` for test
    /// isolation), plus the socket under `tmp_dir`.
    pub fn load() -> Result<Self, LifecycleError> {
        let home = if let Ok(dir) = std::env::var("VARIE_HOME") {
            PathBuf::from(dir)
        } else {
            paths::home_dir().ok_or(LifecycleError::NoHomeDir)?
        };
        let tmp_dir = std::env::var("VARIE_TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let dev = std::env::var("VARIE_DEV").is_ok();

        let app_dir = paths::app_dir(&home);
        let manager_dir = paths::manager_dir(&home);

        Ok(Self {
            config_path: paths::config_path(&home),
            projects_path: paths::projects_path(&home),
            manager_state_path: paths::manager_state_path(&home),
            manager_claude_md_path: paths::manager_claude_md_path(&home),
            learned_repos_path: paths::learned_repos_path(&home),
            machine_id_path: paths::machine_id_path(&home),
            daemon_descriptor_path: paths::daemon_descriptor_path(&home),
            lock_path: app_dir.join(if dev { "daemon-dev.lock" } else { "daemon.lock" }),
            log_path: app_dir.join(if dev { "daemon-dev.log" } else { "daemon.log" }),
            socket_path: paths::socket_path(&tmp_dir, dev),
            dev,
            app_dir,
            manager_dir,
            home,
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("log path has no parent directory or file name")]
    InvalidLogPath,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `<home>/.varie/daemon.json` (spec.md §4.2 "Socket descriptor").
#[derive(Debug, Serialize)]
pub struct DaemonDescriptor {
    #[serde(rename = "socketPath")]
    pub socket_path: String,
    pub pid: u32,
    #[serde(rename = "startedAt")]
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Holds the daemon's exclusive single-instance lock for the process
/// lifetime; the lock is released automatically on drop.
pub struct InstanceLock {
    #[allow(dead_code)]
    file: File,
}

/// Acquire the single-instance lock, failing fast if another daemon
/// already holds it (spec.md's implicit single-daemon-per-user model,
/// grounded in the teacher's `lifecycle::startup` lock-file discipline).
pub fn acquire_lock(config: &Config) -> Result<InstanceLock, LifecycleError> {
    std::fs::create_dir_all(&config.app_dir)?;
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    Ok(InstanceLock { file })
}

/// Load the persisted machine id, generating and persisting a fresh UUID
/// v4 on first run (spec.md §4.5 "Identity").
pub fn load_or_create_machine_id(config: &Config) -> Result<String, LifecycleError> {
    if let Ok(existing) = std::fs::read_to_string(&config.machine_id_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    let id = uuid::Uuid::new_v4().to_string();
    paths::atomic_write(&config.machine_id_path, id.as_bytes())?;
    Ok(id)
}

/// Write `daemon.json` so local clients can discover the socket path
/// without guessing (spec.md §4.2 "Socket descriptor").
pub fn write_descriptor(config: &Config, version: &str) -> Result<(), LifecycleError> {
    let descriptor = DaemonDescriptor {
        socket_path: config.socket_path.display().to_string(),
        pid: std::process::id(),
        started_at: chrono::Utc::now(),
        version: version.to_string(),
    };
    let json = serde_json::to_vec_pretty(&descriptor)?;
    paths::atomic_write(&config.daemon_descriptor_path, &json)?;
    Ok(())
}

/// Remove the socket file, lock file, and descriptor on graceful
/// shutdown. Best-effort: failures are logged, never fatal.
pub fn cleanup(config: &Config) {
    if config.socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            tracing::warn!(error = %e, "failed to remove socket file on shutdown");
        }
    }
    if config.daemon_descriptor_path.exists() {
        let _ = std::fs::remove_file(&config.daemon_descriptor_path);
    }
    info!("daemon shutdown complete");
}
