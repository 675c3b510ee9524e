// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket client for the `varie` CLI.

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::UnixStream;
use varie_daemon::lifecycle::Config;
use varie_daemon::protocol::wire::{self, ProtocolError};

use crate::daemon_process::{
    cleanup_stale_socket, probe_socket, read_daemon_pid, start_daemon_background,
    stop_daemon_sync,
};

fn timeout_ipc() -> Duration {
    crate::env::timeout_ipc_ms().unwrap_or(Duration::from_secs(5))
}

fn timeout_connect() -> Duration {
    crate::env::timeout_connect_ms().unwrap_or(Duration::from_secs(5))
}

fn poll_interval() -> Duration {
    crate::env::connect_poll_ms().unwrap_or(Duration::from_millis(50))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("varied is not running")]
    DaemonNotRunning,

    #[error("failed to start varied: {0}")]
    DaemonStartFailed(String),

    #[error("timed out waiting for varied to start")]
    DaemonStartTimeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("daemon rejected request: {0}")]
    Rejected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] varie_daemon::lifecycle::LifecycleError),
}

pub struct DaemonClient {
    config: Config,
}

impl DaemonClient {
    /// Connect to an already-running daemon, no auto-start (queries).
    pub fn connect() -> Result<Self, ClientError> {
        let config = Config::load()?;
        if !config.socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self { config })
    }

    /// Connect, starting `varied` in the background if it isn't running
    /// (mutating commands: `create-worker`, `dispatch`, `route`, `discover`).
    pub fn connect_or_start() -> Result<Self, ClientError> {
        let config = Config::load()?;
        match Self::connect() {
            Ok(client) => {
                if probe_socket(&client.config.socket_path) {
                    Ok(client)
                } else {
                    cleanup_stale_socket(&config);
                    let child = start_daemon_background()?;
                    Self::connect_with_retry(config, timeout_connect(), child)
                }
            }
            Err(ClientError::DaemonNotRunning) => {
                let child = start_daemon_background()?;
                Self::connect_with_retry(config, timeout_connect(), child)
            }
            Err(e) => Err(e),
        }
    }

    fn connect_with_retry(
        config: Config,
        timeout: Duration,
        mut child: std::process::Child,
    ) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(ClientError::DaemonStartFailed(format!(
                    "varied exited with {status}"
                )));
            }
            if config.socket_path.exists() && probe_socket(&config.socket_path) {
                return Ok(Self { config });
            }
            std::thread::sleep(poll_interval());
        }
        Err(ClientError::DaemonStartTimeout)
    }

    /// Send one frame and return the raw JSON response.
    async fn send(&self, frame: &Value) -> Result<Value, ClientError> {
        let stream = UnixStream::connect(&self.config.socket_path).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = tokio::io::BufReader::new(read_half);

        let data = wire::encode(frame)?;
        tokio::time::timeout(timeout_ipc(), wire::write_frame(&mut write_half, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response: Value = wire::read_request(&mut reader, timeout_ipc()).await?;
        Ok(response)
    }

    fn reject(response: Value) -> Result<Value, ClientError> {
        if response.get("status").and_then(Value::as_str) == Some("error") {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ClientError::Rejected(message));
        }
        Ok(response)
    }

    pub async fn list_workers(&self) -> Result<Value, ClientError> {
        let response = self.send(&json!({"type": "list_workers"})).await?;
        Self::reject(response)
    }

    pub async fn dispatch(&self, target_session_id: &str, message: &str) -> Result<Value, ClientError> {
        let response = self
            .send(&json!({
                "type": "dispatch",
                "targetSessionId": target_session_id,
                "message": message,
            }))
            .await?;
        Self::reject(response)
    }

    pub async fn route(&self, query: &str, message: &str) -> Result<Value, ClientError> {
        let response = self
            .send(&json!({"type": "route", "query": query, "message": message}))
            .await?;
        Self::reject(response)
    }

    pub async fn create_worker(
        &self,
        repo: &str,
        repo_path: &str,
        task_id: Option<&str>,
        claude_flags: Option<&str>,
    ) -> Result<Value, ClientError> {
        let response = self
            .send(&json!({
                "type": "create_worker",
                "repo": repo,
                "repoPath": repo_path,
                "taskId": task_id,
                "claudeFlags": claude_flags,
            }))
            .await?;
        Self::reject(response)
    }

    pub async fn discover_projects(&self, path: Option<&str>) -> Result<Value, ClientError> {
        let response = self
            .send(&json!({"type": "discover_projects", "path": path}))
            .await?;
        Self::reject(response)
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.config.socket_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Stop a running daemon, waiting up to the exit timeout for it to go away.
pub fn stop_daemon() -> Result<bool, ClientError> {
    let config = Config::load()?;
    let was_running = read_daemon_pid(&config).is_some_and(crate::daemon_process::process_exists);
    stop_daemon_sync(&config);
    Ok(was_running)
}
