// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session management adapters

mod pty;

pub use pty::PtySessionAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("session terminated: {0}")]
    SessionGone(String),
    #[error("operation not permitted on externally-owned session: {0}")]
    ExternalSession(String),
}

/// Adapter for managing one PTY-backed terminal session.
///
/// Unlike the tmux shell-out model, a `SessionAdapter` owns the PTY
/// master/slave pair directly: `spawn` allocates the PTY and starts the
/// reader loop, `write`/`resize` act on the live file descriptors, and
/// `kill` tears the child down. There is no `capture_output` or
/// `is_process_running` — output is observed only through the fan-out
/// callback passed to `spawn`.
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    /// Spawn a login shell in `cwd` running `cmd`, augmented with `env`.
    /// `on_output` is called from the reader task with each chunk read
    /// from the PTY master.
    async fn spawn(
        &self,
        id: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
        on_output: OutputSink,
    ) -> Result<(), SessionError>;

    /// Write raw bytes to the PTY.
    async fn write(&self, id: &str, data: &[u8]) -> Result<(), SessionError>;

    /// Resize the PTY's terminal dimensions.
    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError>;

    /// Kill the child process and release the PTY. Idempotent.
    async fn kill(&self, id: &str) -> Result<(), SessionError>;

    /// True while the child process has not exited.
    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;
}

/// Callback invoked with each chunk of PTY output, from whatever thread
/// the adapter's reader loop runs on.
pub type OutputSink = tokio::sync::mpsc::Sender<Vec<u8>>;
