// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session adapter for testing

use super::{OutputSink, SessionAdapter, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded session call.
#[derive(Debug, Clone)]
pub enum SessionCall {
    Spawn {
        id: String,
        cwd: PathBuf,
        cmd: String,
        env: Vec<(String, String)>,
    },
    Write {
        id: String,
        data: Vec<u8>,
    },
    Resize {
        id: String,
        cols: u16,
        rows: u16,
    },
    Kill {
        id: String,
    },
    IsAlive {
        id: String,
    },
}

/// Fake session state, inspectable by tests.
#[derive(Debug, Clone)]
pub struct FakeSession {
    pub cwd: PathBuf,
    pub cmd: String,
    pub env: Vec<(String, String)>,
    pub written: Vec<u8>,
    pub alive: bool,
    pub cols: u16,
    pub rows: u16,
}

struct FakeSessionState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<SessionCall>,
    outputs: HashMap<String, OutputSink>,
}

/// In-memory `SessionAdapter` used by daemon- and dispatcher-level
/// tests so they never touch a real PTY.
#[derive(Clone)]
pub struct FakeSessionAdapter {
    inner: Arc<Mutex<FakeSessionState>>,
}

impl Default for FakeSessionAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeSessionState {
                sessions: HashMap::new(),
                calls: Vec::new(),
                outputs: HashMap::new(),
            })),
        }
    }
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    pub fn session(&self, id: &str) -> Option<FakeSession> {
        self.inner.lock().sessions.get(id).cloned()
    }

    /// Simulate PTY output arriving for `id`, delivered to whatever sink
    /// was registered on `spawn`.
    pub async fn push_output(&self, id: &str, data: &[u8]) {
        let sink = self.inner.lock().outputs.get(id).cloned();
        if let Some(sink) = sink {
            let _ = sink.send(data.to_vec()).await;
        }
    }

    /// Mark a session as terminated without going through `kill`
    /// (simulates the child process exiting on its own).
    pub fn simulate_exit(&self, id: &str) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.alive = false;
        }
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn spawn(
        &self,
        id: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
        on_output: OutputSink,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Spawn {
            id: id.to_string(),
            cwd: cwd.to_path_buf(),
            cmd: cmd.to_string(),
            env: env.to_vec(),
        });
        inner.sessions.insert(
            id.to_string(),
            FakeSession {
                cwd: cwd.to_path_buf(),
                cmd: cmd.to_string(),
                env: env.to_vec(),
                written: Vec::new(),
                alive: true,
                cols: 80,
                rows: 24,
            },
        );
        inner.outputs.insert(id.to_string(), on_output);
        Ok(())
    }

    async fn write(&self, id: &str, data: &[u8]) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Write {
            id: id.to_string(),
            data: data.to_vec(),
        });
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if !session.alive {
            return Err(SessionError::SessionGone(id.to_string()));
        }
        session.written.extend_from_slice(data);
        Ok(())
    }

    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Resize {
            id: id.to_string(),
            cols,
            rows,
        });
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.cols = cols;
        session.rows = rows;
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Kill { id: id.to_string() });
        if let Some(session) = inner.sessions.get_mut(id) {
            session.alive = false;
        }
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::IsAlive { id: id.to_string() });
        Ok(inner.sessions.get(id).map(|s| s.alive).unwrap_or(false))
    }
}
