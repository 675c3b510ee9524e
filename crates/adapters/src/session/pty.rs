// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY-backed session adapter, built on `portable-pty`.

use super::{OutputSink, SessionAdapter, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

struct PtyInstance {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

/// `SessionAdapter` that allocates a real PTY per session via
/// `portable-pty` and spawns a login shell inside it.
#[derive(Clone, Default)]
pub struct PtySessionAdapter {
    instances: Arc<Mutex<HashMap<String, Arc<Mutex<PtyInstance>>>>>,
}

impl PtySessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, id: &str) -> Result<Arc<Mutex<PtyInstance>>, SessionError> {
        self.instances
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl SessionAdapter for PtySessionAdapter {
    async fn spawn(
        &self,
        id: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
        on_output: OutputSink,
    ) -> Result<(), SessionError> {
        if !cwd.exists() {
            return Err(SessionError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        let mut builder = CommandBuilder::new(&shell);
        builder.arg("-li");
        builder.arg("-c");
        builder.arg(cmd);
        builder.cwd(cwd);
        for (key, value) in env {
            builder.env(key, value);
        }
        builder.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let instance = Arc::new(Mutex::new(PtyInstance {
            master: pair.master,
            writer,
            child,
        }));
        self.instances.lock().insert(id.to_string(), instance);

        // Blocking PTY reads happen on a dedicated OS thread; chunks are
        // forwarded onto the async fan-out channel via `blocking_send`.
        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if on_output.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(())
    }

    async fn write(&self, id: &str, data: &[u8]) -> Result<(), SessionError> {
        let instance = self.get(id)?;
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = instance.lock();
            guard
                .writer
                .write_all(&data)
                .and_then(|_| guard.writer.flush())
        })
        .await
        .map_err(|e| SessionError::CommandFailed(e.to_string()))?
        .map_err(|e| SessionError::CommandFailed(e.to_string()))
    }

    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError> {
        let instance = self.get(id)?;
        let guard = instance.lock();
        guard
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::CommandFailed(e.to_string()))
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let Some(instance) = self.instances.lock().remove(id) else {
            return Ok(());
        };
        let mut guard = instance.lock();
        let _ = guard.child.kill();
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let instance = self.get(id)?;
        let mut guard = instance.lock();
        Ok(matches!(guard.child.try_wait(), Ok(None)))
    }
}
