// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Manager (spec.md §4.1): spawns and owns PTY children, streams
//! their output, accepts writes/resizes/dispatches, and detects
//! "assistant is ready".

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use varie_adapters::{confirmer, readiness, SessionAdapter};
use varie_core::{Clock, DaemonError, IdGen, Session, SessionId, SessionKind, TaskId};

const STARTUP_SETTLE: Duration = Duration::from_secs(1);
const POST_INTERRUPT_DELAY: Duration = Duration::from_millis(100);
const POST_START_WAIT: Duration = Duration::from_millis(1500);
const POST_START_WAIT_SKIP_PERMISSIONS: Duration = Duration::from_millis(4000);
const NEWLINE_GAP: Duration = Duration::from_millis(300);
const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";

/// Broadcast capacity for PTY output fan-out. Sized generously; slow
/// consumers (a detached `wait_for_assistant_ready` caller) drop frames
/// rather than block the PTY reader, which is the correct tradeoff for
/// a live terminal stream.
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle events emitted by the Session Manager for the listener and
/// relay to observe.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Created { session_id: SessionId },
    Closed { session_id: SessionId },
    Terminated { session_id: SessionId },
}

struct SessionEntry {
    session: Session,
    /// `None` for external sessions (no PTY to fan out).
    output: Option<broadcast::Sender<Vec<u8>>>,
    assistant_cmd: String,
}

/// Owns the session table and every PTY. Generic over the session
/// adapter (real PTYs in production, fakes in tests) and the clock
/// (real sleeps in production, recorded-but-instant in tests).
pub struct SessionManager<A, C, I> {
    adapter: A,
    clock: Arc<C>,
    id_gen: Arc<I>,
    table: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
    lifecycle: mpsc::Sender<LifecycleEvent>,
}

impl<A, C, I> Clone for SessionManager<A, C, I>
where
    A: Clone,
{
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            clock: self.clock.clone(),
            id_gen: self.id_gen.clone(),
            table: self.table.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<A, C, I> SessionManager<A, C, I>
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(
        adapter: A,
        clock: Arc<C>,
        id_gen: Arc<I>,
        lifecycle: mpsc::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            adapter,
            clock,
            id_gen,
            table: Arc::new(Mutex::new(HashMap::new())),
            lifecycle,
        }
    }

    fn resolve_path(path: &Path, kind: SessionKind, home: &Path, manager_dir: &Path) -> PathBuf {
        if kind == SessionKind::Orchestrator {
            return manager_dir.to_path_buf();
        }
        if path.as_os_str().is_empty() || !path.exists() {
            return home.to_path_buf();
        }
        path.to_path_buf()
    }

    /// Spawn a new owned session (spec.md §4.1 `create`).
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        repo: impl Into<String>,
        path: &Path,
        kind: SessionKind,
        task_id: Option<TaskId>,
        startup_flags: Option<String>,
        assistant_cmd: &str,
        home: &Path,
        manager_dir: &Path,
    ) -> Result<SessionId, DaemonError> {
        let id = SessionId::from(self.id_gen.next());
        let resolved_path = Self::resolve_path(path, kind, home, manager_dir);
        let repo = repo.into();

        let mut env = vec![("VARIE_SESSION_ID".to_string(), id.as_str().to_string())];
        if kind == SessionKind::Orchestrator {
            env.push(("VARIE_MANAGER_SESSION".to_string(), "1".to_string()));
        }

        let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(256);
        let (broadcast_tx, _) = broadcast::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);

        self.adapter
            .spawn(id.as_str(), &resolved_path, "exec $SHELL", &env, output_tx)
            .await
            .map_err(|e| DaemonError::SpawnFailed(e.to_string()))?;

        spawn_broadcast_bridge(output_rx, broadcast_tx.clone());

        let now = chrono::Utc::now();
        let session = Session::new(
            id.clone(),
            repo,
            resolved_path,
            kind,
            task_id,
            startup_flags.clone(),
            now,
        );

        let full_cmd = match &startup_flags {
            Some(flags) => format!("{assistant_cmd} {flags}"),
            None => assistant_cmd.to_string(),
        };

        self.table.lock().insert(
            id.clone(),
            SessionEntry {
                session,
                output: Some(broadcast_tx.clone()),
                assistant_cmd: full_cmd.clone(),
            },
        );

        let skip_permissions = startup_flags
            .as_deref()
            .map(|f| f.contains(SKIP_PERMISSIONS_FLAG))
            .unwrap_or(false);

        if skip_permissions {
            self.install_confirmer(&id, broadcast_tx.subscribe());
        }

        self.clock.sleep(STARTUP_SETTLE).await;
        let command = format!("clear && {full_cmd}\n");
        let _ = self.adapter.write(id.as_str(), command.as_bytes()).await;

        let _ = self
            .lifecycle
            .send(LifecycleEvent::Created {
                session_id: id.clone(),
            })
            .await;

        Ok(id)
    }

    /// Register a session the daemon does not own the PTY for (spec.md
    /// §4.1 `register_external`).
    pub fn register_external(
        &self,
        id: SessionId,
        repo: impl Into<String>,
        path: PathBuf,
        kind: SessionKind,
        task_id: Option<TaskId>,
    ) {
        let session = Session::new_external(id.clone(), repo.into(), path, kind, task_id, chrono::Utc::now());
        self.table.lock().insert(
            id,
            SessionEntry {
                session,
                output: None,
                assistant_cmd: String::new(),
            },
        );
    }

    fn install_confirmer(&self, id: &SessionId, output: broadcast::Receiver<Vec<u8>>) {
        let adapter = self.adapter.clone();
        let clock = self.clock.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let rx = bridge_broadcast_to_mpsc(output);
            if let Some(actions) = confirmer::watch_for_accept_prompt(clock.as_ref(), rx).await {
                let mut actions = actions.into_iter().peekable();
                while let Some(action) = actions.next() {
                    let _ = adapter
                        .write(id.as_str(), confirmer::action_bytes(action))
                        .await;
                    if actions.peek().is_some() {
                        clock.sleep(confirmer::POST_ARROW_DELAY).await;
                    }
                }
            }
        });
    }

    fn require_owned<'a>(
        &self,
        table: &'a mut HashMap<SessionId, SessionEntry>,
        id: &SessionId,
    ) -> Result<&'a mut SessionEntry, DaemonError> {
        let entry = table
            .get_mut(id)
            .ok_or_else(|| DaemonError::NotFound(id.as_str().to_string()))?;
        if entry.session.external {
            return Err(DaemonError::ExternalSession(id.as_str().to_string()));
        }
        Ok(entry)
    }

    pub async fn write(&self, id: &SessionId, data: &[u8]) -> Result<(), DaemonError> {
        {
            let mut table = self.table.lock();
            let entry = self.require_owned(&mut table, id)?;
            entry.session.touch(chrono::Utc::now());
        }
        self.adapter
            .write(id.as_str(), data)
            .await
            .map_err(|e| DaemonError::DispatchFailed(e.to_string()))
    }

    pub async fn resize(&self, id: &SessionId, cols: u16, rows: u16) -> Result<(), DaemonError> {
        {
            let mut table = self.table.lock();
            let entry = self.require_owned(&mut table, id)?;
            entry.session.touch(chrono::Utc::now());
        }
        self.adapter
            .resize(id.as_str(), cols, rows)
            .await
            .map_err(|e| DaemonError::DispatchFailed(e.to_string()))
    }

    /// Deliver a command to a session (spec.md §4.1 `dispatch`).
    pub async fn dispatch(
        &self,
        id: &SessionId,
        command: &str,
        ensure_assistant: bool,
        auto_send_enter: bool,
    ) -> Result<(), DaemonError> {
        let (assistant_cmd, skip_permissions, output) = {
            let mut table = self.table.lock();
            let entry = self.require_owned(&mut table, id)?;
            let skip_permissions = entry
                .session
                .startup_flags
                .as_deref()
                .map(|f| f.contains(SKIP_PERMISSIONS_FLAG))
                .unwrap_or(false);
            entry.session.touch(chrono::Utc::now());
            (
                entry.assistant_cmd.clone(),
                skip_permissions,
                entry.output.clone(),
            )
        };

        if ensure_assistant {
            self.adapter.write(id.as_str(), &[0x03]).await.ok(); // interrupt byte
            self.clock.sleep(POST_INTERRUPT_DELAY).await;
            let restart = format!("{assistant_cmd}\n");
            self.adapter
                .write(id.as_str(), restart.as_bytes())
                .await
                .map_err(|e| DaemonError::DispatchFailed(e.to_string()))?;
            if skip_permissions {
                if let Some(output) = output {
                    self.install_confirmer(id, output.subscribe());
                }
            }
            let wait = if skip_permissions {
                POST_START_WAIT_SKIP_PERMISSIONS
            } else {
                POST_START_WAIT
            };
            self.clock.sleep(wait).await;
        }

        self.adapter
            .write(id.as_str(), command.as_bytes())
            .await
            .map_err(|e| DaemonError::DispatchFailed(e.to_string()))?;

        if auto_send_enter {
            self.clock.sleep(NEWLINE_GAP).await;
            self.adapter
                .write(id.as_str(), b"\n")
                .await
                .map_err(|e| DaemonError::DispatchFailed(e.to_string()))?;
        }

        Ok(())
    }

    /// Kill the PTY (if owned) and remove the session. Idempotent.
    pub async fn close(&self, id: &SessionId) -> Result<(), DaemonError> {
        let owned = {
            let mut table = self.table.lock();
            match table.remove(id) {
                Some(entry) => !entry.session.external,
                None => return Ok(()),
            }
        };
        if owned {
            let _ = self.adapter.kill(id.as_str()).await;
        }
        let _ = self
            .lifecycle
            .send(LifecycleEvent::Closed {
                session_id: id.clone(),
            })
            .await;
        Ok(())
    }

    pub async fn close_all(&self) {
        let ids: Vec<SessionId> = self.table.lock().keys().cloned().collect();
        for id in ids {
            let _ = self.close(&id).await;
        }
    }

    /// Wait for the assistant to become ready (spec.md §4.1
    /// `wait_for_assistant_ready`).
    pub async fn wait_for_assistant_ready(&self, id: &SessionId, timeout: Duration) -> bool {
        let output = {
            let table = self.table.lock();
            table.get(id).and_then(|e| e.output.clone())
        };
        let Some(output) = output else {
            return false;
        };
        let rx = bridge_broadcast_to_mpsc(output.subscribe());
        readiness::wait_for_assistant_ready(self.clock.as_ref(), rx, timeout).await
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.table.lock().get(id).map(|e| e.session.clone())
    }

    pub fn list(&self) -> Vec<Session> {
        self.table.lock().values().map(|e| e.session.clone()).collect()
    }
}

fn spawn_broadcast_bridge(mut rx: mpsc::Receiver<Vec<u8>>, tx: broadcast::Sender<Vec<u8>>) {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            let _ = tx.send(chunk);
        }
    });
}

/// Bridge a `broadcast::Receiver` into an `mpsc::Receiver` so callers
/// that expect the adapter's output-sink shape (readiness detection,
/// the safety-prompt confirmer) can subscribe independently of the
/// primary fan-out.
fn bridge_broadcast_to_mpsc(mut rx: broadcast::Receiver<Vec<u8>>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, out_rx) = mpsc::channel(256);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(chunk) => {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}
