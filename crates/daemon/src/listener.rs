// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control Socket Server (spec.md §4.2): accepts connections, frames
//! LF-delimited JSON, and routes events/dispatch commands to the
//! [`Dispatcher`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};
use varie_adapters::SessionAdapter;
use varie_core::{Clock, IdGen};

use crate::dispatcher::Dispatcher;
use crate::protocol::{self, Frame, Response};

/// Self-healing stat() interval (spec.md §4.2 "Self-healing").
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind socket at {0}: {1}")]
    Bind(PathBuf, std::io::Error),

    #[error("failed to set socket permissions: {0}")]
    Permissions(std::io::Error),
}

#[derive(Debug, Error)]
enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::wire::ProtocolError),
}

/// Bind the control socket, unlinking any stale path first, and chmod it
/// `0600` (spec.md §4.2 "Socket binding").
fn bind(socket_path: &std::path::Path) -> Result<UnixListener, ListenerError> {
    if socket_path.exists() {
        let _ = std::fs::remove_file(socket_path);
    }
    let listener = UnixListener::bind(socket_path)
        .map_err(|e| ListenerError::Bind(socket_path.to_path_buf(), e))?;
    set_socket_permissions(socket_path)?;
    Ok(listener)
}

#[cfg(unix)]
fn set_socket_permissions(socket_path: &std::path::Path) -> Result<(), ListenerError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
        .map_err(ListenerError::Permissions)
}

#[cfg(not(unix))]
fn set_socket_permissions(_socket_path: &std::path::Path) -> Result<(), ListenerError> {
    Ok(())
}

/// Owns the bound socket and accepts connections until told to stop.
/// Runs a parallel self-healing task that re-binds if the socket path
/// disappears out from under it.
pub struct Listener<A, C, I> {
    socket_path: PathBuf,
    listener: UnixListener,
    dispatcher: Arc<Dispatcher<A, C, I>>,
}

impl<A, C, I> Listener<A, C, I>
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn bind(socket_path: PathBuf, dispatcher: Arc<Dispatcher<A, C, I>>) -> Result<Self, ListenerError> {
        let listener = bind(&socket_path)?;
        info!(path = %socket_path.display(), "control socket bound");
        Ok(Self {
            socket_path,
            listener,
            dispatcher,
        })
    }

    /// Accept connections until `shutdown` resolves, self-healing the
    /// bind every [`HEALTH_CHECK_INTERVAL`].
    pub async fn run(mut self, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut health_check = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let dispatcher = Arc::clone(&self.dispatcher);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, dispatcher).await {
                                    debug!(error = %e, "connection ended");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "accept error"),
                    }
                }
                _ = health_check.tick() => {
                    if !self.socket_path.exists() {
                        warn!(path = %self.socket_path.display(), "socket path vanished, re-binding");
                        match bind(&self.socket_path) {
                            Ok(listener) => self.listener = listener,
                            Err(e) => error!(error = %e, "re-bind failed"),
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("listener shutting down");
                    return;
                }
            }
        }
    }
}

/// Handle one client connection: read frames until the stream closes,
/// acking events and replying-then-closing on the first dispatch
/// command (spec.md §4.2 "Dispatch commands ... closes the
/// connection").
async fn handle_connection<A, C, I>(
    stream: UnixStream,
    dispatcher: Arc<Dispatcher<A, C, I>>,
) -> Result<(), ConnectionError>
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = tokio::io::BufReader::new(reader);

    loop {
        let raw = match protocol::wire::read_frame(&mut reader).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let frame: Frame = match serde_json::from_slice(&raw) {
            Ok(frame) => frame,
            Err(_) => {
                let response = Response::error("Invalid JSON");
                protocol::wire::write_response(&mut writer, &response, protocol::wire::DEFAULT_TIMEOUT)
                    .await?;
                continue;
            }
        };

        if frame.is_event() {
            debug!(kind = frame.type_name(), "received event");
            let response = Response::event_ack(frame.type_name());
            protocol::wire::write_response(&mut writer, &response, protocol::wire::DEFAULT_TIMEOUT)
                .await?;
            continue;
        }

        let (response, timeout) = dispatch_frame(&dispatcher, frame).await;
        protocol::wire::write_response(&mut writer, &response, timeout).await?;
        return Ok(());
    }
}

async fn dispatch_frame<A, C, I>(
    dispatcher: &Dispatcher<A, C, I>,
    frame: Frame,
) -> (Response, Duration)
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    match frame {
        Frame::ListWorkers => (dispatcher.list_workers(), protocol::wire::DEFAULT_TIMEOUT),
        Frame::Dispatch { target_session_id, message } => (
            dispatcher.dispatch(&target_session_id, &message).await,
            protocol::wire::DISPATCH_TIMEOUT,
        ),
        Frame::Route { query, message } => (
            dispatcher.route(&query, &message).await,
            protocol::wire::ROUTE_TIMEOUT,
        ),
        Frame::CreateWorker {
            repo,
            repo_path,
            task_id,
            claude_flags,
        } => (
            dispatcher
                .create_worker(&repo, &repo_path, task_id, claude_flags)
                .await,
            protocol::wire::DEFAULT_TIMEOUT,
        ),
        Frame::DiscoverProjects { path } => (
            dispatcher.discover_projects(path).await,
            protocol::wire::DEFAULT_TIMEOUT,
        ),
        _ => (
            Response::error("not a dispatch command"),
            protocol::wire::DEFAULT_TIMEOUT,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use varie_adapters::session::FakeSessionAdapter;
    use varie_adapters::RepoResolver;
    use varie_core::{SequentialIdGen, SystemClock};

    fn test_dispatcher() -> Arc<Dispatcher<FakeSessionAdapter, SystemClock, SequentialIdGen>> {
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let sessions = crate::session_manager::SessionManager::new(
            FakeSessionAdapter::new(),
            Arc::new(SystemClock::default()),
            Arc::new(SequentialIdGen::new("s")),
            tx,
        );
        Arc::new(Dispatcher::new(
            sessions,
            Arc::new(RepoResolver::new()),
            PathBuf::from("/home/u"),
            PathBuf::from("/home/u/.varie/manager"),
            PathBuf::from("/home/u/.varie/projects.yaml"),
            "claude".to_string(),
            Arc::new(SystemClock::default()),
        ))
    }

    #[tokio::test]
    async fn event_frame_is_acked_and_connection_stays_open() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let listener = Listener::bind(socket_path.clone(), test_dispatcher()).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(listener.run(rx));

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        client
            .write_all(b"{\"type\":\"session_start\"}\n")
            .await
            .unwrap();
        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let response: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(response["status"], "ok");
        assert_eq!(response["received"], "session_start");

        let _ = tx.send(());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn list_workers_closes_connection_after_response() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let listener = Listener::bind(socket_path.clone(), test_dispatcher()).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(listener.run(rx));

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        client.write_all(b"{\"type\":\"list_workers\"}\n").await.unwrap();
        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let response: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(response["status"], "ok");
        assert_eq!(response["workers"], serde_json::json!([]));

        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "server should close connection after dispatch response");

        let _ = tx.send(());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_json_elicits_error_and_keeps_connection_open() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let listener = Listener::bind(socket_path.clone(), test_dispatcher()).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(listener.run(rx));

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        client.write_all(b"not json\n").await.unwrap();
        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let response: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(response["status"], "error");
        assert_eq!(response["message"], "Invalid JSON");

        let _ = tx.send(());
        handle.await.unwrap();
    }
}
