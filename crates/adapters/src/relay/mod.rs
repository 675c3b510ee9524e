// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud Relay Client (spec.md §4.5): one outbound WebSocket to the
//! configured relay, forwarding remote commands into the dispatcher and
//! broadcasting session snapshots and activity events.

pub mod backoff;

use async_trait::async_trait;
use backoff::{Backoff, CloseReason};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;
use varie_core::{RelayState, RelayStatus};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid relay url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub repo: String,
    pub task: Option<String>,
    pub status: String,
    #[serde(rename = "lastActivity")]
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResultPayload {
    pub status: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "sessionRepo", skip_serializing_if = "Option::is_none")]
    pub session_repo: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Outbound frame shapes (spec.md §4.5 "Outbound message shapes").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Heartbeat,
    Status {
        sessions: Vec<SessionSnapshot>,
    },
    CommandResult {
        #[serde(rename = "requestId")]
        request_id: String,
        result: CommandResultPayload,
    },
    Stream {
        #[serde(rename = "sessionId")]
        session_id: String,
        event: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

/// Inbound frame shapes (spec.md §4.5 "Inbound message handling").
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Registered {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    Command {
        #[serde(rename = "requestId")]
        request_id: String,
        command: serde_json::Value,
        source: String,
    },
    #[serde(other)]
    Unknown,
}

/// Delegate invoked for every inbound `command` frame. The host process
/// routes it through the same pipeline as any other command and reports
/// the outcome back via the `outbound` sender.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    async fn handle(&self, request_id: String, command: serde_json::Value, source: String);
}

/// A stable handle to the relay's connection state plus a channel to
/// enqueue outbound messages. Cloning shares both.
#[derive(Clone)]
pub struct RelayHandle {
    state: Arc<Mutex<RelayState>>,
    outbound: mpsc::Sender<OutboundMessage>,
    disconnect: Arc<Notify>,
    disconnected_flag: Arc<std::sync::atomic::AtomicBool>,
}

impl RelayHandle {
    pub fn snapshot(&self) -> RelayState {
        self.state.lock().clone()
    }

    /// Enqueue an outbound message. The run loop silently drops it if
    /// the connection is not currently `registered` (spec.md §4.5
    /// "Send-while-not-registered rule").
    pub fn send(&self, message: OutboundMessage) {
        let _ = self.outbound.try_send(message);
    }

    /// User-initiated disconnect: cancels any pending reconnect and
    /// permanently stops the run loop.
    pub fn disconnect(&self) {
        self.disconnected_flag
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.disconnect.notify_waiters();
    }
}

/// Build the relay URL with the `token`/`machineId`/`version` query
/// parameters (spec.md §4.5 "URL + query").
pub fn build_url(base: &str, token: &str, machine_id: &str, version: &str) -> Result<Url, RelayError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("machineId", machine_id)
        .append_pair("version", version);
    Ok(url)
}

/// Run the relay client until [`RelayHandle::disconnect`] is called or a
/// terminal close code is received. Reconnects with [`Backoff`] on any
/// other disconnection, re-reading the token on every attempt since
/// bearer tokens expire.
pub async fn run<F>(
    machine_id: String,
    version: String,
    relay_base_url: String,
    mut token_provider: F,
    handler: Arc<dyn CommandHandler>,
) -> RelayHandle
where
    F: FnMut() -> Option<String> + Send + 'static,
{
    let state = Arc::new(Mutex::new(RelayState::new(machine_id.clone())));
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(256);
    let disconnect = Arc::new(Notify::new());
    let disconnected_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let handle = RelayHandle {
        state: state.clone(),
        outbound: outbound_tx,
        disconnect: disconnect.clone(),
        disconnected_flag: disconnected_flag.clone(),
    };

    tokio::spawn(async move {
        let mut backoff = Backoff::new();

        loop {
            if disconnected_flag.load(std::sync::atomic::Ordering::SeqCst) {
                state.lock().status = RelayStatus::Disconnected;
                return;
            }

            let Some(token) = token_provider() else {
                warn!("relay: no token configured, not connecting");
                return;
            };

            state.lock().status = RelayStatus::Connecting;
            let url = match build_url(&relay_base_url, &token, &machine_id, &version) {
                Ok(u) => u,
                Err(e) => {
                    state.lock().error = Some(e.to_string());
                    return;
                }
            };

            let connect_result =
                tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await;

            let ws_stream = match connect_result {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(e)) => {
                    state.lock().error = Some(e.to_string());
                    warn!(error = %e, "relay: connect failed");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff.next_delay()) => continue,
                        _ = disconnect.notified() => return,
                    }
                }
                Err(_) => {
                    state.lock().error = Some("connect timeout".to_string());
                    tokio::select! {
                        _ = tokio::time::sleep(backoff.next_delay()) => continue,
                        _ = disconnect.notified() => return,
                    }
                }
            };

            state.lock().status = RelayStatus::Connected;
            info!("relay: connected");

            let (mut write, mut read) = ws_stream.split();
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await; // first tick fires immediately; discard

            let close_reason = loop {
                tokio::select! {
                    _ = disconnect.notified() => {
                        let _ = write.close().await;
                        break CloseReason::UserInitiated;
                    }
                    _ = heartbeat.tick() => {
                        if state.lock().status == RelayStatus::Registered {
                            let _ = write
                                .send(Message::Text(serde_json::to_string(&OutboundMessage::Heartbeat).unwrap_or_default()))
                                .await;
                            state.lock().last_heartbeat = Some(Utc::now());
                        }
                    }
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(msg) => {
                                if state.lock().status == RelayStatus::Registered {
                                    if let Ok(text) = serde_json::to_string(&msg) {
                                        let _ = write.send(Message::Text(text)).await;
                                    }
                                }
                            }
                            None => break CloseReason::Transient,
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<InboundMessage>(&text) {
                                    Ok(InboundMessage::Registered { connection_id }) => {
                                        let mut s = state.lock();
                                        s.status = RelayStatus::Registered;
                                        s.connection_id = Some(connection_id);
                                        s.reconnect_attempts = 0;
                                        drop(s);
                                        backoff.reset();
                                    }
                                    Ok(InboundMessage::Command { request_id, command, source }) => {
                                        let handler = handler.clone();
                                        tokio::spawn(async move {
                                            handler.handle(request_id, command, source).await;
                                        });
                                    }
                                    Ok(InboundMessage::Unknown) => {
                                        debug!(%text, "relay: unknown inbound message type");
                                    }
                                    Err(e) => {
                                        debug!(error = %e, "relay: malformed inbound frame");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let code = frame.map(|f| f.code.into()).unwrap_or(1000);
                                break CloseReason::from_close_code(code);
                            }
                            Some(Ok(_)) => {}
                            Some(Err(_)) | None => break CloseReason::Transient,
                        }
                    }
                }
            };

            {
                let mut s = state.lock();
                s.status = RelayStatus::Disconnected;
                s.connection_id = None;
                s.reconnect_attempts += 1;
            }

            if close_reason.is_terminal() || disconnected_flag.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff.next_delay()) => continue,
                _ = disconnect.notified() => return,
            }
        }
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_includes_required_query_params() {
        let url = build_url("wss://relay.example/ws", "tok", "machine-1", "1.0.0").unwrap();
        let query = url.query().unwrap_or_default();
        assert!(query.contains("token=tok"));
        assert!(query.contains("machineId=machine-1"));
        assert!(query.contains("version=1.0.0"));
    }

    #[test]
    fn inbound_unknown_type_parses_without_error() {
        let parsed: InboundMessage = serde_json::from_str(r#"{"type":"something_new"}"#).unwrap();
        assert!(matches!(parsed, InboundMessage::Unknown));
    }

    #[test]
    fn inbound_registered_parses_connection_id() {
        let parsed: InboundMessage =
            serde_json::from_str(r#"{"type":"registered","connectionId":"c1"}"#).unwrap();
        match parsed {
            InboundMessage::Registered { connection_id } => assert_eq!(connection_id, "c1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outbound_heartbeat_serializes_to_bare_type_tag() {
        let json = serde_json::to_string(&OutboundMessage::Heartbeat).unwrap();
        assert_eq!(json, r#"{"type":"heartbeat"}"#);
    }
}
