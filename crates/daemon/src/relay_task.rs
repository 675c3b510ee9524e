// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the Cloud Relay Client (spec.md §4.5) into the dispatcher:
//! relayed commands are routed through the same pipeline as local
//! control-socket commands, and session snapshots are broadcast on
//! registration and on every lifecycle change.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use varie_adapters::relay::{
    self, CommandHandler, CommandResultPayload, OutboundMessage, RelayHandle, SessionSnapshot,
};
use varie_adapters::SessionAdapter;
use varie_core::{Clock, IdGen, RelayStatus};

use crate::dispatcher::Dispatcher;
use crate::protocol::{Frame, Response};
use crate::session_manager::LifecycleEvent;

/// Env var used to override the relay base URL for local/dev runs. No
/// `config.yaml` key exists for it (spec.md §6 does not list one); the
/// production default is compiled in.
const RELAY_URL_ENV: &str = "VARIE_RELAY_URL";
const DEFAULT_RELAY_URL: &str = "wss://relay.varie.dev/ws";

/// Polling interval for noticing a `registered` transition so a status
/// snapshot can be broadcast immediately, mirroring the self-healing
/// timer idiom used by the control socket listener.
const REGISTRATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn relay_base_url() -> String {
    std::env::var(RELAY_URL_ENV).unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string())
}

struct DispatchCommandHandler<A, C, I> {
    dispatcher: Arc<Dispatcher<A, C, I>>,
    /// Set once `relay::run` hands back the handle it was spawned with;
    /// empty only for the brief window before that return (no command
    /// can arrive over an unconnected socket in that window).
    outbound: tokio::sync::OnceCell<RelayHandle>,
}

#[async_trait]
impl<A, C, I> CommandHandler for DispatchCommandHandler<A, C, I>
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    async fn handle(&self, request_id: String, command: serde_json::Value, source: String) {
        let Some(outbound) = self.outbound.get() else {
            warn!("relay: command arrived before handle was ready, dropping");
            return;
        };
        let frame: Frame = match serde_json::from_value(command) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, %source, "relay: malformed command payload");
                outbound.send(OutboundMessage::CommandResult {
                    request_id,
                    result: CommandResultPayload {
                        status: "error".to_string(),
                        session_id: None,
                        session_repo: None,
                        message: "malformed command".to_string(),
                        timestamp: Utc::now(),
                    },
                });
                return;
            }
        };

        let response = match frame {
            Frame::ListWorkers => self.dispatcher.list_workers(),
            Frame::Dispatch {
                target_session_id,
                message,
            } => self.dispatcher.dispatch(&target_session_id, &message).await,
            Frame::Route { query, message } => self.dispatcher.route(&query, &message).await,
            Frame::CreateWorker {
                repo,
                repo_path,
                task_id,
                claude_flags,
            } => {
                self.dispatcher
                    .create_worker(&repo, &repo_path, task_id, claude_flags)
                    .await
            }
            Frame::DiscoverProjects { path } => self.dispatcher.discover_projects(path).await,
            _ => {
                debug!(%source, "relay: command is not a dispatchable frame");
                outbound.send(OutboundMessage::CommandResult {
                    request_id,
                    result: CommandResultPayload {
                        status: "error".to_string(),
                        session_id: None,
                        session_repo: None,
                        message: "not a dispatch command".to_string(),
                        timestamp: Utc::now(),
                    },
                });
                return;
            }
        };

        let session_repo = response
            .session_id
            .as_deref()
            .and_then(|id| self.dispatcher.repo_of(id));

        outbound.send(OutboundMessage::CommandResult {
            request_id,
            result: CommandResultPayload {
                status: response.status,
                session_id: response.session_id,
                session_repo,
                message: response.message.unwrap_or_default(),
                timestamp: Utc::now(),
            },
        });
    }
}

fn snapshot_sessions<A, C, I>(dispatcher: &Dispatcher<A, C, I>) -> Vec<SessionSnapshot>
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    let Response {
        workers: Some(workers),
        ..
    } = dispatcher.list_workers()
    else {
        return Vec::new();
    };
    workers
        .into_iter()
        .map(|w| SessionSnapshot {
            id: w.session_id,
            repo: w.repo,
            task: w.task_id,
            status: "active".to_string(),
            last_activity: w.last_activity,
        })
        .collect()
}

/// Spawn the relay client and its lifecycle-event bridge. Returns the
/// handle immediately; the connection runs in the background for the
/// life of the process.
pub async fn spawn<A, C, I>(
    machine_id: String,
    version: String,
    token_provider: impl FnMut() -> Option<String> + Send + 'static,
    dispatcher: Arc<Dispatcher<A, C, I>>,
    mut lifecycle_rx: mpsc::Receiver<LifecycleEvent>,
) -> RelayHandle
where
    A: SessionAdapter,
    C: Clock,
    I: IdGen,
{
    // `relay::run` needs a `CommandHandler` up front but only returns the
    // `RelayHandle` the handler needs to reply with once it has set up
    // its internal channels; no inbound frame can reach `handle()` until
    // a connection is actually established, well after this returns.
    let handler = Arc::new(DispatchCommandHandler {
        dispatcher: dispatcher.clone(),
        outbound: tokio::sync::OnceCell::new(),
    });

    let handle = relay::run(
        machine_id,
        version,
        relay_base_url(),
        token_provider,
        handler.clone(),
    )
    .await;

    let _ = handler.outbound.set(handle.clone());

    let relay_handle = handle.clone();
    let bridge_dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        let mut last_status = RelayStatus::Disconnected;
        let mut poll = tokio::time::interval(REGISTRATION_POLL_INTERVAL);
        loop {
            tokio::select! {
                event = lifecycle_rx.recv() => {
                    match event {
                        Some(_) => {
                            relay_handle.send(OutboundMessage::Status {
                                sessions: snapshot_sessions(bridge_dispatcher.as_ref()),
                            });
                        }
                        None => return,
                    }
                }
                _ = poll.tick() => {
                    let status = relay_handle.snapshot().status;
                    if status == RelayStatus::Registered && last_status != RelayStatus::Registered {
                        relay_handle.send(OutboundMessage::Status {
                            sessions: snapshot_sessions(bridge_dispatcher.as_ref()),
                        });
                    }
                    last_status = status;
                }
            }
        }
    });

    handle
}
