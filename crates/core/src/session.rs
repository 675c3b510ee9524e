// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifier and the `Session` data model (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Opaque session identifier, generated, at most 32 ASCII characters.
    pub struct SessionId;
}

crate::define_id! {
    /// Identifier of a task a worker session was created for.
    pub struct TaskId;
}

/// Whether a session is the distinguished orchestrator or a repo-bound worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Orchestrator,
    Worker,
}

/// An owned handle to one PTY running the assistant (spec.md §3 "Session").
///
/// Invariants:
/// - exactly one owner of its PTY
/// - `id` is unique for the daemon's lifetime
/// - `external == true` implies no PTY operations are permitted on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub repo: String,
    pub path: PathBuf,
    pub kind: SessionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_flags: Option<String>,
}

impl Session {
    pub fn new(
        id: SessionId,
        repo: impl Into<String>,
        path: PathBuf,
        kind: SessionKind,
        task_id: Option<TaskId>,
        startup_flags: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            repo: repo.into(),
            path,
            kind,
            task_id,
            created_at: now,
            last_activity: now,
            external: false,
            startup_flags,
        }
    }

    pub fn new_external(
        id: SessionId,
        repo: impl Into<String>,
        path: PathBuf,
        kind: SessionKind,
        task_id: Option<TaskId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            repo: repo.into(),
            path,
            kind,
            task_id,
            created_at: now,
            last_activity: now,
            external: true,
            startup_flags: None,
        }
    }

    /// Record activity, enforcing the monotonically-non-decreasing invariant
    /// on `last_activity` (spec.md §8).
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}
