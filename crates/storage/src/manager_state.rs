// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager state: `{last_updated, active_sessions[], recent_context[]}`
//! (spec.md §3). Auto-saved every 5 minutes and on lifecycle events;
//! cleared on daemon start since stale sessions never survive a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerStateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveSessionSummary {
    pub session_id: String,
    pub repo: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagerState {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub active_sessions: Vec<ActiveSessionSummary>,
    #[serde(default)]
    pub recent_context: Vec<String>,
}

impl ManagerState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_updated: now,
            active_sessions: Vec::new(),
            recent_context: Vec::new(),
        }
    }

    /// Load from disk. Per spec.md §3 "Cleared on daemon start", callers
    /// at daemon startup should discard the loaded `active_sessions` and
    /// start from a fresh list; this function only performs the raw
    /// load, leaving that policy decision to the caller.
    pub fn load(path: &Path, now: DateTime<Utc>) -> Result<Self, ManagerStateError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_yaml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(now)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ManagerStateError> {
        let yaml = serde_yaml::to_string(self)?;
        crate::paths::atomic_write(path, yaml.as_bytes())?;
        Ok(())
    }

    /// Drop `active_sessions`, the on-start-clear policy from spec.md §3.
    pub fn cleared_for_restart(mut self, now: DateTime<Utc>) -> Self {
        self.active_sessions.clear();
        self.last_updated = now;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn missing_file_yields_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = ManagerState::load(&dir.path().join("state.yaml"), t(1)).unwrap();
        assert!(state.active_sessions.is_empty());
    }

    #[test]
    fn restart_clears_active_sessions_but_keeps_context() {
        let mut state = ManagerState::new(t(1));
        state.active_sessions.push(ActiveSessionSummary {
            session_id: "s1".into(),
            repo: "app".into(),
            kind: "worker".into(),
        });
        state.recent_context.push("note".into());
        let restarted = state.cleared_for_restart(t(2));
        assert!(restarted.active_sessions.is_empty());
        assert_eq!(restarted.recent_context, vec!["note".to_string()]);
        assert_eq!(restarted.last_updated, t(2));
    }

    #[test]
    fn round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        let mut state = ManagerState::new(t(5));
        state.recent_context.push("ctx".into());
        state.save(&path).unwrap();
        let loaded = ManagerState::load(&path, t(99)).unwrap();
        assert_eq!(loaded, state);
    }
}
