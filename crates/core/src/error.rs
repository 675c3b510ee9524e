// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy (spec.md §7).
//!
//! One `thiserror` enum at the response boundary, matching the spec's flat
//! taxonomy; adapter crates keep their own narrower error types
//! (`SessionError`, `ResolverError`, `RelayError`) and convert into this one
//! with `#[from]` where a response needs to be produced.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DaemonError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation not permitted on externally-owned session: {0}")]
    ExternalSession(String),

    #[error("failed to spawn session: {0}")]
    SpawnFailed(String),

    #[error("ambiguous repo query")]
    Ambiguous,

    #[error("unknown repo: {0}")]
    RepoUnknown(String),

    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed")]
    AuthFailed,
}

impl DaemonError {
    /// Human-readable message surfaced to clients (spec.md §7 "all error
    /// responses carry a human-readable message").
    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_message() {
        let errs = [
            DaemonError::InvalidInput("x".into()),
            DaemonError::NotFound("x".into()),
            DaemonError::ExternalSession("x".into()),
            DaemonError::SpawnFailed("x".into()),
            DaemonError::Ambiguous,
            DaemonError::RepoUnknown("x".into()),
            DaemonError::DispatchFailed("x".into()),
            DaemonError::Transport("x".into()),
            DaemonError::AuthFailed,
        ];
        for e in errs {
            assert!(!e.message().is_empty());
        }
    }
}
