// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotent `CLAUDE.md` marker-section injection (spec.md §4.4).

use std::path::Path;
use thiserror::Error;

/// Unique header line identifying the injected section. Its presence
/// anywhere in the file is what makes injection idempotent.
pub const MARKER_HEADER: &str = "<!-- varie:managed-section:do-not-edit-below -->";

fn marker_body() -> String {
    format!(
        "{header}\n\
         ## Varie Workstation\n\
         \n\
         This repository is registered with the Varie workstation daemon.\n\
         Sessions created for this repo are tracked by the Manager Workspace\n\
         and may receive dispatched messages from the control socket.\n",
        header = MARKER_HEADER
    )
}

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of an injection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOutcome {
    /// File did not exist; nothing was written.
    Missing,
    /// Header already present; nothing was written.
    AlreadyPresent,
    /// Section was appended.
    Injected,
}

/// Inject the marker section into `path` if and only if the file
/// exists and does not already carry the header line (spec.md §4.4
/// "No-op if the file does not exist, or if the header line already
/// appears anywhere in the file").
pub fn inject(path: &Path) -> Result<MarkerOutcome, MarkerError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MarkerOutcome::Missing),
        Err(e) => return Err(e.into()),
    };

    if contents.contains(MARKER_HEADER) {
        return Ok(MarkerOutcome::AlreadyPresent);
    }

    let mut updated = contents;
    if !updated.ends_with('\n') {
        updated.push('\n');
    }
    if !updated.ends_with("\n\n") {
        updated.push('\n');
    }
    updated.push_str(&marker_body());

    crate::paths::atomic_write(path, updated.as_bytes())?;
    Ok(MarkerOutcome::Injected)
}
