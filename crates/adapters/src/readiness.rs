// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! "Assistant is ready" detection (spec.md §4.1 `wait_for_assistant_ready`).
//!
//! Two independent success conditions race against a timeout: the
//! multi-byte prompt glyph appearing in the stream, or 2000 ms of
//! silence after some output has been seen. The first 1500 ms of output
//! is ignored outright (shell prompt noise from the login shell itself).

use std::time::Duration;
use tokio::sync::mpsc;
use varie_core::Clock;

/// The glyph the assistant prints once its own prompt is ready. Encoded
/// as UTF-8 bytes since PTY output is a raw byte stream, not `str`.
const READY_GLYPH: &str = "\u{25B8}"; // "▸"

const IGNORE_WINDOW: Duration = Duration::from_millis(1500);
const SILENCE_WINDOW: Duration = Duration::from_millis(2000);

/// Wait for the assistant to become ready, or for `timeout` to elapse.
///
/// Returns `true` if the glyph was seen, or if silence settled after
/// output was observed, or (on timeout) if any output was observed at
/// all; returns `false` only if the PTY produced nothing in `timeout`.
pub async fn wait_for_assistant_ready<C: Clock>(
    clock: &C,
    mut output: mpsc::Receiver<Vec<u8>>,
    timeout: Duration,
) -> bool {
    let deadline = clock.now() + timeout;
    let mut buffer = String::new();
    let mut seen_any_output = false;
    let mut ignoring = true;
    let started = clock.now();

    loop {
        let remaining = deadline.saturating_duration_since(clock.now());
        if remaining.is_zero() {
            return seen_any_output;
        }

        let silence_budget = if seen_any_output && !ignoring {
            SILENCE_WINDOW.min(remaining)
        } else {
            remaining
        };

        let recv = tokio::time::timeout(silence_budget, output.recv()).await;
        match recv {
            Ok(Some(chunk)) => {
                if ignoring && clock.now().saturating_duration_since(started) >= IGNORE_WINDOW {
                    ignoring = false;
                }
                if !chunk.is_empty() {
                    seen_any_output = true;
                }
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                if !ignoring && buffer.contains(READY_GLYPH) {
                    return true;
                }
            }
            Ok(None) => {
                // Channel closed: the session terminated.
                return seen_any_output;
            }
            Err(_elapsed) => {
                if seen_any_output && !ignoring {
                    // No output for SILENCE_WINDOW after the ignore
                    // window closed: settled.
                    return true;
                }
                if ignoring {
                    ignoring = false;
                    continue;
                }
                return seen_any_output;
            }
        }
    }
}
