// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skip-permissions safety-prompt auto-confirmer (spec.md §4.1.2).
//!
//! After the assistant is launched with `--dangerously-skip-permissions`,
//! it prints a one-time safety prompt whose default-selected choice is
//! "No, exit". This listener buffers PTY output, waits for the literal
//! string `Yes, I accept` to appear, then drives the prompt down to the
//! accept option with a deliberate sequence of delays so a coincidental
//! newline before the prompt renders can never confirm it by accident.

use std::time::Duration;
use tokio::sync::mpsc;
use varie_core::Clock;

const ACCEPT_MARKER: &str = "Yes, I accept";
const TIMEOUT: Duration = Duration::from_secs(15);
const POST_MATCH_DELAY: Duration = Duration::from_millis(300);
/// Gap the caller must hold between writing [`ConfirmAction::ArrowDown`]
/// and [`ConfirmAction::Newline`], so the confirming newline never lands
/// before the arrow-down has moved the selection off the default choice.
pub const POST_ARROW_DELAY: Duration = Duration::from_millis(150);
const ARROW_DOWN: &[u8] = b"\x1b[B";

/// What the confirmer decided to write, in order. Exposed for tests and
/// for the writer task that drives the real PTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    ArrowDown,
    Newline,
}

/// Watch `output` for the accept marker and yield the keystrokes to
/// send, in order. The caller is responsible for holding
/// [`POST_ARROW_DELAY`] between writing each returned action so the
/// 150 ms gap separates the arrow-down keystroke from the confirming
/// newline, rather than being spent before either is written.
/// Returns `None` if the marker never appeared within the 15 s budget
/// (the listener is silently removed, per spec).
pub async fn watch_for_accept_prompt<C: Clock>(
    clock: &C,
    mut output: mpsc::Receiver<Vec<u8>>,
) -> Option<Vec<ConfirmAction>> {
    let deadline = clock.now() + TIMEOUT;
    let mut buffer = String::new();

    loop {
        let remaining = deadline.saturating_duration_since(clock.now());
        if remaining.is_zero() {
            return None;
        }
        match tokio::time::timeout(remaining, output.recv()).await {
            Ok(Some(chunk)) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                if buffer.contains(ACCEPT_MARKER) {
                    clock.sleep(POST_MATCH_DELAY).await;
                    return Some(vec![ConfirmAction::ArrowDown, ConfirmAction::Newline]);
                }
            }
            Ok(None) => return None,
            Err(_elapsed) => return None,
        }
    }
}

/// Translate a `ConfirmAction` sequence into the literal bytes a
/// `SessionAdapter::write` should send.
pub fn action_bytes(action: ConfirmAction) -> &'static [u8] {
    match action {
        ConfirmAction::ArrowDown => ARROW_DOWN,
        ConfirmAction::Newline => b"\n",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use varie_core::SystemClock;

    #[tokio::test]
    async fn matches_marker_and_yields_arrow_then_newline() {
        let clock = SystemClock::default();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let _ = tx.send(format!("prompt...\n{ACCEPT_MARKER}\n").into_bytes()).await;
        });
        let actions = watch_for_accept_prompt(&clock, rx).await.unwrap();
        assert_eq!(
            actions,
            vec![ConfirmAction::ArrowDown, ConfirmAction::Newline]
        );
    }

    #[tokio::test]
    async fn channel_closed_without_marker_yields_none() {
        let clock = SystemClock::default();
        let (tx, rx) = mpsc::channel(16);
        drop(tx);
        assert!(watch_for_accept_prompt(&clock, rx).await.is_none());
    }

    #[test]
    fn action_bytes_match_documented_sequences() {
        assert_eq!(action_bytes(ConfirmAction::ArrowDown), b"\x1b[B");
        assert_eq!(action_bytes(ConfirmAction::Newline), b"\n");
    }
}
