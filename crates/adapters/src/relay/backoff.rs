// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect backoff policy for the Cloud Relay Client (spec.md §4.5).

use rand::Rng;
use std::time::Duration;

const INITIAL: Duration = Duration::from_millis(1000);
const CAP: Duration = Duration::from_secs(60);
const JITTER_FRACTION: f64 = 0.2;

/// Why the relay connection closed. Some reasons permanently disable
/// reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The connection dropped for any retryable reason (network error,
    /// server restart, unexpected close code).
    Transient,
    /// `disconnect()` was called by the host process.
    UserInitiated,
    /// Close code 4001: authentication failed.
    AuthFailed,
    /// Close code 4003: forbidden.
    Forbidden,
}

impl CloseReason {
    pub fn from_close_code(code: u16) -> Self {
        match code {
            4001 => CloseReason::AuthFailed,
            4003 => CloseReason::Forbidden,
            _ => CloseReason::Transient,
        }
    }

    /// True if the relay must never attempt to reconnect after this.
    pub fn is_terminal(self) -> bool {
        !matches!(self, CloseReason::Transient)
    }
}

/// Exponential backoff with jitter, doubling from 1000 ms up to a
/// 60-second cap, ±20% uniform jitter applied to each computed delay.
pub struct Backoff {
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { attempt: 0 }
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// The delay before the next attempt, and bump the internal attempt
    /// counter. Uses `rand::thread_rng` for jitter, so this is not
    /// deterministic under test; tests assert bounds, not exact values.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(6); // 1000ms * 2^6 = 64000ms > cap, so clamp search space
        let base = INITIAL.saturating_mul(1u32 << exp);
        let base = base.min(CAP);
        self.attempt += 1;

        let jitter_range = base.as_secs_f64() * JITTER_FRACTION;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        let millis = (base.as_secs_f64() + jitter).max(0.0) * 1000.0;
        Duration::from_millis(millis as u64)
    }
}
