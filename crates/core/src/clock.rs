// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so timing-sensitive logic (readiness settle windows,
//! the 300 ms command/newline gap, relay backoff) can be tested without
//! real wall-clock waits.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current time, abstracted for deterministic tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Sleep for `dur`. Real clocks delegate to `tokio::time::sleep`; fake
    /// clocks used in tests resolve immediately and just record the call.
    fn sleep(&self, dur: Duration) -> futures_delay::DelayFuture;
}

mod futures_delay {
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    /// Boxed future returned by `Clock::sleep`.
    pub struct DelayFuture(pub(super) Pin<Box<dyn Future<Output = ()> + Send>>);

    impl DelayFuture {
        pub fn real(dur: Duration) -> Self {
            Self(Box::pin(tokio::time::sleep(dur)))
        }

        pub fn immediate() -> Self {
            Self(Box::pin(async {}))
        }
    }

    impl Future for DelayFuture {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            self.0.as_mut().poll(cx)
        }
    }
}

pub use futures_delay::DelayFuture;

/// Real wall-clock implementation backed by `tokio::time`.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, dur: Duration) -> DelayFuture {
        DelayFuture::real(dur)
    }
}

/// Deterministic clock for tests: `now()` advances only when `advance()` is
/// called, and `sleep()` resolves immediately while recording the requested
/// duration so tests can assert on the *intended* wait without incurring it.
#[derive(Clone, Default)]
pub struct FakeClock {
    inner: Arc<parking_lot::Mutex<FakeClockState>>,
}

#[derive(Default)]
struct FakeClockState {
    elapsed: Duration,
    recorded_sleeps: Vec<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, dur: Duration) {
        self.inner.lock().elapsed += dur;
    }

    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.inner.lock().recorded_sleeps.clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        // `Instant` has no stable "from epoch" constructor; callers that need
        // to compare durations should rely on `recorded_sleeps` instead.
        Instant::now()
    }

    fn sleep(&self, dur: Duration) -> DelayFuture {
        self.inner.lock().recorded_sleeps.push(dur);
        DelayFuture::immediate()
    }
}
