//! Bounded polling with cancellation.
//!
//! Every wait in the harness (UI changes, text appearance, logcat
//! patterns) goes through [`poll_until`], so the deadline/interval/cancel
//! handling lives in exactly one place. Sleeps are condvar-backed: a
//! cancelled token wakes sleepers immediately instead of letting them run
//! out their interval.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Default deadline for wait operations.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Cooperative cancellation token shared between the orchestration flow
/// and in-flight waits. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel, waking any sleeper immediately.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut cancelled) = lock.lock() {
            *cancelled = true;
        }
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|c| *c).unwrap_or(true)
    }

    /// Sleep for `duration` or until cancelled, whichever comes first.
    /// Returns `false` if the token was cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let Ok(mut cancelled) = lock.lock() else {
            return false;
        };
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            match cvar.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => cancelled = guard,
                Err(_) => return false,
            }
        }
        false
    }
}

/// Outcome of a bounded wait.
#[derive(Debug, Clone)]
pub struct WaitOutcome<T> {
    /// Whether the predicate produced a value before the deadline
    pub found: bool,

    /// The produced value, when found
    pub value: Option<T>,

    /// Wall-clock time spent in the wait
    pub elapsed: Duration,

    /// Number of times the poll closure ran
    pub attempts: u32,
}

impl<T> WaitOutcome<T> {
    fn not_found(start: Instant, attempts: u32) -> Self {
        Self {
            found: false,
            value: None,
            elapsed: start.elapsed(),
            attempts,
        }
    }
}

/// Poll `poll` every `interval` until it yields a value, the deadline
/// passes, or the token is cancelled. The poll closure runs at least once
/// even when `timeout < interval`. A deadline overrun is reported as
/// `found = false`, never as an error; the caller decides severity.
pub fn poll_until<T>(
    mut poll: impl FnMut() -> Option<T>,
    timeout: Duration,
    interval: Duration,
    cancel: &CancelToken,
) -> WaitOutcome<T> {
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return WaitOutcome::not_found(start, attempts);
        }

        attempts += 1;
        if let Some(value) = poll() {
            return WaitOutcome {
                found: true,
                value: Some(value),
                elapsed: start.elapsed(),
                attempts,
            };
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return WaitOutcome::not_found(start, attempts);
        }
        let nap = interval.min(timeout - elapsed);
        if !cancel.sleep(nap) {
            return WaitOutcome::not_found(start, attempts);
        }
    }
}
