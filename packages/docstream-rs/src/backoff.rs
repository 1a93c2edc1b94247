//! Explicit reconnect backoff state.
//!
//! The backoff is a plain value: `unjittered()` is a pure function of the
//! attempt counter, so the growth schedule can be unit-tested without
//! timers. `next_delay()` applies ±25% jitter and advances the counter;
//! `reset()` is called after any successful poll.

use std::time::Duration;

/// Jitter applied to each delay, as a fraction of the unjittered value.
const JITTER_FRACTION: f64 = 0.25;

/// Exponential backoff with jitter and a hard cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff starting at `base` and never exceeding `cap`.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Number of consecutive failures recorded so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The delay for the current attempt before jitter: `base * 2^attempt`,
    /// capped.
    pub fn unjittered(&self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.cap).min(self.cap)
    }

    /// Take the next delay (with jitter) and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let unjittered = self.unjittered();
        self.attempt = self.attempt.saturating_add(1);

        // Uniform jitter in [1 - f, 1 + f].
        let spread = 1.0 + JITTER_FRACTION * (fastrand::f64() * 2.0 - 1.0);
        unjittered.mul_f64(spread).min(self.cap.mul_f64(1.0 + JITTER_FRACTION))
    }

    /// Clear the failure streak after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
