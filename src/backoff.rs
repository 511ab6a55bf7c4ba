//! Exponential backoff for callers waiting on a full pool.

use std::time::{Duration, Instant};

/// How long and how often to retry leasing a box.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    /// First pause after a failed attempt.
    pub initial: Duration,
    /// Longest pause between attempts.
    pub max: Duration,
    /// Give up once this much time has passed.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl WaitPolicy {
    /// A backoff sequence for this policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial, self.max)
    }

    /// The instant after which waiting stops.
    pub fn deadline(&self, start: Instant) -> Instant {
        start + self.timeout
    }
}

/// Exponential backoff with configurable min/max.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    /// Creates a new backoff starting at `initial`, capping at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            max,
            current: initial.min(max),
        }
    }

    /// Returns the current backoff duration.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Advances to the next backoff interval (doubles, capped at max).
    pub fn next(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Pause before the next attempt, never sleeping past `deadline`.
    ///
    /// Returns `None` once the deadline has passed.
    pub fn pause_until(&mut self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        if remaining.is_zero() {
            return None;
        }
        let pause = self.current.min(remaining);
        self.next();
        Some(pause)
    }
}
