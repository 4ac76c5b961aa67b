//! Monotonic deadline clock

use std::time::Duration;
use tokio::time::Instant;

/// A time budget that started at a fixed instant.
///
/// Built on the tokio monotonic clock, so wall-clock adjustments never move
/// it and paused-clock tests can drive it deterministically.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Start a deadline now
    pub fn start(timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
        }
    }

    /// The full budget this deadline was created with
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time spent since the deadline started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Budget left; zero once the deadline has passed, never negative
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
