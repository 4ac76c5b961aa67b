//! The condition poller

use std::future::Future;
use std::time::Duration;

use crate::common::{Error, Result};

use super::{Cancellation, Deadline};

/// Default interval between predicate evaluations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Timing of one wait
///
/// No `Default`: every wait names its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    timeout: Duration,
    interval: Duration,
}

impl PollOptions {
    /// Options with the given timeout and the default interval
    ///
    /// When the timeout is not larger than the default interval, the interval
    /// shrinks to a tenth of the timeout so the predicate still gets polled.
    pub fn new(timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::Config("wait timeout must be greater than zero".to_string()));
        }
        let interval = if DEFAULT_POLL_INTERVAL < timeout {
            DEFAULT_POLL_INTERVAL
        } else {
            (timeout / 10).max(Duration::from_millis(1))
        };
        Self { timeout, interval }.validated()
    }

    /// Replace the poll interval; it must stay in `(0, timeout)`
    pub fn with_interval(self, interval: Duration) -> Result<Self> {
        Self { interval, ..self }.validated()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn validated(self) -> Result<Self> {
        if self.interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".to_string()));
        }
        if self.interval >= self.timeout {
            return Err(Error::Config(format!(
                "poll interval ({:?}) must be shorter than the timeout ({:?})",
                self.interval, self.timeout
            )));
        }
        Ok(self)
    }
}

/// How a wait resolved when the predicate never errored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate returned true
    Satisfied { attempts: u32, elapsed: Duration },
    /// The deadline passed first
    TimedOut { attempts: u32, elapsed: Duration },
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Satisfied { attempts, .. } | PollOutcome::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Treat a timeout as an error naming what was awaited
    pub fn into_result(self, what: &str) -> Result<()> {
        match self {
            PollOutcome::Satisfied { .. } => Ok(()),
            PollOutcome::TimedOut { elapsed, .. } => Err(Error::timeout(what, elapsed)),
        }
    }
}

/// Wait until `predicate` returns true, the deadline passes, or the
/// predicate fails.
///
/// The predicate is evaluated immediately, then after sleeping
/// `min(interval, remaining)` between evaluations. It is always evaluated
/// before expiry is checked, so a condition that holds at the expiry instant
/// counts as satisfied. A predicate error ends the wait at once; it is never
/// assumed to be transient.
///
/// Each evaluation is raced against the deadline: one that is still running
/// when the remaining budget (or half an interval, if that is longer) runs
/// out is abandoned and the wait times out.
pub async fn wait_until<F, Fut>(
    mut predicate: F,
    options: &PollOptions,
    cancel: &Cancellation,
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Deadline::start(options.timeout);
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        attempts += 1;
        // An evaluation may overrun the deadline by at most half an interval
        let budget = deadline.remaining().max(options.interval / 2);
        let satisfied = tokio::select! {
            biased;
            verdict = predicate() => verdict?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(budget) => {
                tracing::debug!(
                    attempts,
                    timeout = ?options.timeout,
                    "Condition evaluation overran the deadline"
                );
                return Ok(PollOutcome::TimedOut {
                    attempts,
                    elapsed: deadline.elapsed(),
                });
            }
        };
        if satisfied {
            tracing::trace!(attempts, "Condition satisfied");
            return Ok(PollOutcome::Satisfied {
                attempts,
                elapsed: deadline.elapsed(),
            });
        }

        let remaining = deadline.remaining();
        if remaining.is_zero() {
            tracing::debug!(attempts, timeout = ?options.timeout, "Condition timed out");
            return Ok(PollOutcome::TimedOut {
                attempts,
                elapsed: deadline.elapsed(),
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(options.interval.min(remaining)) => {}
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }
    }
}
