//! Deadline-bounded condition polling
//!
//! Every wait in the engine goes through [`wait_until`]: readiness of a
//! page, presence of an element, recovery of a flaky endpoint. Waits always
//! carry an explicit timeout and observe the run-wide [`Cancellation`].

mod cancel;
mod deadline;
mod poller;

pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use deadline::Deadline;
pub use poller::{wait_until, PollOptions, PollOutcome, DEFAULT_POLL_INTERVAL};
