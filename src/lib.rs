//! verify - condition-polling and assertion engine
//!
//! Verifies HTTP APIs and browser-rendered pages: requests and UI
//! interactions are retried or awaited through one condition poller with
//! explicit timeouts, sessions are scoped and always released, and every
//! scenario ends Passed, Failed or Errored.

pub mod assertion;
pub mod browser;
pub mod cli;
pub mod commands;
pub mod common;
pub mod http;
pub mod poll;
pub mod session;
pub mod testing;

// Re-export commonly used types for tests
pub use assertion::{ScenarioOutcome, ScenarioResult};
pub use common::{Error, Result};
