//! Error types for the verification engine
//!
//! Errors are split into two families: infrastructure faults (the external
//! system or the harness could not be driven) and domain mismatches (the
//! external system answered, but not with what was expected). The scenario
//! runner reports the former as Errored and the latter as Failed.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the verification engine
#[derive(Error, Debug)]
pub enum Error {
    // === Waiting ===
    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Run cancelled")]
    Cancelled,

    // === HTTP verification ===
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Fatal failure: {0}")]
    Fatal(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("HTTP client error: {0}")]
    Http(String),

    // === Sessions ===
    #[error("Session acquisition failed: {0}")]
    Acquisition(String),

    #[error("Not ready: {0}. Wait for the page to finish loading before interacting")]
    NotReady(String),

    // === Browser driver ===
    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    // === Assertions ===
    #[error("Assertion failed: {0}")]
    AssertionMismatch(String),

    // === Configuration ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario '{name}': {reason}")]
    ScenarioParse { name: String, reason: String },

    #[error("Unknown scenario '{0}'. Use 'verify list' to see available scenarios")]
    UnknownScenario(String),

    // === IO ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a timeout error for a named wait
    pub fn timeout(what: &str, after: Duration) -> Self {
        Self::Timeout {
            what: what.to_string(),
            after,
        }
    }

    /// Create a scenario parse error
    pub fn scenario_parse(name: &str, reason: &str) -> Self {
        Self::ScenarioParse {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a WebDriver protocol error
    pub fn webdriver(error: &str, message: &str) -> Self {
        Self::WebDriver {
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error is an infrastructure fault rather than an
    /// expectation mismatch.
    ///
    /// Infrastructure faults make a scenario Errored; everything else makes
    /// it Failed.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, Error::AssertionMismatch(_))
    }

    /// Whether the error is the kind of network fault a retry may cure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transient(_) | Error::Connection(_) | Error::RequestTimeout(_)
        )
    }

    /// Stable short code used in reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::Timeout { .. } => "TIMEOUT",
            Error::Cancelled => "CANCELLED",
            Error::Transient(_) | Error::Connection(_) | Error::RequestTimeout(_) => "TRANSIENT",
            Error::Fatal(_) | Error::Http(_) => "FATAL",
            Error::Acquisition(_) => "ACQUISITION",
            Error::NotReady(_) => "NOT_READY",
            Error::WebDriver { .. } | Error::ElementNotFound(_) => "DRIVER",
            Error::AssertionMismatch(_) => "ASSERTION_MISMATCH",
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::ScenarioParse { .. }
            | Error::UnknownScenario(_) => "CONFIG",
            _ => "INTERNAL_ERROR",
        }
    }
}
