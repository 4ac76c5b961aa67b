//! Assertion engine
//!
//! Assertions are plain records: evaluating one has no side effect beyond
//! producing the record. A scenario collects them in order and the outcome
//! is decided from the collection plus any uncaught error.

use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::common::Error;
use crate::session::SessionState;

/// One evaluated expectation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assertion {
    pub description: String,
    pub expected: Value,
    pub actual: Value,
    pub passed: bool,
}

impl Assertion {
    /// Human-readable mismatch message
    pub fn mismatch(&self) -> String {
        format!(
            "{}: expected {}, got {}",
            self.description, self.expected, self.actual
        )
    }
}

/// Compare an expected value with an observed one
pub fn assert_equal(
    description: impl Into<String>,
    expected: impl Into<Value>,
    actual: impl Into<Value>,
) -> Assertion {
    let expected = expected.into();
    let actual = actual.into();
    Assertion {
        description: description.into(),
        passed: expected == actual,
        expected,
        actual,
    }
}

/// Record whether a condition holds
pub fn assert_condition(description: impl Into<String>, predicate: impl FnOnce() -> bool) -> Assertion {
    let held = predicate();
    Assertion {
        description: description.into(),
        expected: Value::Bool(true),
        actual: Value::Bool(held),
        passed: held,
    }
}

/// Check that observed text contains a substring
pub fn assert_contains(description: impl Into<String>, needle: &str, haystack: &str) -> Assertion {
    Assertion {
        description: description.into(),
        expected: Value::String(needle.to_string()),
        actual: Value::String(haystack.to_string()),
        passed: haystack.contains(needle),
    }
}

/// Final verdict of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// Every assertion passed and nothing went wrong
    Passed,
    /// The external system answered, but not as expected
    Failed,
    /// The harness or the external system could not be driven
    Errored,
}

impl ScenarioOutcome {
    /// Decide the outcome from the collected assertions and the error that
    /// ended the scenario, if any.
    pub fn decide(assertions: &[Assertion], error: Option<&Error>) -> Self {
        match error {
            Some(e) if e.is_infrastructure() => ScenarioOutcome::Errored,
            Some(_) => ScenarioOutcome::Failed,
            None if assertions.iter().all(|a| a.passed) => ScenarioOutcome::Passed,
            None => ScenarioOutcome::Failed,
        }
    }
}

impl std::fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Everything recorded about one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub assertions: Vec<Assertion>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Message of the error that ended the scenario early
    pub error: Option<String>,
    /// Stable code of that error
    pub error_code: Option<String>,
    /// Session state when the scenario completed
    pub session: SessionState,
}

impl ScenarioResult {
    /// Build a result, deciding the outcome from assertions and error
    pub fn new(
        name: &str,
        assertions: Vec<Assertion>,
        error: Option<&Error>,
        duration: Duration,
        session: SessionState,
    ) -> Self {
        Self {
            name: name.to_string(),
            outcome: ScenarioOutcome::decide(&assertions, error),
            assertions,
            duration,
            error: error.map(|e| e.to_string()),
            error_code: error.map(|e| e.code().to_string()),
            session,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == ScenarioOutcome::Passed
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter().filter(|a| !a.passed)
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
