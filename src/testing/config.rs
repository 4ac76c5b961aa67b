//! Scenario definition types
//!
//! Defines the data structures for deserializing YAML scenarios.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::Locator;
use crate::common::config::Timeouts;
use crate::common::{Error, Result};
use crate::http::{Contract, Method, Strictness};
use crate::poll::PollOptions;
use crate::session::Visibility;

/// A complete scenario loaded from YAML
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioDef {
    /// Unique name used for selection and reporting
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Which kind of session the scenario drives
    #[serde(default)]
    pub session: SessionKind,
    /// Start page for browser scenarios, resolved against the UI URL
    pub start: Option<String>,
    /// The sequence of steps to execute
    pub steps: Vec<Step>,
}

/// Session kind a scenario needs
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    Api,
    Browser,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Browser => write!(f, "browser"),
        }
    }
}

/// A single step in the scenario flow
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Issue an HTTP request and check its contract
    Request {
        method: Method,
        /// Path resolved against the base URL, or an absolute URL
        path: String,
        body: Option<Value>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Non-2xx statuses treated as a successful exchange
        #[serde(default)]
        accept: Vec<u16>,
        /// Request timeout in seconds
        timeout: Option<u64>,
        /// Retry transient failures through the poller
        retry: Option<RetryPolicy>,
        /// Overrides the configured strictness for this request
        strictness: Option<Strictness>,
        expect: Option<Contract>,
    },
    /// Open a URL, resolved against the UI URL, and wait for it to load
    Navigate { url: String },
    /// Reload the page
    Refresh {
        /// Wait for the reload to finish (default: true)
        #[serde(default = "default_true")]
        wait_ready: bool,
    },
    /// Click an element once it is visible
    Click {
        locator: Locator,
        /// The click loads a new page
        #[serde(default)]
        navigates: bool,
        timeout: Option<u64>,
    },
    /// Type into an element once it is visible
    Type {
        locator: Locator,
        text: String,
        /// Press Return after typing
        #[serde(default)]
        submit: bool,
        timeout: Option<u64>,
    },
    /// Wait for an element's text to contain a string
    WaitForText {
        locator: Locator,
        contains: String,
        timeout: Option<u64>,
        /// The text is expected to never appear
        #[serde(default)]
        expect_timeout: bool,
    },
    /// Check an element's current text without waiting
    AssertText { locator: Locator, contains: String },
    /// Wait for an element to exist
    WaitForElement {
        locator: Locator,
        #[serde(default)]
        visibility: Visibility,
        timeout: Option<u64>,
    },
}

fn default_true() -> bool {
    true
}

/// Retry settings for a request step; unset fields use the configured
/// wait timeout and poll interval
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Overall retry budget in seconds
    pub timeout: Option<u64>,
    pub interval_ms: Option<u64>,
}

impl RetryPolicy {
    /// Poll options for this policy
    pub fn options(&self, timeouts: &Timeouts) -> Result<PollOptions> {
        let timeout = Duration::from_secs(self.timeout.unwrap_or(timeouts.wait_secs));
        let interval = self
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| timeouts.poll_interval());
        PollOptions::new(timeout)?.with_interval(interval)
    }

    fn check(&self) -> std::result::Result<(), String> {
        match (self.timeout, self.interval_ms) {
            (Some(0), _) => Err("retry timeout must be positive".to_string()),
            (_, Some(0)) => Err("retry interval must be positive".to_string()),
            (Some(secs), Some(ms)) if ms >= secs.saturating_mul(1000) => Err(format!(
                "retry interval ({}ms) must be shorter than its timeout ({}s)",
                ms, secs
            )),
            _ => Ok(()),
        }
    }
}

impl Step {
    /// Session kind this step runs against
    pub fn session_kind(&self) -> SessionKind {
        match self {
            Step::Request { .. } => SessionKind::Api,
            _ => SessionKind::Browser,
        }
    }

    /// Step-specific wait timeout in seconds
    pub fn wait_timeout(&self) -> Option<u64> {
        match self {
            Step::Click { timeout, .. }
            | Step::Type { timeout, .. }
            | Step::WaitForText { timeout, .. }
            | Step::WaitForElement { timeout, .. } => *timeout,
            _ => None,
        }
    }

    fn waits(&self) -> bool {
        matches!(
            self,
            Step::Click { .. }
                | Step::Type { .. }
                | Step::WaitForText { .. }
                | Step::WaitForElement { .. }
        )
    }

    /// Problems visible without any configuration
    fn check(&self) -> std::result::Result<(), String> {
        if self.wait_timeout() == Some(0) {
            return Err("wait timeout must be positive".to_string());
        }
        if let Step::Request {
            path,
            timeout,
            retry,
            expect,
            ..
        } = self
        {
            if *timeout == Some(0) {
                return Err("request timeout must be positive".to_string());
            }
            if let Some(policy) = retry {
                policy.check()?;
            }
            if let Some(Contract::Fetch { id } | Contract::Update { id }) = expect {
                if !path_names_id(path, id) {
                    return Err(format!("path '{}' does not address identifier {}", path, id));
                }
            }
        }
        Ok(())
    }

    /// Short label for logs and reports
    pub fn label(&self) -> String {
        match self {
            Step::Request { method, path, .. } => format!("{} {}", method, path),
            Step::Navigate { url } => format!("navigate {}", url),
            Step::Refresh { .. } => "refresh".to_string(),
            Step::Click { locator, .. } => format!("click {}", locator),
            Step::Type { locator, .. } => format!("type into {}", locator),
            Step::WaitForText {
                locator, contains, ..
            } => format!("wait for '{}' in {}", contains, locator),
            Step::AssertText {
                locator, contains, ..
            } => format!("assert '{}' in {}", contains, locator),
            Step::WaitForElement { locator, .. } => format!("wait for {}", locator),
        }
    }
}

impl ScenarioDef {
    /// Parse one scenario from YAML text
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self> {
        let def: ScenarioDef = serde_yaml::from_str(content)
            .map_err(|e| Error::scenario_parse(origin, &e.to_string()))?;
        def.validate()?;
        Ok(def)
    }

    /// Load a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content, &path.display().to_string())
    }

    /// Check that the scenario can run as written
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::scenario_parse("<unnamed>", "name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(Error::scenario_parse(&self.name, "no steps"));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.session_kind() != self.session {
                return Err(Error::scenario_parse(
                    &self.name,
                    &format!(
                        "step {} ({}) needs a {} session, scenario uses {}",
                        i + 1,
                        step.label(),
                        step.session_kind(),
                        self.session
                    ),
                ));
            }
            step.check().map_err(|reason| {
                Error::scenario_parse(&self.name, &format!("step {}: {}", i + 1, reason))
            })?;
        }
        Ok(())
    }

    /// Check every wait and retry against the timeouts the run will use
    ///
    /// Run before any session is acquired, so a step whose timeout is not
    /// longer than the poll interval never launches a browser.
    pub fn check_timing(&self, timeouts: &Timeouts) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            let checked = match step {
                Step::Request {
                    retry: Some(policy),
                    ..
                } => policy.options(timeouts).map(|_| ()),
                step if step.waits() => timeouts.wait_options(step.wait_timeout()).map(|_| ()),
                _ => Ok(()),
            };
            checked.map_err(|e| {
                let reason = match e {
                    Error::Config(msg) => msg,
                    other => other.to_string(),
                };
                Error::scenario_parse(&self.name, &format!("step {}: {}", i + 1, reason))
            })?;
        }
        Ok(())
    }
}

/// Whether one of the path's segments is the identifier
fn path_names_id(path: &str, id: &Value) -> bool {
    let id = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').any(|segment| segment == id)
}

/// All `*.yaml` / `*.yml` files in a directory, sorted by path
pub fn scenario_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();
    Ok(files)
}
