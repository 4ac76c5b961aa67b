//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::http::contract::{ApiProfile, Strictness};
use crate::poll::PollOptions;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Systems under verification
    #[serde(default)]
    pub target: TargetConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Response verification settings
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Browser driver settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Suite execution settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Systems under verification
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Base URL that API request paths are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Start page for browser scenarios
    #[serde(default = "default_ui_url")]
    pub ui_url: String,

    /// Headers sent with every API request (e.g. authorization)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Response-shape descriptor of the API
    #[serde(default)]
    pub profile: ApiProfile,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ui_url: default_ui_url(),
            headers: BTreeMap::new(),
            profile: ApiProfile::default(),
        }
    }
}

fn default_base_url() -> String {
    "https://jsonplaceholder.typicode.com".to_string()
}

fn default_ui_url() -> String {
    "https://demoqa.com/".to_string()
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Default timeout for condition waits and retries
    #[serde(default = "default_wait")]
    pub wait_secs: u64,

    /// Interval between predicate evaluations
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Timeout for a single HTTP or WebDriver request
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// Timeout for the page readiness wait after navigation
    #[serde(default = "default_readiness")]
    pub readiness_secs: u64,

    /// Upper bound on session release
    #[serde(default = "default_release")]
    pub release_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            wait_secs: default_wait(),
            poll_interval_ms: default_poll_interval(),
            request_secs: default_request(),
            readiness_secs: default_readiness(),
            release_secs: default_release(),
        }
    }
}

fn default_wait() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    500
}
fn default_request() -> u64 {
    5
}
fn default_readiness() -> u64 {
    15
}
fn default_release() -> u64 {
    5
}

impl Timeouts {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn release(&self) -> Duration {
        Duration::from_secs(self.release_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poll options for ordinary waits, optionally with a step-specific timeout
    pub fn wait_options(&self, timeout_secs: Option<u64>) -> Result<PollOptions> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(self.wait_secs));
        PollOptions::new(timeout)?.with_interval(self.poll_interval())
    }

    /// Poll options for the readiness sub-protocol
    pub fn readiness_options(&self) -> Result<PollOptions> {
        PollOptions::new(Duration::from_secs(self.readiness_secs))?
            .with_interval(self.poll_interval())
    }
}

/// Response verification settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct VerificationConfig {
    /// How much of a write request must be reflected in the response
    #[serde(default)]
    pub strictness: Strictness,
}

/// Browser driver settings
#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    /// WebDriver endpoint (chromedriver, geckodriver, selenium grid)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Browser name requested in the session capabilities
    #[serde(default = "default_browser")]
    pub browser: String,

    /// Run the browser without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Extra browser arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            headless: default_headless(),
            args: Vec::new(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_headless() -> bool {
    true
}

/// Suite execution settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Maximum number of scenarios running at once
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { jobs: default_jobs() }
    }
}

fn default_jobs() -> usize {
    4
}

impl Config {
    /// Load configuration from an explicit path, or from the default config
    /// file when no path is given
    ///
    /// Returns default configuration if the default file doesn't exist. An
    /// explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content =
            std::fs::read_to_string(&path).map_err(|e| super::Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the engine relies on
    pub fn validate(&self) -> Result<()> {
        self.timeouts.wait_options(None)?;
        self.timeouts.readiness_options()?;
        if self.timeouts.request_secs == 0 {
            return Err(super::Error::Config(
                "timeouts.request_secs must be greater than zero".to_string(),
            ));
        }
        if self.run.jobs == 0 {
            return Err(super::Error::Config(
                "run.jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
