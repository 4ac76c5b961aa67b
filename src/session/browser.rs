//! Browser sessions and the readiness sub-protocol
//!
//! After any navigation, refresh or navigating click the page is `Loading`
//! until `document.readyState` reports `complete`. Interactions against a
//! loading page fail fast with [`Error::NotReady`] instead of racing the
//! document.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::browser::{BrowserDriver, BrowserLauncher, ElementHandle, Locator, KEY_RETURN};
use crate::common::{Error, Result};
use crate::poll::{wait_until, Cancellation, PollOptions, PollOutcome};

use super::{Handle, Session};

const READY_STATE_SCRIPT: &str = "return document.readyState";

/// Load state of the current document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Loading,
    Complete,
}

/// What an element wait requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// In the document
    Present,
    /// In the document and displayed
    #[default]
    Visible,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Visible => write!(f, "visible"),
        }
    }
}

/// How to open a browser session
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub start_url: String,
    /// Bounds every readiness wait
    pub readiness: PollOptions,
    /// Bounds closing the browser when acquisition is abandoned
    pub release_limit: Duration,
}

/// A live browser with its page state
pub struct BrowserHandle {
    driver: Box<dyn BrowserDriver>,
    page: PageState,
    readiness: PollOptions,
    cancel: Cancellation,
}

#[async_trait]
impl Handle for BrowserHandle {
    fn kind(&self) -> &'static str {
        "browser"
    }

    async fn close(&mut self) -> Result<()> {
        self.driver.close().await
    }
}

/// Launch a browser and open the start page
///
/// The session is returned only after the start page finished loading. If
/// the browser started but the page never became ready, the browser is
/// closed here, within `release_limit`, and the caller gets
/// [`Error::Acquisition`] with nothing to release.
pub async fn acquire(
    launcher: &dyn BrowserLauncher,
    options: &BrowserOptions,
    cancel: &Cancellation,
) -> Result<Session<BrowserHandle>> {
    let driver = launcher
        .launch()
        .await
        .map_err(|e| Error::Acquisition(format!("could not start browser: {}", e)))?;

    let mut handle = BrowserHandle {
        driver,
        page: PageState::Loading,
        readiness: options.readiness,
        cancel: cancel.clone(),
    };

    if let Err(e) = handle.navigate(&options.start_url).await {
        match tokio::time::timeout(options.release_limit, handle.driver.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(close_err)) => {
                tracing::warn!(error = %close_err, "Failed to close browser after aborted acquisition");
            }
            Err(_) => {
                tracing::warn!(
                    limit = ?options.release_limit,
                    "Closing browser after aborted acquisition timed out"
                );
            }
        }
        return Err(match e {
            Error::Cancelled => Error::Cancelled,
            e => Error::Acquisition(format!("could not open {}: {}", options.start_url, e)),
        });
    }

    Ok(Session::ready(options.start_url.clone(), handle))
}

impl BrowserHandle {
    pub fn page_state(&self) -> PageState {
        self.page
    }

    /// Navigate and wait for the new document to load
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        tracing::debug!(url, "Navigating");
        self.page = PageState::Loading;
        self.driver.navigate(url).await?;
        self.await_ready().await
    }

    /// Start reloading the page
    ///
    /// The page stays `Loading` until [`await_ready`](Self::await_ready)
    /// observes the reload finishing.
    pub async fn refresh(&mut self) -> Result<()> {
        self.page = PageState::Loading;
        self.driver.refresh().await
    }

    /// Refresh, then wait for the reload to finish
    pub async fn reload(&mut self) -> Result<()> {
        self.refresh().await?;
        self.await_ready().await
    }

    /// Poll `document.readyState` until it is `complete`
    pub async fn await_ready(&mut self) -> Result<()> {
        let driver = &*self.driver;
        let outcome = wait_until(
            move || async move {
                let state = driver.execute_script(READY_STATE_SCRIPT).await?;
                Ok(state.as_str() == Some("complete"))
            },
            &self.readiness,
            &self.cancel,
        )
        .await?;
        outcome.into_result("document ready state 'complete'")?;

        self.page = PageState::Complete;
        Ok(())
    }

    fn ensure_ready(&self, action: &str) -> Result<()> {
        match self.page {
            PageState::Complete => Ok(()),
            PageState::Loading => Err(Error::NotReady(format!(
                "cannot {} while the page is loading",
                action
            ))),
        }
    }

    /// Look up an element once
    pub async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        self.ensure_ready("look up elements")?;
        self.driver.find(locator).await
    }

    /// Wait until an element is present (and displayed, for `Visible`)
    pub async fn wait_for_element(
        &self,
        locator: &Locator,
        visibility: Visibility,
        options: &PollOptions,
    ) -> Result<ElementHandle> {
        self.ensure_ready("look up elements")?;

        let found: Mutex<Option<ElementHandle>> = Mutex::new(None);
        let slot = &found;
        let driver = &*self.driver;

        let outcome = wait_until(
            move || async move {
                let Some(element) = driver.find(locator).await? else {
                    return Ok(false);
                };
                if visibility == Visibility::Visible
                    && !not_stale(driver.is_displayed(&element).await)?
                {
                    return Ok(false);
                }
                if let Ok(mut slot) = slot.lock() {
                    *slot = Some(element);
                }
                Ok(true)
            },
            options,
            &self.cancel,
        )
        .await?;

        match outcome {
            PollOutcome::Satisfied { .. } => found
                .into_inner()
                .ok()
                .flatten()
                .ok_or_else(|| Error::ElementNotFound(locator.to_string())),
            PollOutcome::TimedOut { elapsed, .. } => Err(Error::timeout(
                &format!("element {} to be {}", locator, visibility),
                elapsed,
            )),
        }
    }

    /// Wait until the text of an element contains `needle`
    ///
    /// Returns the poll outcome rather than an error on timeout, so callers
    /// can treat "never appeared" as the expected result.
    pub async fn wait_for_text(
        &self,
        locator: &Locator,
        needle: &str,
        options: &PollOptions,
    ) -> Result<PollOutcome> {
        self.ensure_ready("read text")?;
        let driver = &*self.driver;

        wait_until(
            move || async move {
                let Some(element) = driver.find(locator).await? else {
                    return Ok(false);
                };
                let text = match driver.text(&element).await {
                    Ok(text) => text,
                    Err(e) if is_stale(&e) => return Ok(false),
                    Err(e) => return Err(e),
                };
                Ok(text.contains(needle))
            },
            options,
            &self.cancel,
        )
        .await
    }

    pub async fn click(&mut self, element: &ElementHandle, navigates: bool) -> Result<()> {
        self.ensure_ready("click")?;
        self.driver.click(element).await?;
        if navigates {
            self.page = PageState::Loading;
            self.await_ready().await?;
        }
        Ok(())
    }

    /// Type into an element, optionally pressing Return afterwards
    pub async fn type_text(&self, element: &ElementHandle, text: &str, submit: bool) -> Result<()> {
        self.ensure_ready("type")?;
        if submit {
            self.driver
                .send_keys(element, &format!("{}{}", text, KEY_RETURN))
                .await
        } else {
            self.driver.send_keys(element, text).await
        }
    }

    pub async fn text(&self, element: &ElementHandle) -> Result<String> {
        self.ensure_ready("read text")?;
        self.driver.text(element).await
    }
}

/// A re-rendered element is "not there yet", not a driver fault
fn is_stale(e: &Error) -> bool {
    matches!(e, Error::WebDriver { error, .. } if error == "stale element reference")
}

fn not_stale(result: Result<bool>) -> Result<bool> {
    match result {
        Err(e) if is_stale(&e) => Ok(false),
        other => other,
    }
}
