//! In-memory browser used by unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::common::{Error, Result};

use super::driver::{BrowserDriver, BrowserLauncher, ElementHandle, Locator, KEY_RETURN};

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeElement {
    pub text: String,
    pub displayed: bool,
    /// Clicking starts a page load
    pub navigates: bool,
    /// Number of lookups that miss before the element shows up
    pub appears_after: u32,
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub navigations: Vec<String>,
    /// readyState polls answered with "loading" after each load starts
    pub load_polls: u32,
    loading_left: u32,
    pub never_ready: bool,
    pub fail_navigation: bool,
    pub elements: HashMap<Locator, FakeElement>,
    handles: HashMap<String, Locator>,
    lookups: HashMap<Locator, u32>,
    pub typed: HashMap<Locator, String>,
    /// On Return, set this element's text to prefix + typed text
    pub submit_echo: Option<(Locator, String)>,
    pub clicks: Vec<Locator>,
    pub closes: u32,
    /// `close` never returns
    pub hang_close: bool,
}

impl FakeState {
    fn start_load(&mut self) {
        self.loading_left = self.load_polls;
    }

    fn locator(&self, element: &ElementHandle) -> Result<Locator> {
        self.handles
            .get(&element.id)
            .cloned()
            .ok_or_else(|| Error::webdriver("stale element reference", &element.id))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBrowser {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add(&self, locator: Locator, element: FakeElement) {
        self.state().elements.insert(locator, element);
    }

    /// The text-box form: a link leading to it, an input and an output
    /// panel that echoes the submitted name
    pub fn text_box_form() -> Self {
        let browser = Self::default();
        browser.state().load_polls = 2;
        browser.add(
            Locator::LinkText("Text Box".into()),
            FakeElement {
                text: "Text Box".into(),
                displayed: true,
                navigates: true,
                ..FakeElement::default()
            },
        );
        browser.add(
            Locator::Id("userName".into()),
            FakeElement {
                displayed: true,
                ..FakeElement::default()
            },
        );
        browser.add(Locator::Id("output".into()), FakeElement::default());
        browser.state().submit_echo = Some((Locator::Id("output".into()), "Name:".into()));
        browser
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_navigation {
            return Err(Error::webdriver("unknown error", "net::ERR_NAME_NOT_RESOLVED"));
        }
        state.navigations.push(url.to_string());
        state.start_load();
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        self.state().start_load();
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let mut state = self.state();
        let Some(appears_after) = state.elements.get(locator).map(|e| e.appears_after) else {
            return Ok(None);
        };
        let seen = state.lookups.entry(locator.clone()).or_insert(0);
        *seen += 1;
        if *seen <= appears_after {
            return Ok(None);
        }

        let id = format!("el-{}", state.handles.len() + 1);
        state.handles.insert(id.clone(), locator.clone());
        Ok(Some(ElementHandle {
            id,
            locator: locator.clone(),
        }))
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let mut state = self.state();
        let locator = state.locator(element)?;
        let (text, submit) = match text.strip_suffix(KEY_RETURN) {
            Some(text) => (text, true),
            None => (text, false),
        };
        let typed = {
            let entry = state.typed.entry(locator).or_default();
            entry.push_str(text);
            entry.clone()
        };
        if submit {
            if let Some((target, prefix)) = state.submit_echo.clone() {
                if let Some(output) = state.elements.get_mut(&target) {
                    output.text = format!("{}{}", prefix, typed);
                    output.displayed = true;
                }
            }
        }
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.state();
        let locator = state.locator(element)?;
        let navigates = state.elements.get(&locator).map(|e| e.navigates).unwrap_or(false);
        state.clicks.push(locator);
        if navigates {
            state.start_load();
        }
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let state = self.state();
        let locator = state.locator(element)?;
        Ok(state
            .elements
            .get(&locator)
            .map(|e| e.text.clone())
            .unwrap_or_default())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        let state = self.state();
        let locator = state.locator(element)?;
        Ok(state.elements.get(&locator).map(|e| e.displayed).unwrap_or(false))
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        if !script.contains("readyState") {
            return Ok(Value::Null);
        }
        let mut state = self.state();
        if state.never_ready {
            return Ok(Value::from("loading"));
        }
        if state.loading_left > 0 {
            state.loading_left -= 1;
            return Ok(Value::from("loading"));
        }
        Ok(Value::from("complete"))
    }

    async fn close(&self) -> Result<()> {
        let hang = {
            let mut state = self.state();
            state.closes += 1;
            state.hang_close
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Hands out clones of one [`FakeBrowser`]
#[derive(Default)]
pub(crate) struct FakeLauncher {
    pub browser: FakeBrowser,
    pub fail_launch: bool,
    pub launches: AtomicU32,
}

impl FakeLauncher {
    pub fn new(browser: FakeBrowser) -> Self {
        Self {
            browser,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(Error::Connection("connection refused".to_string()));
        }
        Ok(Box::new(self.browser.clone()))
    }
}
