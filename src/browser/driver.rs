//! Browser-driver collaborator interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::Result;

/// Key code WebDriver interprets as the Return key
pub const KEY_RETURN: &str = "\u{E006}";

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Id(String),
    Css(String),
    LinkText(String),
}

impl Locator {
    /// The W3C WebDriver location strategy and value
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Id(id) => ("css selector", format!("#{}", css_escape(id))),
            Locator::Css(selector) => ("css selector", selector.clone()),
            Locator::LinkText(text) => ("link text", text.clone()),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={}", id),
            Self::Css(selector) => write!(f, "css={}", selector),
            Self::LinkText(text) => write!(f, "link={}", text),
        }
    }
}

/// Escape characters that would end an identifier inside a CSS selector
fn css_escape(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Reference to an element in the current document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub id: String,
    pub locator: Locator,
}

/// Capability set the engine needs from a browser driver
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn refresh(&self) -> Result<()>;

    /// `Ok(None)` when nothing matches
    async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>>;

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    async fn text(&self, element: &ElementHandle) -> Result<String>;

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool>;

    async fn execute_script(&self, script: &str) -> Result<Value>;

    /// End the browser session
    async fn close(&self) -> Result<()>;
}

/// Starts browser drivers; one driver per session
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>>;
}
