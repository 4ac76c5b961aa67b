//! W3C WebDriver binding
//!
//! Speaks the WebDriver JSON wire format over reqwest to chromedriver,
//! geckodriver or a Selenium grid. Only the commands in the
//! [`BrowserDriver`] capability set are implemented.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::common::config::BrowserConfig;
use crate::common::{Error, Result};
use crate::http::client::map_reqwest_error;

use super::driver::{BrowserDriver, BrowserLauncher, ElementHandle, Locator};

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Opens WebDriver sessions against one endpoint
pub struct WebDriverLauncher {
    http: reqwest::Client,
    endpoint: String,
    capabilities: Value,
    request_timeout: Duration,
}

impl WebDriverLauncher {
    pub fn new(config: &BrowserConfig, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("Failed to build WebDriver client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            capabilities: capabilities(config),
            request_timeout,
        })
    }
}

/// Build `alwaysMatch` capabilities for the configured browser
pub fn capabilities(config: &BrowserConfig) -> Value {
    let mut args = config.args.clone();
    match config.browser.as_str() {
        "firefox" => {
            if config.headless {
                args.push("-headless".to_string());
            }
            json!({
                "browserName": "firefox",
                "moz:firefoxOptions": { "args": args }
            })
        }
        name => {
            if config.headless {
                args.push("--headless=new".to_string());
            }
            json!({
                "browserName": name,
                "goog:chromeOptions": { "args": args }
            })
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserDriver>> {
        let url = format!("{}/session", self.endpoint);
        let body = json!({ "capabilities": { "alwaysMatch": self.capabilities } });

        let value = send(&self.http, Method::POST, &url, Some(body), self.request_timeout).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::webdriver("invalid response", "new session returned no sessionId"))?;

        tracing::info!(session_id, endpoint = %self.endpoint, "WebDriver session created");

        Ok(Box::new(WebDriver {
            http: self.http.clone(),
            session_url: format!("{}/session/{}", self.endpoint, session_id),
            request_timeout: self.request_timeout,
        }))
    }
}

/// One live WebDriver session
pub struct WebDriver {
    http: reqwest::Client,
    session_url: String,
    request_timeout: Duration,
}

impl WebDriver {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.http, method, &url, body, self.request_timeout).await
    }

    fn element_path(element: &ElementHandle, suffix: &str) -> String {
        format!("/element/{}/{}", element.id, suffix)
    }
}

#[async_trait]
impl BrowserDriver for WebDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    async fn refresh(&self) -> Result<()> {
        self.command(Method::POST, "/refresh", Some(json!({})))
            .await
            .map(drop)
    }

    async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let (using, value) = locator.strategy();
        let result = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": using, "value": value })),
            )
            .await;

        match result {
            Ok(value) => {
                let id = value
                    .get(ELEMENT_KEY)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::webdriver("invalid response", "element reference missing"))?;
                Ok(Some(ElementHandle {
                    id: id.to_string(),
                    locator: locator.clone(),
                }))
            }
            Err(Error::WebDriver { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &Self::element_path(element, "value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(drop)
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.command(Method::POST, &Self::element_path(element, "click"), Some(json!({})))
            .await
            .map(drop)
    }

    async fn text(&self, element: &ElementHandle) -> Result<String> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "displayed"), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn close(&self) -> Result<()> {
        self.command(Method::DELETE, "", None).await.map(drop)
    }
}

/// Send one WebDriver command and unwrap its `value`
async fn send(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
    timeout: Duration,
) -> Result<Value> {
    tracing::trace!(%method, url, "WebDriver >>>");
    let mut request = http.request(method, url).timeout(timeout);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;
    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| Error::webdriver("invalid response", &e.to_string()))?;
    tracing::trace!(status = status.as_u16(), "WebDriver <<<");

    unwrap_value(status.is_success(), payload)
}

/// Extract `value` from a WebDriver payload, turning error payloads into
/// [`Error::WebDriver`]
fn unwrap_value(success: bool, mut payload: Value) -> Result<Value> {
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if success {
        return Ok(value);
    }
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    Err(Error::webdriver(error, message))
}
