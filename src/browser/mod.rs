//! Browser-driver collaborator
//!
//! [`BrowserDriver`] is the capability set sessions use; [`webdriver`]
//! binds it to a W3C WebDriver endpoint.

pub mod driver;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

pub use driver::{BrowserDriver, BrowserLauncher, ElementHandle, Locator, KEY_RETURN};
pub use webdriver::{WebDriver, WebDriverLauncher};
