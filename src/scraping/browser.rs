//! Browser capability consumed by the acquisition engine.
//!
//! The engine never talks to a concrete automation backend. Everything it needs
//! from a live page is expressed here as typed async operations, so any backend
//! (`chromium::ChromiumLauncher`, `scripted::ScriptedLauncher`) is substitutable.

use crate::scraping::locators::Locator;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("interaction with '{locator}' failed: {reason}")]
    Interaction { locator: String, reason: String },

    #[error("timed out after {timeout:?} waiting for '{locator}'")]
    Timeout { locator: String, timeout: Duration },

    #[error("browser session error: {0}")]
    Session(String),

    #[error("page script error: {0}")]
    Script(String),
}

impl BrowserError {
    pub fn interaction(locator: &Locator, reason: impl ToString) -> Self {
        Self::Interaction {
            locator: locator.name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A live page positioned somewhere in the search → results → detail flow.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Focus the input at `locator`, type `text` and press Enter.
    async fn fill_and_submit(&self, locator: &Locator, text: &str) -> Result<(), BrowserError>;

    /// Scroll the results panel (or the viewport when no panel is mounted).
    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), BrowserError>;

    /// Every pause in the engine goes through here so backends control time.
    async fn wait(&self, ms: u64);

    async fn count_matches(&self, locator: &Locator) -> Result<usize, BrowserError>;

    /// Frozen snapshot of the nodes currently matching `locator`, in DOM order.
    async fn all_matches(&self, locator: &Locator) -> Result<Vec<Box<dyn ListingHandle>>, BrowserError>;

    /// Inner text of the first match, or `""` when absent. Never fails.
    async fn read_text(&self, locator: &Locator) -> String;

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError>;
}

/// A handle to one node captured by [`BrowserPage::all_matches`].
#[async_trait]
pub trait ListingHandle: Send + Sync {
    fn related_parent(&self) -> Box<dyn ListingHandle>;

    async fn click(&self) -> Result<(), BrowserError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Identity and transport settings for one browser session.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub proxy: Option<String>,
    /// `None` draws a random desktop user-agent.
    pub user_agent: Option<String>,
    pub locale: String,
    pub width: u32,
    pub height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            user_agent: None,
            locale: "en-GB".to_string(),
            width: 1366,
            height: 768,
        }
    }
}

/// One exclusively-owned browser session with a single page.
///
/// Callers close the session explicitly; implementations also release the
/// underlying browser on drop so an aborted run never leaks a process.
#[async_trait]
pub trait BrowserSession: Send {
    fn page(&self) -> &dyn BrowserPage;

    async fn close(&mut self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
