//! `BrowserPage` over a real Chromium instance driven through CDP.
//!
//! Locators are XPath expressions evaluated in the page. Handles returned by
//! `all_matches` are pinned by stamping a `data-harvest-key` attribute on each
//! matched node, so later clicks hit the node seen at snapshot time even if
//! the list has grown in between.

use crate::scraping::browser::{
    BrowserError, BrowserLauncher, BrowserPage, BrowserSession, LaunchOptions, ListingHandle,
};
use crate::scraping::browser_manager;
use crate::scraping::locators::Locator;
use async_trait::async_trait;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const WAIT_POLL_MS: u64 = 250;
const HANDLE_ATTR: &str = "data-harvest-key";

/// JS string literal for `raw`.
fn js_str(raw: &str) -> String {
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}

pub struct ChromiumLauncher {
    exe: String,
    results_panel: Locator,
}

impl ChromiumLauncher {
    pub fn new(exe: impl Into<String>, results_panel: Locator) -> Self {
        Self {
            exe: exe.into(),
            results_panel,
        }
    }

    /// Launcher for the auto-discovered executable, `None` when no browser is installed.
    pub fn new_auto(results_panel: Locator) -> Option<Self> {
        browser_manager::find_chrome_executable().map(|exe| Self::new(exe, results_panel))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>, BrowserError> {
        info!(
            "🚀 Launching browser ({}, headless={}, proxy={})",
            self.exe,
            options.headless,
            options
                .proxy
                .as_deref()
                .map(browser_manager::mask_proxy_credentials)
                .unwrap_or_else(|| "none".to_string())
        );

        let config = browser_manager::build_session_config(&self.exe, options)
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Session(format!("failed to launch ({}): {}", self.exe, e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                browser.close().await.ok();
                handler_task.abort();
                return Err(BrowserError::Session(format!("failed to open tab: {}", e)));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            handler_task,
            page: ChromiumPage {
                page,
                results_panel: self.results_panel,
            },
        }))
    }
}

pub struct ChromiumSession {
    browser: Option<Browser>,
    handler_task: JoinHandle<()>,
    page: ChromiumPage,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    fn page(&self) -> &dyn BrowserPage {
        &self.page
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            info!("🛑 Browser session closed");
        }
        self.handler_task.abort();
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Drop cannot await. When the run future is dropped mid-flight (timeout,
        // panic) spawn the close so Chromium does not outlive the job.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        warn!("Browser session dropped without close; closing in background");
        handle.spawn(async move {
            let _ = browser.close().await;
        });
    }
}

pub struct ChromiumPage {
    page: Page,
    results_panel: Locator,
}

impl ChromiumPage {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T, BrowserError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let nav_err = |reason: String| BrowserError::Navigation {
            url: url.to_string(),
            reason,
        };
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(nav_err(e.to_string())),
            Err(_) => Err(nav_err(format!("timed out after {}ms", timeout.as_millis()))),
        }
    }

    async fn fill_and_submit(&self, locator: &Locator, text: &str) -> Result<(), BrowserError> {
        let input = self
            .page
            .find_xpath(locator.xpath)
            .await
            .map_err(|e| BrowserError::interaction(locator, e))?;
        input
            .click()
            .await
            .map_err(|e| BrowserError::interaction(locator, e))?
            .type_str(text)
            .await
            .map_err(|e| BrowserError::interaction(locator, e))?
            .press_key("Enter")
            .await
            .map_err(|e| BrowserError::interaction(locator, e))?;
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), BrowserError> {
        let script = format!(
            r#"(() => {{
                const panel = document.evaluate({panel}, document, null,
                    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                const target = panel || document.scrollingElement || document.body;
                target.scrollBy({dx}, {dy});
                return true;
            }})()"#,
            panel = js_str(self.results_panel.xpath),
        );
        self.eval::<bool>(script).await.map(|_| ())
    }

    async fn wait(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn count_matches(&self, locator: &Locator) -> Result<usize, BrowserError> {
        let script = format!(
            "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
            js_str(locator.xpath)
        );
        self.eval::<usize>(script).await
    }

    async fn all_matches(&self, locator: &Locator) -> Result<Vec<Box<dyn ListingHandle>>, BrowserError> {
        let script = format!(
            r#"(() => {{
                const snap = document.evaluate({xpath}, document, null,
                    XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                const batch = Math.random().toString(36).slice(2, 10);
                const keys = [];
                for (let i = 0; i < snap.snapshotLength; i++) {{
                    const key = batch + '-' + i;
                    snap.snapshotItem(i).setAttribute({attr}, key);
                    keys.push(key);
                }}
                return keys;
            }})()"#,
            xpath = js_str(locator.xpath),
            attr = js_str(HANDLE_ATTR),
        );
        let keys: Vec<String> = self.eval(script).await?;
        Ok(keys
            .into_iter()
            .map(|key| {
                Box::new(ChromiumHandle {
                    page: self.page.clone(),
                    key,
                    depth: 0,
                }) as Box<dyn ListingHandle>
            })
            .collect())
    }

    async fn read_text(&self, locator: &Locator) -> String {
        let script = format!(
            r#"(() => {{
                const node = document.evaluate({xpath}, document, null,
                    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                return node ? (node.innerText || node.textContent || '') : '';
            }})()"#,
            xpath = js_str(locator.xpath),
        );
        match self.eval::<String>(script).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("Failed to read text for '{}': {}", locator, e);
                String::new()
            }
        }
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        let start = Instant::now();
        loop {
            match self.count_matches(locator).await {
                Ok(n) if n > 0 => return Ok(()),
                Ok(_) => {}
                Err(e) => debug!("wait_for '{}': probe failed: {}", locator, e),
            }
            if start.elapsed() >= timeout {
                return Err(BrowserError::Timeout {
                    locator: locator.name.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(Duration::from_millis(WAIT_POLL_MS)).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClickPoint {
    x: f64,
    y: f64,
}

struct ChromiumHandle {
    page: Page,
    key: String,
    /// How many `parentElement` hops above the stamped node this handle targets.
    depth: usize,
}

#[async_trait]
impl ListingHandle for ChromiumHandle {
    fn related_parent(&self) -> Box<dyn ListingHandle> {
        Box::new(ChromiumHandle {
            page: self.page.clone(),
            key: self.key.clone(),
            depth: self.depth + 1,
        })
    }

    async fn click(&self) -> Result<(), BrowserError> {
        let script = format!(
            r#"(() => {{
                let el = document.querySelector('[' + {attr} + '="' + {key} + '"]');
                if (!el) return null;
                for (let i = 0; i < {depth} && el.parentElement; i++) el = el.parentElement;
                el.scrollIntoView({{block: 'center'}});
                const r = el.getBoundingClientRect();
                return {{x: r.left + r.width / 2, y: r.top + r.height / 2}};
            }})()"#,
            attr = js_str(HANDLE_ATTR),
            key = js_str(&self.key),
            depth = self.depth,
        );

        let point: Option<ClickPoint> = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        let Some(point) = point else {
            return Err(BrowserError::Interaction {
                locator: self.describe(),
                reason: "node detached from the page".to_string(),
            });
        };

        self.page
            .click(Point {
                x: point.x,
                y: point.y,
            })
            .await
            .map_err(|e| BrowserError::Interaction {
                locator: self.describe(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("listing {} (+{})", self.key, self.depth)
    }
}
