//! In-memory `BrowserPage` with scripted search results.
//!
//! Every query maps to a list of listings; clicking a listing "opens" its
//! detail panel and `read_text` answers from that listing's field table keyed by
//! locator name. Waits advance no clock, which makes whole acquisition runs
//! deterministic and instant.

use crate::scraping::browser::{
    BrowserError, BrowserLauncher, BrowserPage, BrowserSession, LaunchOptions, ListingHandle,
};
use crate::scraping::locators::Locator;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How a listing's detail panel reacts to being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Render {
    #[default]
    Primary,
    /// Only the fallback name locator ever appears.
    FallbackOnly,
    Never,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedListing {
    pub fields: HashMap<&'static str, String>,
    pub render: Render,
    pub click_fails: bool,
    /// The first N reads of the name locator come back empty.
    pub blank_name_reads: u32,
}

impl ScriptedListing {
    pub fn place(name: &str, address: &str) -> Self {
        Self::default().with("name", name).with("address", address)
    }

    pub fn with(mut self, locator_name: &'static str, value: &str) -> Self {
        self.fields.insert(locator_name, value.to_string());
        self
    }

    pub fn render(mut self, render: Render) -> Self {
        self.render = render;
        self
    }

    pub fn failing_click(mut self) -> Self {
        self.click_fails = true;
        self
    }

    pub fn blank_name_reads(mut self, reads: u32) -> Self {
        self.blank_name_reads = reads;
        self
    }
}

/// What the page observed, for assertions.
#[derive(Debug, Clone, Default)]
pub struct PageLog {
    pub navigations: usize,
    pub searches: Vec<String>,
    pub scrolls: Vec<(i64, i64)>,
    pub count_calls: usize,
    pub clicks: Vec<usize>,
    pub name_reads: usize,
    pub waited_ms: u64,
}

#[derive(Default)]
struct ScriptState {
    results: HashMap<String, Vec<ScriptedListing>>,
    default_results: Vec<ScriptedListing>,
    current: Vec<ScriptedListing>,
    anchor_script: VecDeque<usize>,
    last_scripted_count: Option<usize>,
    selected: Option<usize>,
    blank_reads_left: HashMap<usize, u32>,
    navigation_failures: u32,
    /// The last primary name read came back blank: the panel is half-rendered.
    name_blank: bool,
    /// Queries whose submission never completes.
    hanging: HashSet<String>,
    log: PageLog,
}

#[derive(Clone, Default)]
pub struct ScriptedPage {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedPage {
    /// Page answering every query with `listings`.
    pub fn new(listings: Vec<ScriptedListing>) -> Self {
        let page = Self::default();
        page.lock().default_results = listings;
        page
    }

    /// Answer `query` (exact match) with `listings`.
    pub fn with_results(self, query: &str, listings: Vec<ScriptedListing>) -> Self {
        self.lock().results.insert(query.to_string(), listings);
        self
    }

    /// Scripted anchor counts returned by successive `count_matches` calls;
    /// the last value repeats once the script runs out.
    pub fn with_anchor_counts(self, counts: impl IntoIterator<Item = usize>) -> Self {
        self.lock().anchor_script = counts.into_iter().collect();
        self
    }

    /// Fail the next `n` navigations.
    pub fn failing_navigations(self, n: u32) -> Self {
        self.lock().navigation_failures = n;
        self
    }

    /// Submitting `query` suspends forever, like a page that never answers.
    pub fn hanging_on(self, query: &str) -> Self {
        self.lock().hanging.insert(query.to_string());
        self
    }

    /// Open a listing's detail panel directly, as if it had been clicked.
    pub fn open(&self, index: usize) {
        self.lock().selected = Some(index);
    }

    pub fn log(&self) -> PageLog {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        let mut st = self.lock();
        st.log.navigations += 1;
        if st.navigation_failures > 0 {
            st.navigation_failures -= 1;
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    async fn fill_and_submit(&self, _locator: &Locator, text: &str) -> Result<(), BrowserError> {
        let hang = {
            let mut st = self.lock();
            st.log.searches.push(text.to_string());
            st.current = st
                .results
                .get(text)
                .cloned()
                .unwrap_or_else(|| st.default_results.clone());
            st.selected = None;
            st.name_blank = false;
            st.blank_reads_left = st
                .current
                .iter()
                .enumerate()
                .filter(|(_, l)| l.blank_name_reads > 0)
                .map(|(i, l)| (i, l.blank_name_reads))
                .collect();
            st.hanging.contains(text)
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), BrowserError> {
        self.lock().log.scrolls.push((dx, dy));
        Ok(())
    }

    async fn wait(&self, ms: u64) {
        self.lock().log.waited_ms += ms;
        tokio::task::yield_now().await;
    }

    async fn count_matches(&self, locator: &Locator) -> Result<usize, BrowserError> {
        let mut st = self.lock();
        st.log.count_calls += 1;
        if locator.name != "result_anchor" {
            return Ok(usize::from(st.selected.is_some()));
        }
        if let Some(next) = st.anchor_script.pop_front() {
            st.last_scripted_count = Some(next);
            return Ok(next);
        }
        Ok(st.last_scripted_count.unwrap_or(st.current.len()))
    }

    async fn all_matches(&self, _locator: &Locator) -> Result<Vec<Box<dyn ListingHandle>>, BrowserError> {
        let count = self.lock().current.len();
        Ok((0..count)
            .map(|index| {
                Box::new(ScriptedHandle {
                    page: self.clone(),
                    index,
                }) as Box<dyn ListingHandle>
            })
            .collect())
    }

    async fn read_text(&self, locator: &Locator) -> String {
        let mut st = self.lock();
        let Some(index) = st.selected else {
            return String::new();
        };
        let render = st.current.get(index).map(|l| l.render).unwrap_or_default();
        match locator.name {
            "name" => {
                st.log.name_reads += 1;
                let blank = match st.blank_reads_left.get_mut(&index) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                };
                st.name_blank = blank;
                if blank || render != Render::Primary {
                    return String::new();
                }
                field(&st, index, "name")
            }
            "name_fallback" => {
                if st.name_blank || render == Render::Never {
                    return String::new();
                }
                field(&st, index, "name")
            }
            other => field(&st, index, other),
        }
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        let st = self.lock();
        let selected = st.selected.and_then(|i| st.current.get(i));
        let present = match locator.name {
            "result_anchor" => !st.current.is_empty(),
            "name" => selected.is_some_and(|l| l.render == Render::Primary),
            "name_fallback" => selected.is_some_and(|l| l.render != Render::Never),
            _ => true,
        };
        if present {
            Ok(())
        } else {
            Err(BrowserError::Timeout {
                locator: locator.name.to_string(),
                timeout,
            })
        }
    }
}

fn field(st: &ScriptState, index: usize, key: &str) -> String {
    st.current
        .get(index)
        .and_then(|l| l.fields.get(key))
        .cloned()
        .unwrap_or_default()
}

struct ScriptedHandle {
    page: ScriptedPage,
    index: usize,
}

#[async_trait]
impl ListingHandle for ScriptedHandle {
    fn related_parent(&self) -> Box<dyn ListingHandle> {
        Box::new(ScriptedHandle {
            page: self.page.clone(),
            index: self.index,
        })
    }

    async fn click(&self) -> Result<(), BrowserError> {
        let mut st = self.page.lock();
        let fails = st.current.get(self.index).is_none_or(|l| l.click_fails);
        if fails {
            return Err(BrowserError::Interaction {
                locator: self.describe(),
                reason: "scripted click failure".to_string(),
            });
        }
        st.selected = Some(self.index);
        st.log.clicks.push(self.index);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("scripted listing #{}", self.index)
    }
}

/// Launcher handing out sessions over one shared `ScriptedPage`.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    page: ScriptedPage,
    fail_launch: bool,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Default::default()
        }
    }

    pub fn page(&self) -> &ScriptedPage {
        &self.page
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn BrowserSession>, BrowserError> {
        if self.fail_launch {
            return Err(BrowserError::Session("scripted launch failure".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            page: self.page.clone(),
            closes: Arc::clone(&self.closes),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    page: ScriptedPage,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    fn page(&self) -> &dyn BrowserPage {
        &self.page
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        if !self.closed {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
