//! Browser discovery and launch configuration for `chromiumoxide`.
//!
//! * Finding a usable browser executable (env override → PATH → OS install
//!   paths → Playwright cache).
//! * Building a `BrowserConfig` for one harvesting session: headed/headless,
//!   proxy, locale, viewport and a rotated desktop user-agent.

use crate::scraping::browser::LaunchOptions;
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use rand::seq::IndexedRandom;
use std::path::{Path, PathBuf};

// ── User-Agent pool ──────────────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan
/// 3. OS-specific well-known install paths
/// 4. Playwright's browser cache (newest revision first)
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    for exe in [
        "google-chrome",
        "chromium",
        "chromium-browser",
        "chrome",
        "brave-browser",
    ] {
        if let Ok(full) = which::which(exe) {
            return Some(full.to_string_lossy().to_string());
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    playwright_chromium()
}

/// Newest `chromium-*` build in the Playwright cache, if any.
fn playwright_chromium() -> Option<String> {
    let (cache_dir, sub_path): (PathBuf, &[&str]) = if cfg!(target_os = "windows") {
        (dirs::data_local_dir()?.join("ms-playwright"), &["chrome-win", "chrome.exe"])
    } else {
        (dirs::home_dir()?.join(".cache").join("ms-playwright"), &["chrome-linux", "chrome"])
    };

    let mut revisions: Vec<PathBuf> = std::fs::read_dir(&cache_dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("chromium-"))
        })
        .collect();
    revisions.sort();

    revisions.into_iter().rev().find_map(|dir| {
        let exe = sub_path.iter().fold(dir, |acc, part| acc.join(part));
        exe.is_file().then(|| exe.to_string_lossy().to_string())
    })
}

// ── Launch config builder ────────────────────────────────────────────────────

/// Build a `BrowserConfig` for one harvesting session.
///
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`;
/// the user-agent is drawn from `DESKTOP_USER_AGENTS` unless the caller pins one.
pub fn build_session_config(exe: &str, options: &LaunchOptions) -> Result<BrowserConfig> {
    let ua = options
        .user_agent
        .clone()
        .unwrap_or_else(|| random_user_agent().to_string());

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: options.width,
            height: options.height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(options.width, options.height)
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-features=VizDisplayCompositor")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg(format!("--lang={}", options.locale))
        .arg(format!("--user-agent={}", ua));

    if options.headless {
        builder = builder.arg("--disable-gpu");
    } else {
        builder = builder.with_head();
    }

    if let Some(proxy) = options.proxy.as_deref() {
        builder = builder.arg(format!("--proxy-server={}", proxy));
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Mask proxy credentials for logging.
pub fn mask_proxy_credentials(proxy: &str) -> String {
    match url::Url::parse(proxy) {
        Ok(parsed) if !parsed.username().is_empty() => format!(
            "{}://{}:***@{}{}",
            parsed.scheme(),
            parsed.username(),
            parsed.host_str().unwrap_or("unknown"),
            parsed.port().map(|p| format!(":{}", p)).unwrap_or_default()
        ),
        _ => proxy.to_string(),
    }
}
