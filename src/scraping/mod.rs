pub mod browser;
pub mod browser_manager;
pub mod chromium;
pub mod locators;
pub mod scripted;

pub use browser::{BrowserError, BrowserLauncher, BrowserPage, BrowserSession, LaunchOptions, ListingHandle};
pub use locators::{Locator, Locators};
