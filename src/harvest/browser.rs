//! Browser automation seam.
//!
//! The harvester only needs a handful of page operations, expressed by
//! [`BrowserSession`]. [`ChromeLauncher`] provides them over a headless
//! Chrome instance; tests substitute scripted sessions.
//!
//! Chrome calls are blocking. The harvester drives one session at a time,
//! so they run inline on the runtime thread.

use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::SearchConfig;
use crate::error::HarvestError;
use crate::extract::random_user_agent;

/// One live browser page. Dropping the session closes the browser.
pub trait BrowserSession {
    /// Load `url` and wait for navigation to settle.
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError>;

    /// Current rendered HTML.
    fn content(&mut self) -> Result<String, HarvestError>;

    /// Page title, empty when unavailable.
    fn title(&mut self) -> String;

    /// URL after redirects, empty when unavailable.
    fn current_url(&mut self) -> String;

    /// Click the first element matching `selector`. Returns whether a click
    /// happened.
    fn click_first(&mut self, selector: &str) -> bool;
}

/// Starts fresh browser sessions.
pub trait SessionLauncher {
    type Session: BrowserSession;

    fn launch(&self) -> Result<Self::Session, HarvestError>;
}

/// Launches headless Chrome with a randomized user agent and the automation
/// flag masked.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    chrome_path: Option<PathBuf>,
    page_load_timeout: Duration,
    language: String,
}

impl ChromeLauncher {
    pub fn from_config(search: &SearchConfig) -> Self {
        Self {
            headless: search.headless,
            chrome_path: search.chrome_path.clone(),
            page_load_timeout: Duration::from_secs(search.page_load_timeout_secs.max(1)),
            language: search.language.clone(),
        }
    }
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    #[instrument(level = "debug", skip_all)]
    fn launch(&self) -> Result<ChromeSession, HarvestError> {
        let ua_arg = format!("--user-agent={}", random_user_agent());
        let lang_arg = format!("--lang={}", self.language);
        let args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--incognito"),
            OsStr::new(&ua_arg),
            OsStr::new(&lang_arg),
        ];

        let browser = Browser::new(LaunchOptions {
            headless: self.headless,
            window_size: Some((1920, 1080)),
            path: self.chrome_path.clone(),
            idle_browser_timeout: self.page_load_timeout * 4,
            args,
            ..Default::default()
        })
        .map_err(|e| HarvestError::Launch(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| HarvestError::Launch(e.to_string()))?;
        tab.set_default_timeout(self.page_load_timeout);
        debug!(headless = self.headless, "Browser session started");

        Ok(ChromeSession {
            browser: Some(browser),
            tab,
        })
    }
}

pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| HarvestError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    fn content(&mut self) -> Result<String, HarvestError> {
        self.tab
            .get_content()
            .map_err(|e| HarvestError::Browser(e.to_string()))
    }

    fn title(&mut self) -> String {
        self.tab.get_title().unwrap_or_default()
    }

    fn current_url(&mut self) -> String {
        self.tab.get_url()
    }

    fn click_first(&mut self, selector: &str) -> bool {
        match self.tab.find_element(selector) {
            Ok(element) => match element.click() {
                Ok(_) => {
                    if let Err(e) = self.tab.wait_until_navigated() {
                        debug!(selector, error = %e, "Navigation after click did not settle");
                    }
                    true
                }
                Err(e) => {
                    debug!(selector, error = %e, "Click failed");
                    false
                }
            },
            Err(_) => false,
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(true) {
            warn!(error = %e, "Failed to close browser tab");
        }
        if self.browser.take().is_some() {
            debug!("Browser session closed");
        }
    }
}
