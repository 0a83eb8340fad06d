//! Search-result harvesting.
//!
//! [`SearchResultHarvester`] drives a browser session through the result
//! pages of a site-restricted, date-filtered web search and collects the
//! article links on them. A harvest never retries: a bot challenge ends it
//! with [`HarvestOutcome::Blocked`] and whatever links were found so far.

pub mod browser;
pub mod links;

use chrono::Utc;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, DelayBounds, ScrapeMode};
use crate::error::HarvestError;
use crate::utils::{pause, slugify};
use browser::{BrowserSession, SessionLauncher};
use links::{detect_block, extract_links};

const SEARCH_ENDPOINT: &str = "https://www.google.com/search";
const RESULTS_PER_PAGE: usize = 10;

/// Accept buttons on the consent interstitial, tried once each.
const CONSENT_SELECTORS: [&str; 5] = [
    "button#L2AGLb",
    "button#W0wltc",
    "button[aria-label='Accept all']",
    "form[action*='consent'] button",
    "#introAgreeButton",
];

/// Everything a harvest needs from configuration for one scrape mode.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub language: String,
    pub country: String,
    pub pages: usize,
    pub page_delay: DelayBounds,
    pub min_slug_len: usize,
    pub snapshot_dir: PathBuf,
}

impl HarvestSettings {
    pub fn from_config(config: &Config, mode: ScrapeMode) -> Self {
        let pacing = config.mode(mode);
        Self {
            language: config.search.language.clone(),
            country: config.search.country.clone(),
            pages: pacing.pages.max(1),
            page_delay: pacing.page_delay,
            min_slug_len: config.search.min_slug_len,
            snapshot_dir: config.search.snapshot_dir.clone(),
        }
    }
}

/// One keyword on one domain, optionally restricted to a date range given
/// as `MM/DD/YYYY` bounds.
#[derive(Debug, Clone)]
pub struct HarvestRequest<'a> {
    pub keyword: &'a str,
    pub domain: &'a str,
    pub date_filter: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// Every configured page was read.
    Complete,
    /// `page` had no result links; pagination stopped there.
    Exhausted { page: usize },
    /// A bot challenge, or a consent wall that would not go away, was
    /// detected on `page`.
    Blocked {
        page: usize,
        marker: &'static str,
        snapshot: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    /// Unique article links in discovery order.
    pub urls: Vec<String>,
    pub pages_fetched: usize,
    pub outcome: HarvestOutcome,
}

impl HarvestReport {
    pub fn is_blocked(&self) -> bool {
        matches!(self.outcome, HarvestOutcome::Blocked { .. })
    }
}

/// Build the search URL for `page` (0-based) of a request.
pub fn build_search_url(req: &HarvestRequest<'_>, settings: &HarvestSettings, page: usize) -> String {
    let query = format!("'{}' site:{}", req.keyword, req.domain);
    let mut url = format!(
        "{SEARCH_ENDPOINT}?q={}&hl={}&gl={}&lr=lang_{}",
        urlencoding::encode(&query),
        settings.language,
        settings.country,
        settings.language,
    );
    if let Some((min, max)) = &req.date_filter {
        let tbs = format!("cdr:1,cd_min:{min},cd_max:{max}");
        url.push_str("&tbs=");
        url.push_str(&urlencoding::encode(&tbs));
    }
    if page > 0 {
        url.push_str(&format!("&start={}", page * RESULTS_PER_PAGE));
    }
    url
}

pub struct SearchResultHarvester<L> {
    launcher: L,
    settings: HarvestSettings,
}

impl<L: SessionLauncher> SearchResultHarvester<L> {
    pub fn new(launcher: L, settings: HarvestSettings) -> Self {
        Self { launcher, settings }
    }

    /// Collect article links for one keyword/domain pair.
    ///
    /// A fresh browser session is launched for the harvest and released on
    /// every exit path. Pagination stops early at the first page without
    /// result links, and immediately on a bot challenge.
    ///
    /// # Errors
    ///
    /// Launch and navigation failures. A block is an outcome, not an error.
    #[instrument(level = "info", skip(self, req), fields(keyword = req.keyword, domain = req.domain))]
    pub async fn harvest(&self, req: &HarvestRequest<'_>) -> Result<HarvestReport, HarvestError> {
        let mut session = self.launcher.launch()?;
        let mut urls: Vec<String> = Vec::new();
        let mut consent_tried = false;

        for page in 0..self.settings.pages {
            let search_url = build_search_url(req, &self.settings, page);
            debug!(page, %search_url, "Loading result page");
            let mut html = match load_page(&mut session, &search_url) {
                Ok(html) => html,
                Err(e) => {
                    warn!(page, error = %e, "Result page failed to load");
                    let partial = session.content().unwrap_or_default();
                    self.snapshot("error", req, page, &partial).await;
                    return Err(e);
                }
            };

            if !consent_tried && links::looks_like_consent(&html, &session.current_url()) {
                consent_tried = true;
                if dismiss_consent(&mut session) {
                    html = session.content()?;
                }
                if links::looks_like_consent(&html, &session.current_url()) {
                    warn!(page, "Consent interstitial could not be dismissed; abandoning harvest");
                    let snapshot = self.snapshot("blocked", req, page, &html).await;
                    return Ok(HarvestReport {
                        urls,
                        pages_fetched: page + 1,
                        outcome: HarvestOutcome::Blocked {
                            page,
                            marker: "consent",
                            snapshot,
                        },
                    });
                }
            }

            let title = session.title();
            let current_url = session.current_url();
            if let Some(marker) = detect_block(&title, &html, &current_url) {
                warn!(page, marker, "Search engine challenge detected; abandoning harvest");
                let snapshot = self.snapshot("blocked", req, page, &html).await;
                return Ok(HarvestReport {
                    urls,
                    pages_fetched: page + 1,
                    outcome: HarvestOutcome::Blocked {
                        page,
                        marker,
                        snapshot,
                    },
                });
            }

            let found = extract_links(&html, req.domain, self.settings.min_slug_len);
            if found.is_empty() {
                info!(page, total = urls.len(), "No result links on page; stopping");
                self.snapshot("no_links", req, page, &html).await;
                return Ok(HarvestReport {
                    urls,
                    pages_fetched: page + 1,
                    outcome: HarvestOutcome::Exhausted { page },
                });
            }

            let before = urls.len();
            for url in found {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            debug!(page, new = urls.len() - before, total = urls.len(), "Collected result links");

            if page + 1 < self.settings.pages {
                pause(&self.settings.page_delay).await;
            }
        }

        info!(total = urls.len(), "Harvest complete");
        Ok(HarvestReport {
            urls,
            pages_fetched: self.settings.pages,
            outcome: HarvestOutcome::Complete,
        })
    }

    /// Write the page HTML for later inspection. Failures are logged only.
    async fn snapshot(
        &self,
        reason: &str,
        req: &HarvestRequest<'_>,
        page: usize,
        html: &str,
    ) -> Option<PathBuf> {
        let name = format!(
            "{reason}_{}_{}_p{page}_{}.html",
            slugify(req.keyword),
            slugify(req.domain),
            Utc::now().format("%Y%m%d%H%M%S"),
        );
        let path = self.settings.snapshot_dir.join(name);
        if let Err(e) = tokio::fs::create_dir_all(&self.settings.snapshot_dir).await {
            warn!(dir = %self.settings.snapshot_dir.display(), error = %e, "Cannot create snapshot directory");
            return None;
        }
        match tokio::fs::write(&path, html).await {
            Ok(()) => {
                debug!(path = %path.display(), "Saved page snapshot");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to save page snapshot");
                None
            }
        }
    }
}

fn load_page<S: BrowserSession>(session: &mut S, url: &str) -> Result<String, HarvestError> {
    session.navigate(url)?;
    session.content()
}

fn dismiss_consent<S: BrowserSession>(session: &mut S) -> bool {
    for selector in CONSENT_SELECTORS {
        if session.click_first(selector) {
            debug!(selector, "Dismissed consent interstitial");
            return true;
        }
    }
    debug!("Consent interstitial found but no accept button matched");
    false
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted browser sessions for harvester and orchestrator tests.

    use super::browser::{BrowserSession, SessionLauncher};
    use crate::error::HarvestError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    pub struct FakePage {
        pub html: String,
        pub title: String,
        pub url: String,
    }

    impl FakePage {
        pub fn html(html: &str) -> Self {
            Self {
                html: html.to_string(),
                title: "Search results".to_string(),
                url: "https://www.google.com/search".to_string(),
            }
        }
    }

    /// Shared counters observed by tests.
    #[derive(Debug, Default)]
    pub struct Tracker {
        pub launches: AtomicUsize,
        pub drops: AtomicUsize,
        pub clicks: Mutex<Vec<String>>,
        pub navigations: Mutex<Vec<String>>,
    }

    impl Tracker {
        pub fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }

        pub fn drops(&self) -> usize {
            self.drops.load(Ordering::SeqCst)
        }

        pub fn navigations(&self) -> Vec<String> {
            self.navigations.lock().unwrap().clone()
        }
    }

    /// Serves pages by substring of the search query (`keyword` or
    /// `keyword@page`), falling back to an empty result page.
    #[derive(Debug, Clone, Default)]
    pub struct FakeLauncher {
        pub tracker: Arc<Tracker>,
        pages: Arc<HashMap<String, VecDeque<FakePage>>>,
        fail_launch: bool,
        fail_navigation_for: Option<String>,
        after_click: Option<FakePage>,
    }

    impl FakeLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pages returned, in order, for navigations whose URL contains `needle`.
        pub fn serve(mut self, needle: &str, pages: Vec<FakePage>) -> Self {
            Arc::make_mut(&mut self.pages).insert(needle.to_string(), pages.into());
            self
        }

        pub fn failing_launch(mut self) -> Self {
            self.fail_launch = true;
            self
        }

        pub fn failing_navigation(mut self, needle: &str) -> Self {
            self.fail_navigation_for = Some(needle.to_string());
            self
        }

        pub fn after_click(mut self, page: FakePage) -> Self {
            self.after_click = Some(page);
            self
        }
    }

    impl SessionLauncher for FakeLauncher {
        type Session = FakeSession;

        fn launch(&self) -> Result<FakeSession, HarvestError> {
            if self.fail_launch {
                return Err(HarvestError::Launch("chrome not found".to_string()));
            }
            self.tracker.launches.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession {
                launcher: self.clone(),
                queues: (*self.pages).clone(),
                current: None,
            })
        }
    }

    pub struct FakeSession {
        launcher: FakeLauncher,
        queues: HashMap<String, VecDeque<FakePage>>,
        current: Option<FakePage>,
    }

    impl BrowserSession for FakeSession {
        fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
            self.launcher.tracker.navigations.lock().unwrap().push(url.to_string());
            if let Some(needle) = &self.launcher.fail_navigation_for {
                if url.contains(needle.as_str()) {
                    return Err(HarvestError::Navigation {
                        url: url.to_string(),
                        message: "net::ERR_TIMED_OUT".to_string(),
                    });
                }
            }
            let decoded = urlencoding::decode(url).map(|s| s.into_owned()).unwrap_or_default();
            let mut needles: Vec<&String> = self.queues.keys().collect();
            needles.sort_by_key(|n| std::cmp::Reverse(n.len()));
            let needle = needles.into_iter().find(|n| decoded.contains(n.as_str())).cloned();
            self.current = needle
                .and_then(|n| self.queues.get_mut(&n).and_then(VecDeque::pop_front))
                .or_else(|| Some(FakePage::html("<html><body></body></html>")));
            Ok(())
        }

        fn content(&mut self) -> Result<String, HarvestError> {
            Ok(self.current.as_ref().map(|p| p.html.clone()).unwrap_or_default())
        }

        fn title(&mut self) -> String {
            self.current.as_ref().map(|p| p.title.clone()).unwrap_or_default()
        }

        fn current_url(&mut self) -> String {
            self.current.as_ref().map(|p| p.url.clone()).unwrap_or_default()
        }

        fn click_first(&mut self, selector: &str) -> bool {
            self.launcher.tracker.clicks.lock().unwrap().push(selector.to_string());
            match &self.launcher.after_click {
                Some(page) if selector == "button#L2AGLb" => {
                    self.current = Some(page.clone());
                    true
                }
                _ => false,
            }
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.launcher.tracker.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A result page linking to each of `urls` through the primary pattern.
    pub fn results_page(urls: &[&str]) -> FakePage {
        let blocks: String = urls
            .iter()
            .map(|u| format!(r#"<div class="MjjYud"><a href="{u}"><h3>Result</h3></a></div>"#))
            .collect();
        FakePage::html(&format!(r#"<html><body><div id="search">{blocks}</div></body></html>"#))
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeLauncher, FakePage, results_page};
    use super::*;

    const A1: &str = "https://www.moneycontrol.com/news/business/infosys-wins-large-deal-1.html";
    const A2: &str = "https://www.moneycontrol.com/news/business/infosys-margin-outlook-2.html";
    const A3: &str = "https://www.moneycontrol.com/news/business/infosys-buyback-plan-3.html";

    fn settings(pages: usize, dir: &std::path::Path) -> HarvestSettings {
        HarvestSettings {
            language: "en".to_string(),
            country: "IN".to_string(),
            pages,
            page_delay: DelayBounds::zero(),
            min_slug_len: 12,
            snapshot_dir: dir.to_path_buf(),
        }
    }

    fn request(date_filter: bool) -> HarvestRequest<'static> {
        HarvestRequest {
            keyword: "Infosys",
            domain: "moneycontrol.com",
            date_filter: date_filter.then(|| ("05/01/2025".to_string(), "05/31/2025".to_string())),
        }
    }

    #[test]
    fn test_build_search_url() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(2, dir.path());
        let url = build_search_url(&request(true), &s, 0);
        assert!(url.starts_with("https://www.google.com/search?q="));
        assert!(url.contains(&*urlencoding::encode("'Infosys' site:moneycontrol.com")));
        assert!(url.contains("&hl=en&gl=IN&lr=lang_en"));
        assert!(url.contains(&*urlencoding::encode("cdr:1,cd_min:05/01/2025,cd_max:05/31/2025")));
        assert!(!url.contains("&start="));

        let second = build_search_url(&request(false), &s, 1);
        assert!(second.ends_with("&start=10"));
        assert!(!second.contains("tbs="));
    }

    #[tokio::test]
    async fn test_harvest_collects_across_pages() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new().serve(
            "Infosys",
            vec![results_page(&[A1, A2]), results_page(&[A2, A3])],
        );
        let tracker = launcher.tracker.clone();
        let harvester = SearchResultHarvester::new(launcher, settings(2, dir.path()));

        let report = harvester.harvest(&request(true)).await.unwrap();
        assert_eq!(report.urls, vec![A1, A2, A3]);
        assert_eq!(report.outcome, HarvestOutcome::Complete);
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(tracker.launches(), 1);
        assert_eq!(tracker.drops(), 1);
        assert_eq!(tracker.navigations().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_links_stops_early_and_snapshots_once() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new().serve("Infosys", vec![results_page(&[A1])]);
        let tracker = launcher.tracker.clone();
        let harvester = SearchResultHarvester::new(launcher, settings(5, dir.path()));

        let report = harvester.harvest(&request(false)).await.unwrap();
        assert_eq!(report.urls, vec![A1]);
        assert_eq!(report.outcome, HarvestOutcome::Exhausted { page: 1 });
        assert_eq!(tracker.navigations().len(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(tracker.drops(), 1);
    }

    #[tokio::test]
    async fn test_no_matches_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let harvester = SearchResultHarvester::new(FakeLauncher::new(), settings(3, dir.path()));
        let report = harvester.harvest(&request(true)).await.unwrap();
        assert!(report.urls.is_empty());
        assert_eq!(report.outcome, HarvestOutcome::Exhausted { page: 0 });
    }

    #[tokio::test]
    async fn test_block_returns_partial_links() {
        let dir = tempfile::tempdir().unwrap();
        let mut blocked = FakePage::html("<html><body><div class='g-recaptcha'></div></body></html>");
        blocked.url = "https://www.google.com/sorry/index".to_string();
        let launcher =
            FakeLauncher::new().serve("Infosys", vec![results_page(&[A1, A2]), blocked]);
        let tracker = launcher.tracker.clone();
        let harvester = SearchResultHarvester::new(launcher, settings(3, dir.path()));

        let report = harvester.harvest(&request(true)).await.unwrap();
        assert!(report.is_blocked());
        assert_eq!(report.urls, vec![A1, A2]);
        match report.outcome {
            HarvestOutcome::Blocked { page, marker, snapshot } => {
                assert_eq!(page, 1);
                assert_eq!(marker, "/sorry/");
                assert!(snapshot.unwrap().exists());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(tracker.navigations().len(), 2);
        assert_eq!(tracker.drops(), 1);
    }

    #[tokio::test]
    async fn test_consent_dismissed_once() {
        let dir = tempfile::tempdir().unwrap();
        let consent = FakePage {
            html: "<html><body>Before you continue to Google</body></html>".to_string(),
            title: "Before you continue".to_string(),
            url: "https://consent.google.com/ml".to_string(),
        };
        let launcher = FakeLauncher::new()
            .serve("Infosys", vec![consent])
            .after_click(results_page(&[A1]));
        let tracker = launcher.tracker.clone();
        let harvester = SearchResultHarvester::new(launcher, settings(1, dir.path()));

        let report = harvester.harvest(&request(true)).await.unwrap();
        assert_eq!(report.urls, vec![A1]);
        assert_eq!(report.outcome, HarvestOutcome::Complete);
        assert_eq!(tracker.clicks.lock().unwrap().as_slice(), ["button#L2AGLb"]);
    }

    #[tokio::test]
    async fn test_undismissable_consent_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let consent = FakePage {
            html: "<html><body>Before you continue to Google</body></html>".to_string(),
            title: "Before you continue".to_string(),
            url: "https://consent.google.com/ml".to_string(),
        };
        let launcher = FakeLauncher::new().serve("Infosys", vec![consent]);
        let tracker = launcher.tracker.clone();
        let harvester = SearchResultHarvester::new(launcher, settings(3, dir.path()));

        let report = harvester.harvest(&request(true)).await.unwrap();
        assert!(report.is_blocked());
        assert!(report.urls.is_empty());
        match report.outcome {
            HarvestOutcome::Blocked { page, marker, snapshot } => {
                assert_eq!(page, 0);
                assert_eq!(marker, "consent");
                let snapshot = snapshot.unwrap();
                assert!(snapshot.exists());
                let name = snapshot.file_name().unwrap().to_string_lossy().into_owned();
                assert!(name.starts_with("blocked_"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(tracker.clicks.lock().unwrap().len(), CONSENT_SELECTORS.len());
        assert_eq!(tracker.navigations().len(), 1);
        assert_eq!(tracker.drops(), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_releases_session() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::new().failing_navigation("Infosys");
        let tracker = launcher.tracker.clone();
        let harvester = SearchResultHarvester::new(launcher, settings(2, dir.path()));

        let err = harvester.harvest(&request(true)).await.unwrap_err();
        assert!(matches!(err, HarvestError::Navigation { .. }));
        assert_eq!(tracker.launches(), 1);
        assert_eq!(tracker.drops(), 1);

        let snapshots: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].starts_with("error_"));
    }

    #[tokio::test]
    async fn test_launch_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let harvester =
            SearchResultHarvester::new(FakeLauncher::new().failing_launch(), settings(1, dir.path()));
        assert!(matches!(
            harvester.harvest(&request(true)).await,
            Err(HarvestError::Launch(_))
        ));
    }
}
