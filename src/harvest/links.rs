//! Search-result page parsing: candidate link extraction, URL validation
//! and bot-challenge detection.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// One structural pattern for locating result links.
struct LinkPattern {
    name: &'static str,
    anchors: Selector,
    /// Only anchors that contain a result heading count.
    require_heading: bool,
}

impl LinkPattern {
    fn new(name: &'static str, selector: &str, require_heading: bool) -> Self {
        Self {
            name,
            anchors: Selector::parse(selector).unwrap(),
            require_heading,
        }
    }
}

/// Result-link patterns, most specific first. The search engine reshuffles
/// its markup regularly; older layouts stay listed as fallbacks.
static LINK_PATTERNS: Lazy<Vec<LinkPattern>> = Lazy::new(|| {
    vec![
        LinkPattern::new("result-block", "div.MjjYud a[href]", true),
        LinkPattern::new("title-link", "div.yuRUbf > a[href]", false),
        LinkPattern::new("legacy-result", "div.g div.yuRUbf a[href]", false),
        LinkPattern::new("search-result", "#search div.g a[href]", true),
        LinkPattern::new("any-heading-anchor", "a[href]", true),
    ]
});

static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").unwrap());

static NON_ARTICLE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \.(pdf|xml|rss|jpe?g|png|gif|svg|webp|mp3|mp4|zip|docx?|xlsx?|pptx?)$
        | /(feeds?|rss|tags?|topics?|authors?|search|privacy(-policy)?|about(-us)?
            |contact(-us)?|terms(-of-use|-and-conditions)?|disclaimer|sitemap|login|subscribe
            |newsletters?)(/|$)",
    )
    .unwrap()
});

/// Hosts that belong to the search engine itself or its account and
/// consent flows.
const ENGINE_HOSTS: [&str; 6] = [
    "google.",
    "googleusercontent.com",
    "accounts.",
    "consent.",
    "support.google",
    "policies.google",
];

/// Bot-challenge markers, checked against the lowercased page and title.
const BLOCK_MARKERS: [&str; 4] = [
    "recaptcha",
    "unusual traffic",
    "требуется ввести символы",
    "访问验证",
];

/// Returns the first block marker found on the page, if any.
pub fn detect_block(title: &str, html: &str, current_url: &str) -> Option<&'static str> {
    if current_url.contains("/sorry/") {
        return Some("/sorry/");
    }
    let title = title.to_lowercase();
    let html = html.to_lowercase();
    BLOCK_MARKERS
        .iter()
        .find(|marker| title.contains(*marker) || html.contains(*marker))
        .copied()
}

/// Whether the page is a cookie/consent interstitial rather than results.
pub fn looks_like_consent(html: &str, current_url: &str) -> bool {
    if current_url.contains("consent.") {
        return true;
    }
    html.to_lowercase().contains("before you continue to google")
}

/// Unwrap `/url?q=<target>` redirect links; resolve other relative links
/// against the search engine origin.
fn resolve_href(href: &str) -> Option<Url> {
    let base = Url::parse("https://www.google.com/").ok()?;
    let url = base.join(href.trim()).ok()?;
    if url.path() == "/url" {
        let target = url
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "url")
            .map(|(_, v)| v.into_owned())?;
        return Url::parse(&target).ok();
    }
    Some(url)
}

/// Split `thehindu.com/business/` into its host part and path prefix.
fn split_domain(domain: &str) -> (String, Option<String>) {
    let domain = domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .to_lowercase();
    match domain.split_once('/') {
        Some((host, path)) if !path.trim_matches('/').is_empty() => {
            (host.to_string(), Some(format!("/{}", path.trim_start_matches('/'))))
        }
        Some((host, _)) => (host.to_string(), None),
        None => (domain, None),
    }
}

/// Validate a raw result link for `domain`. Returns the cleaned absolute URL
/// (fragment removed) when it looks like an article on that domain.
pub fn validate_candidate(href: &str, domain: &str, min_slug_len: usize) -> Option<String> {
    let mut url = resolve_href(href)?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_lowercase();
    if ENGINE_HOSTS.iter().any(|h| host.contains(h)) {
        return None;
    }

    let (domain_host, domain_path) = split_domain(domain);
    if !host.contains(&domain_host) {
        return None;
    }
    let path = url.path().to_lowercase();
    if let Some(prefix) = domain_path {
        if !path.starts_with(&prefix) {
            return None;
        }
    }
    if NON_ARTICLE_PATH.is_match(&path) {
        return None;
    }
    let has_slug = url
        .path_segments()
        .is_some_and(|mut segments| segments.any(|s| s.len() >= min_slug_len));
    if !has_slug {
        return None;
    }

    url.set_fragment(None);
    Some(url.to_string())
}

fn has_heading(anchor: &ElementRef) -> bool {
    anchor.select(&HEADING).next().is_some()
}

/// Valid article links on a results page, deduplicated in page order.
///
/// Patterns are tried in priority order; the first one yielding any valid
/// link decides the page.
pub fn extract_links(html: &str, domain: &str, min_slug_len: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    for pattern in LINK_PATTERNS.iter() {
        let links: Vec<String> = document
            .select(&pattern.anchors)
            .filter(|a| !pattern.require_heading || has_heading(a))
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| validate_candidate(href, domain, min_slug_len))
            .unique()
            .collect();
        if !links.is_empty() {
            debug!(pattern = pattern.name, count = links.len(), "Matched result links");
            return links;
        }
    }
    Vec::new()
}
