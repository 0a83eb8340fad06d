//! Readability-style strategy.
//!
//! Scores every container by the paragraphs it directly holds (length and
//! comma count, half credit to the grandparent), skipping paragraphs inside
//! navigation, footers, share bars and similar chrome. The best-scoring
//! container's paragraphs become the body. Language comes from `<html lang>`
//! or, failing that, from `whatlang` detection over the body.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use whatlang::Lang;

use super::metadata::language_code;
use super::{ExtractionStrategy, FetchedPage, PartialRecord, StrategyKind};
use crate::error::StrategyError;
use crate::text::clean_text;

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static HTML_ROOT: Lazy<Selector> = Lazy::new(|| Selector::parse("html").unwrap());

const NOISE_TAGS: [&str; 11] = [
    "nav", "header", "footer", "aside", "form", "noscript", "script", "style", "figure",
    "figcaption", "button",
];

const NOISE_HINTS: [&str; 16] = [
    "comment", "share", "social", "related", "promo", "advert", "newsletter", "subscribe",
    "sidebar", "breadcrumb", "cookie", "popup", "footer", "also-read", "recommend", "trending",
];

/// Paragraphs shorter than this do not contribute to container scores.
const SCORING_MIN_CHARS: usize = 40;
/// Paragraphs shorter than this are dropped from the chosen container.
const BODY_MIN_CHARS: usize = 25;
/// Title segments shorter than this are treated as site names.
const TITLE_MIN_CHARS: usize = 15;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadabilityStrategy;

impl ExtractionStrategy for ReadabilityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Readability
    }

    fn extract(&self, page: &FetchedPage) -> Result<PartialRecord, StrategyError> {
        if page.html.trim().is_empty() {
            return Err(StrategyError::EmptyDocument);
        }
        let document = Html::parse_document(&page.html);
        let body_text = main_text(&document);
        let language = document
            .select(&HTML_ROOT)
            .next()
            .and_then(|html| html.value().attr("lang"))
            .map(language_code)
            .filter(|l| !l.is_empty())
            .or_else(|| body_text.as_deref().and_then(detect_language));

        Ok(PartialRecord {
            headline: title_headline(&document),
            body_text,
            language,
            ..PartialRecord::default()
        })
    }
}

fn is_noise(el: &ElementRef) -> bool {
    let v = el.value();
    if NOISE_TAGS.contains(&v.name()) {
        return true;
    }
    let hints = format!(
        "{} {}",
        v.attr("class").unwrap_or_default(),
        v.attr("id").unwrap_or_default()
    )
    .to_lowercase();
    NOISE_HINTS.iter().any(|hint| hints.contains(hint))
}

/// Whether the paragraph or any ancestor below `<body>` is page chrome.
fn in_noise(p: &ElementRef) -> bool {
    if is_noise(p) {
        return true;
    }
    p.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|el| !matches!(el.value().name(), "body" | "html"))
        .any(|el| is_noise(&el))
}

fn paragraph_text(p: &ElementRef) -> String {
    clean_text(&p.text().collect::<String>())
}

fn main_text(document: &Html) -> Option<String> {
    let mut scores = HashMap::new();
    let mut order = Vec::new();
    let mut add = |el: ElementRef, score: f64| {
        let id = el.id();
        let entry = scores.entry(id).or_insert_with(|| {
            order.push(id);
            0.0
        });
        *entry += score;
    };

    for p in document.select(&PARAGRAPH) {
        if in_noise(&p) {
            continue;
        }
        let text = paragraph_text(&p);
        if text.len() < SCORING_MIN_CHARS {
            continue;
        }
        let commas = text.matches(',').count() as f64;
        let score = 1.0 + commas + (text.len() as f64 / 100.0).min(3.0);
        if let Some(parent) = p.parent().and_then(ElementRef::wrap) {
            add(parent, score);
            if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap) {
                add(grandparent, score / 2.0);
            }
        }
    }

    // First container wins ties so the choice is stable across runs.
    let mut best: Option<(_, f64)> = None;
    for id in order {
        let score = scores[&id];
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((id, score));
        }
    }
    let (best_id, _) = best?;
    let container = document.tree.get(best_id).and_then(ElementRef::wrap)?;

    let paragraphs: Vec<String> = container
        .select(&PARAGRAPH)
        .filter(|p| !in_noise(p))
        .map(|p| paragraph_text(&p))
        .filter(|t| t.len() >= BODY_MIN_CHARS)
        .collect();
    (!paragraphs.is_empty()).then(|| paragraphs.join("\n\n"))
}

/// `<title>` with a trailing or leading site name removed.
fn title_headline(document: &Html) -> Option<String> {
    let title = clean_text(&document.select(&TITLE).next()?.text().collect::<String>());
    if title.is_empty() {
        return None;
    }
    for sep in [" | ", " - ", " :: ", " — "] {
        if let Some((head, tail)) = title.split_once(sep) {
            let best = if head.len() >= tail.len() { head } else { tail };
            if best.len() >= TITLE_MIN_CHARS {
                return Some(best.trim().to_string());
            }
        }
    }
    Some(title)
}

fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    let code = match info.lang() {
        Lang::Eng => "en",
        Lang::Hin => "hi",
        Lang::Mar => "mr",
        Lang::Tam => "ta",
        Lang::Tel => "te",
        Lang::Ben => "bn",
        Lang::Guj => "gu",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Por => "pt",
        other => other.code(),
    };
    Some(code.to_string())
}
