//! Structured-metadata strategy: JSON-LD article objects, OpenGraph,
//! `article:*` properties and plain `<meta>` tags.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

use super::{ExtractionStrategy, FetchedPage, PartialRecord, StrategyKind};
use crate::dates::parse_publish_date;
use crate::error::StrategyError;
use crate::text::split_authors;

static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").unwrap());

const ARTICLE_TYPES: [&str; 6] = [
    "NewsArticle",
    "Article",
    "ReportageNewsArticle",
    "AnalysisNewsArticle",
    "BlogPosting",
    "LiveBlogPosting",
];

const TITLE_KEYS: [&str; 3] = ["og:title", "twitter:title", "title"];
const DATE_KEYS: [&str; 7] = [
    "article:published_time",
    "og:article:published_time",
    "datepublished",
    "publish-date",
    "pubdate",
    "parsely-pub-date",
    "dc.date.issued",
];
const AUTHOR_KEYS: [&str; 3] = ["author", "article:author", "parsely-author"];
const KEYWORD_KEYS: [&str; 2] = ["news_keywords", "keywords"];
const DESCRIPTION_KEYS: [&str; 3] = ["og:description", "description", "twitter:description"];
const LANGUAGE_KEYS: [&str; 2] = ["content-language", "og:locale"];

#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataStrategy;

impl ExtractionStrategy for MetadataStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Metadata
    }

    fn extract(&self, page: &FetchedPage) -> Result<PartialRecord, StrategyError> {
        if page.html.trim().is_empty() {
            return Err(StrategyError::EmptyDocument);
        }
        let document = Html::parse_document(&page.html);
        let meta = MetaTags::collect(&document);
        let ld = json_ld_articles(&document);

        let mut partial = PartialRecord::default();

        for article in &ld {
            fill_from_json_ld(&mut partial, article);
        }

        if partial.headline.is_none() {
            partial.headline = meta.first(&TITLE_KEYS);
        }
        if partial.publish_date.is_none() {
            partial.publish_date = meta
                .all(&DATE_KEYS)
                .iter()
                .find_map(|raw| parse_publish_date(raw));
        }
        if partial.authors.is_empty() {
            partial.authors = meta
                .all(&AUTHOR_KEYS)
                .iter()
                .filter(|a| !a.starts_with("http"))
                .flat_map(|a| split_authors(a))
                .collect();
        }
        if partial.keywords.is_empty() {
            if let Some(raw) = meta.first(&KEYWORD_KEYS) {
                partial.keywords = split_keywords(&raw);
            }
        }
        if partial.summary.is_none() {
            partial.summary = meta.first(&DESCRIPTION_KEYS);
        }
        if partial.language.is_none() {
            partial.language = meta.first(&LANGUAGE_KEYS).map(|l| language_code(&l));
        }

        Ok(partial)
    }
}

/// `<meta>` tags keyed by lowercased `property`, `name`, `itemprop` or
/// `http-equiv`, in document order.
struct MetaTags(Vec<(String, String)>);

impl MetaTags {
    fn collect(document: &Html) -> Self {
        let tags = document
            .select(&META)
            .filter_map(|el| {
                let v = el.value();
                let key = v
                    .attr("property")
                    .or_else(|| v.attr("name"))
                    .or_else(|| v.attr("itemprop"))
                    .or_else(|| v.attr("http-equiv"))?;
                let content = v.attr("content")?.trim();
                (!content.is_empty()).then(|| (key.trim().to_lowercase(), content.to_string()))
            })
            .collect();
        Self(tags)
    }

    /// First value for the earliest-listed key that is present.
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.0
                .iter()
                .find(|(k, _)| k.as_str() == *key)
                .map(|(_, v)| v.clone())
        })
    }

    fn all(&self, keys: &[&str]) -> Vec<String> {
        keys.iter()
            .flat_map(|key| self.0.iter().filter(move |(k, _)| k.as_str() == *key))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Every JSON-LD object whose `@type` is an article type, looking inside
/// top-level arrays and `@graph` containers.
fn json_ld_articles(document: &Html) -> Vec<Value> {
    let mut found = Vec::new();
    for script in document.select(&JSON_LD) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        collect_articles(value, &mut found);
    }
    found
}

fn collect_articles(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| collect_articles(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_articles(graph, out);
            }
            let value = Value::Object(map);
            if is_article(&value) {
                out.push(value);
            }
        }
        _ => {}
    }
}

fn is_article(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => ARTICLE_TYPES.contains(&t.as_str()),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| ARTICLE_TYPES.contains(&t)),
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map.get("name").and_then(as_text),
        _ => None,
    }
}

fn fill_from_json_ld(partial: &mut PartialRecord, article: &Value) {
    if partial.headline.is_none() {
        partial.headline = article
            .get("headline")
            .or_else(|| article.get("name"))
            .and_then(as_text);
    }
    if partial.body_text.is_none() {
        partial.body_text = article.get("articleBody").and_then(as_text);
    }
    if partial.publish_date.is_none() {
        partial.publish_date = article
            .get("datePublished")
            .or_else(|| article.get("dateCreated"))
            .and_then(Value::as_str)
            .and_then(parse_publish_date);
    }
    if partial.authors.is_empty() {
        partial.authors = match article.get("author") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(as_text)
                .flat_map(|a| split_authors(&a))
                .collect(),
            Some(other) => as_text(other).map(|a| split_authors(&a)).unwrap_or_default(),
            None => Vec::new(),
        };
    }
    if partial.keywords.is_empty() {
        partial.keywords = match article.get("keywords") {
            Some(Value::String(s)) => split_keywords(s),
            Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
            _ => Vec::new(),
        };
    }
    if partial.summary.is_none() {
        partial.summary = article.get("description").and_then(as_text);
    }
    if partial.language.is_none() {
        partial.language = article
            .get("inLanguage")
            .and_then(as_text)
            .map(|l| language_code(&l));
    }
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// `en-IN`, `en_IN` and `EN` all become `en`.
pub(crate) fn language_code(raw: &str) -> String {
    raw.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}
