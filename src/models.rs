//! Data models shared across the pipeline.
//!
//! - [`ArticleRecord`]: the canonical persisted article
//! - [`ScoreUpdate`]: a partial update of sentiment fields and tags
//! - [`SearchQuery`]: one `(keyword, domain, window)` harvest unit and its
//!   idempotency key
//! - [`QueryState`]: lifecycle of a search query inside a scrape run

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A persisted news article.
///
/// `url` is the natural key: at most one record exists per URL. The
/// publication date is required here because a record without one is
/// rejected before persistence; once stored it is never altered by a
/// later upsert.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleRecord {
    /// Canonical article URL; unique and immutable.
    pub url: String,
    pub headline: Option<String>,
    pub body_text: Option<String>,
    /// Publication time, normalized to UTC and stored without offset.
    pub publication_date: NaiveDateTime,
    /// When this record was written, UTC.
    pub download_date: NaiveDateTime,
    pub source_domain: Option<String>,
    pub language: Option<String>,
    /// Authors in byline order.
    pub authors: Vec<String>,
    /// Keywords with duplicates removed, in first-seen order.
    pub extracted_keywords: Vec<String>,
    pub generated_summary: Option<String>,
    /// Lexicon sentiment in `[-1, 1]`, computed lazily by the analysis pass.
    pub vader_score: Option<f64>,
    pub llm_sentiment_score: Option<f64>,
    pub llm_sentiment_label: Option<String>,
    pub llm_analysis_payload: Option<serde_json::Value>,
    /// First writer wins: once set, never overwritten.
    pub related_sector: Option<String>,
    /// First writer wins: once set, never overwritten.
    pub related_stock: Option<String>,
}

impl ArticleRecord {
    /// Whether this record may be sent to sentiment or LLM scoring.
    pub fn has_body(&self) -> bool {
        self.body_text
            .as_deref()
            .is_some_and(|body| !body.trim().is_empty())
    }
}

/// A partial update applied by [`crate::storage::ArticleStore::update_scores`].
///
/// `None` fields are left untouched. The sector and stock tags follow the
/// first-writer-wins rule and only fill empty columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreUpdate {
    pub vader_score: Option<f64>,
    pub llm_sentiment_score: Option<f64>,
    pub llm_sentiment_label: Option<String>,
    pub llm_analysis_payload: Option<serde_json::Value>,
    pub related_sector: Option<String>,
    pub related_stock: Option<String>,
}

impl ScoreUpdate {
    pub fn vader(score: f64) -> Self {
        Self {
            vader_score: Some(score),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vader_score.is_none()
            && self.llm_sentiment_score.is_none()
            && self.llm_sentiment_label.is_none()
            && self.llm_analysis_payload.is_none()
            && self.related_sector.is_none()
            && self.related_stock.is_none()
    }
}

/// Whether a query or analysis target is a whole sector or one stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Sector,
    Stock,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetType::Sector => f.write_str("sector"),
            TargetType::Stock => f.write_str("stock"),
        }
    }
}

/// One harvest unit: a keyword restricted to a domain within a date window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub keyword: String,
    pub domain: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub target_type: TargetType,
    pub target_name: String,
    /// Sector the target belongs to; stored as `related_sector`.
    pub sector_context: Option<String>,
}

impl SearchQuery {
    /// Idempotency key `domain|keyword|MM/DD/YYYY|MM/DD/YYYY`.
    ///
    /// The dates are rendered in the search engine's filter format so keys
    /// written by earlier runs stay comparable.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.domain,
            self.keyword,
            crate::dates::search_filter_format(self.start_date),
            crate::dates::search_filter_format(self.end_date),
        )
    }

    /// Value for `related_stock` on records produced by this query.
    pub fn related_stock(&self) -> Option<&str> {
        match self.target_type {
            TargetType::Stock => Some(&self.target_name),
            TargetType::Sector => None,
        }
    }
}

/// Lifecycle of a search query within one run.
///
/// `Pending → Harvested → ProcessingUrls → Done`, or `Pending → Blocked`,
/// or `Pending → Error`. `Done`, `Blocked` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Pending,
    Harvested,
    ProcessingUrls,
    Done,
    Blocked,
    Error,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Done | QueryState::Blocked | QueryState::Error)
    }
}

/// Host of a URL, used as the record's `source_domain`.
///
/// For example: `"https://www.moneycontrol.com/news/a.html"` -> `"www.moneycontrol.com"`.
pub fn source_host(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.to_lowercase()))
}
