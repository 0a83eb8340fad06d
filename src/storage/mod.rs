//! Persistence collaborator.
//!
//! The pipeline depends only on [`ArticleStore`]. [`sqlite::SqliteStore`] is
//! the durable backend used by the binary; [`memory::MemoryStore`] backs
//! tests.

#[cfg(test)]
pub mod memory;
pub mod sqlite;

use chrono::NaiveDateTime;
use std::collections::HashSet;

use crate::error::StoreError;
use crate::models::{ArticleRecord, ScoreUpdate};

/// Selection for [`ArticleStore::find_by_keywords`].
///
/// Matches records published within `[start, end]` whose body is non-empty
/// and whose headline or body contains any keyword, case-insensitively.
/// An empty keyword list matches every record in the range; a non-empty
/// `domains` list further restricts `source_domain` by substring.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleQuery {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub keywords: Vec<String>,
    pub domains: Vec<String>,
    pub limit: usize,
}

/// Whether an upsert created a record or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Storage for [`ArticleRecord`]s keyed by URL.
///
/// Every write is its own transaction: a failure affects only the record
/// being written.
pub trait ArticleStore {
    /// Every stored URL. Used to seed the dedup set at run start.
    async fn all_urls(&self) -> Result<HashSet<String>, StoreError>;

    /// Insert a record, or merge it into the existing record for its URL.
    ///
    /// On merge the stored `publication_date`, `download_date` and scores are
    /// kept, content fields take the incoming value when it is present, and
    /// the sector/stock tags only fill empty slots.
    async fn upsert(&self, record: &ArticleRecord) -> Result<UpsertOutcome, StoreError>;

    /// Apply a partial score update. Returns `false` when no record has `url`
    /// or the update is empty.
    async fn update_scores(&self, url: &str, update: &ScoreUpdate) -> Result<bool, StoreError>;

    /// Records matching `query`, newest publication first.
    async fn find_by_keywords(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>, StoreError>;

    async fn get(&self, url: &str) -> Result<Option<ArticleRecord>, StoreError>;
}

/// Merge an incoming record into a stored one using the upsert rules.
#[cfg(test)]
pub(crate) fn merge_records(existing: &ArticleRecord, incoming: &ArticleRecord) -> ArticleRecord {
    fn prefer<T: Clone>(incoming: &Option<T>, existing: &Option<T>) -> Option<T> {
        incoming.clone().or_else(|| existing.clone())
    }
    fn prefer_list(incoming: &[String], existing: &[String]) -> Vec<String> {
        if incoming.is_empty() {
            existing.to_vec()
        } else {
            incoming.to_vec()
        }
    }

    ArticleRecord {
        url: existing.url.clone(),
        headline: prefer(&incoming.headline, &existing.headline),
        body_text: prefer(&incoming.body_text, &existing.body_text),
        publication_date: existing.publication_date,
        download_date: existing.download_date,
        source_domain: prefer(&incoming.source_domain, &existing.source_domain),
        language: prefer(&incoming.language, &existing.language),
        authors: prefer_list(&incoming.authors, &existing.authors),
        extracted_keywords: prefer_list(&incoming.extracted_keywords, &existing.extracted_keywords),
        generated_summary: prefer(&incoming.generated_summary, &existing.generated_summary),
        vader_score: existing.vader_score,
        llm_sentiment_score: existing.llm_sentiment_score,
        llm_sentiment_label: existing.llm_sentiment_label.clone(),
        llm_analysis_payload: existing.llm_analysis_payload.clone(),
        related_sector: prefer(&existing.related_sector, &incoming.related_sector),
        related_stock: prefer(&existing.related_stock, &incoming.related_stock),
    }
}

/// Apply a score update in place. Returns whether anything changed.
#[cfg(test)]
pub(crate) fn apply_scores(record: &mut ArticleRecord, update: &ScoreUpdate) -> bool {
    let mut changed = false;
    if let Some(score) = update.vader_score {
        record.vader_score = Some(score);
        changed = true;
    }
    if let Some(score) = update.llm_sentiment_score {
        record.llm_sentiment_score = Some(score);
        changed = true;
    }
    if let Some(label) = &update.llm_sentiment_label {
        record.llm_sentiment_label = Some(label.clone());
        changed = true;
    }
    if let Some(payload) = &update.llm_analysis_payload {
        record.llm_analysis_payload = Some(payload.clone());
        changed = true;
    }
    if record.related_sector.is_none() && update.related_sector.is_some() {
        record.related_sector = update.related_sector.clone();
        changed = true;
    }
    if record.related_stock.is_none() && update.related_stock.is_some() {
        record.related_stock = update.related_stock.clone();
        changed = true;
    }
    changed
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_merge_keeps_date_and_first_tags() {
        let existing = record("https://a.com/x", "Old", "old body", at(2025, 5, 2));
        let mut incoming = record("https://a.com/x", "New", "new body", at(2025, 5, 9));
        incoming.related_sector = Some("Nifty Bank".to_string());
        incoming.related_stock = Some("HDFC Bank".to_string());

        let merged = merge_records(&existing, &incoming);
        assert_eq!(merged.publication_date, at(2025, 5, 2));
        assert_eq!(merged.headline.as_deref(), Some("New"));
        assert_eq!(merged.related_sector.as_deref(), Some("Nifty IT"));
        assert_eq!(merged.related_stock.as_deref(), Some("HDFC Bank"));
    }

    #[test]
    fn test_apply_scores_respects_first_writer() {
        let mut rec = record("https://a.com/x", "H", "B", at(2025, 5, 2));
        let update = ScoreUpdate {
            vader_score: Some(0.4),
            related_sector: Some("Other".to_string()),
            related_stock: Some("Infosys".to_string()),
            ..ScoreUpdate::default()
        };
        assert!(apply_scores(&mut rec, &update));
        assert_eq!(rec.vader_score, Some(0.4));
        assert_eq!(rec.related_sector.as_deref(), Some("Nifty IT"));
        assert_eq!(rec.related_stock.as_deref(), Some("Infosys"));
        assert!(!apply_scores(&mut rec, &ScoreUpdate::default()));
    }
}
