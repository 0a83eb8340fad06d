//! In-process [`ArticleStore`] with the same semantics as the SQLite backend.
//! Compiled for tests only.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{apply_scores, merge_records, ArticleQuery, ArticleStore, UpsertOutcome};
use crate::error::StoreError;
use crate::models::{ArticleRecord, ScoreUpdate};

#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: RwLock<HashMap<String, ArticleRecord>>,
    upserts: AtomicUsize,
    failing: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upsert calls received, successful or not.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.articles.read().await.len()
    }

    /// A store whose upserts fail for the given URLs.
    pub fn failing_on(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }

    fn check_failure(&self, url: &str) -> Result<(), StoreError> {
        if self.failing.contains(url) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

fn matches(record: &ArticleRecord, query: &ArticleQuery) -> bool {
    if !record.has_body() {
        return false;
    }
    if record.publication_date < query.start || record.publication_date > query.end {
        return false;
    }
    if !query.domains.is_empty() {
        let domain = record.source_domain.as_deref().unwrap_or_default().to_lowercase();
        if !query.domains.iter().any(|d| domain.contains(&d.to_lowercase())) {
            return false;
        }
    }
    if query.keywords.is_empty() {
        return true;
    }
    let headline = record.headline.as_deref().unwrap_or_default().to_lowercase();
    let body = record.body_text.as_deref().unwrap_or_default().to_lowercase();
    query.keywords.iter().any(|kw| {
        let kw = kw.to_lowercase();
        headline.contains(&kw) || body.contains(&kw)
    })
}

impl ArticleStore for MemoryStore {
    async fn all_urls(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.articles.read().await.keys().cloned().collect())
    }

    async fn upsert(&self, record: &ArticleRecord) -> Result<UpsertOutcome, StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.check_failure(&record.url)?;

        let mut articles = self.articles.write().await;
        match articles.get(&record.url) {
            Some(existing) => {
                let merged = merge_records(existing, record);
                articles.insert(record.url.clone(), merged);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                articles.insert(record.url.clone(), record.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn update_scores(&self, url: &str, update: &ScoreUpdate) -> Result<bool, StoreError> {
        let mut articles = self.articles.write().await;
        Ok(articles
            .get_mut(url)
            .is_some_and(|record| apply_scores(record, update)))
    }

    async fn find_by_keywords(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>, StoreError> {
        let articles = self.articles.read().await;
        let mut found: Vec<ArticleRecord> = articles
            .values()
            .filter(|r| matches(r, query))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.publication_date
                .cmp(&a.publication_date)
                .then_with(|| a.url.cmp(&b.url))
        });
        found.truncate(query.limit);
        Ok(found)
    }

    async fn get(&self, url: &str) -> Result<Option<ArticleRecord>, StoreError> {
        Ok(self.articles.read().await.get(url).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_upsert_then_get() {
        let store = MemoryStore::new();
        let rec = record("https://a.com/infosys-results", "Infosys beats", "Body", at(2025, 5, 3));
        assert_eq!(store.upsert(&rec).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&rec).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.upsert_calls(), 2);
        assert_eq!(store.get(&rec.url).await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_find_by_keywords_filters_and_orders() {
        let store = MemoryStore::new();
        store
            .upsert(&record("https://a.com/1", "Infosys beats", "Strong quarter", at(2025, 5, 3)))
            .await
            .unwrap();
        store
            .upsert(&record("https://a.com/2", "Markets", "INFOSYS shares rose", at(2025, 5, 9)))
            .await
            .unwrap();
        store
            .upsert(&record("https://a.com/3", "Infosys", "", at(2025, 5, 10)))
            .await
            .unwrap();
        store
            .upsert(&record("https://a.com/4", "Infosys", "old news", at(2025, 4, 1)))
            .await
            .unwrap();
        store
            .upsert(&record("https://a.com/5", "Banks", "HDFC", at(2025, 5, 4)))
            .await
            .unwrap();

        let found = store.find_by_keywords(&query(&["infosys"])).await.unwrap();
        let urls: Vec<&str> = found.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/2", "https://a.com/1"]);
    }

    #[tokio::test]
    async fn test_update_scores_missing_url() {
        let store = MemoryStore::new();
        assert!(!store
            .update_scores("https://nowhere", &ScoreUpdate::vader(0.1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failing_store_counts_attempts() {
        let store = MemoryStore::failing_on(&["https://a.com/bad"]);
        let rec = record("https://a.com/bad", "H", "B", at(2025, 5, 3));
        assert!(store.upsert(&rec).await.is_err());
        assert_eq!(store.upsert_calls(), 1);
        assert_eq!(store.len().await, 0);
    }
}
