//! Per-run set of URLs that need no further work.

use std::collections::HashSet;
use tracing::info;

use crate::error::StoreError;
use crate::storage::ArticleStore;

/// URLs already persisted or already judged unusable in this run.
///
/// Seeded once from the store's URL index at run start; lives only in
/// memory afterwards. It is a work-avoidance set, not a durability record:
/// unusable URLs are forgotten when the run ends.
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: HashSet<String>,
}

impl DedupStore {
    pub async fn load<S: ArticleStore>(store: &S) -> Result<Self, StoreError> {
        let seen = store.all_urls().await?;
        info!(count = seen.len(), "Loaded known article URLs");
        Ok(Self { seen })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Record `url` as handled. Returns `false` if it was already present.
    pub fn mark(&mut self, url: impl Into<String>) -> bool {
        self.seen.insert(url.into())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
