//! Scrape runs: query generation, harvesting, dedup filtering, extraction,
//! validation and persistence.
//!
//! Failures are contained at the smallest unit that can absorb them. A bad
//! URL is marked seen and skipped, a failed or blocked query is recorded
//! and the run moves on, and only setup failures (store, query log) end a
//! run early.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, ModeConfig, ScrapeMode};
use crate::dates::DateWindow;
use crate::dedup::DedupStore;
use crate::error::{ExtractError, RunError};
use crate::events::{RunEvent, RunLog};
use crate::extract::{ArticleExtractor, ExtractedArticle};
use crate::harvest::browser::SessionLauncher;
use crate::harvest::{HarvestOutcome, HarvestRequest, HarvestSettings, SearchResultHarvester};
use crate::models::{ArticleRecord, QueryState, SearchQuery};
use crate::queries::{self, KeywordQuery};
use crate::query_log::ProcessedQueryLog;
use crate::storage::{ArticleStore, UpsertOutcome};
use crate::utils::pause;

/// What happened to one candidate URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlVerdict {
    Saved,
    AlreadySeen,
    OutOfWindow,
    Rejected,
    FetchFailed,
    StoreFailed,
}

/// Totals for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub searches_performed: usize,
    pub queries_skipped: usize,
    pub queries_blocked: usize,
    pub queries_failed: usize,
    pub articles_saved: usize,
    pub urls_already_seen: usize,
    pub urls_out_of_window: usize,
    pub urls_rejected: usize,
    pub urls_failed: usize,
    pub store_size: usize,
}

impl RunSummary {
    fn count(&mut self, verdict: UrlVerdict) {
        match verdict {
            UrlVerdict::Saved => self.articles_saved += 1,
            UrlVerdict::AlreadySeen => self.urls_already_seen += 1,
            UrlVerdict::OutOfWindow => self.urls_out_of_window += 1,
            UrlVerdict::Rejected => self.urls_rejected += 1,
            UrlVerdict::FetchFailed | UrlVerdict::StoreFailed => self.urls_failed += 1,
        }
    }
}

/// Owns the per-run state: dedup set, processed-query log, event log and
/// totals.
pub struct ScrapeOrchestrator<'a, S, L, E> {
    config: &'a Config,
    store: &'a S,
    mode: ScrapeMode,
    pacing: ModeConfig,
    harvester: SearchResultHarvester<L>,
    extractor: E,
    dedup: DedupStore,
    query_log: Option<ProcessedQueryLog>,
    log: RunLog,
    summary: RunSummary,
}

impl<'a, S, L, E> ScrapeOrchestrator<'a, S, L, E>
where
    S: ArticleStore,
    L: SessionLauncher,
    E: ArticleExtractor,
{
    /// Load the dedup set from the store and, in batch mode, the
    /// processed-query log.
    ///
    /// # Errors
    ///
    /// [`RunError::Store`] when the URL index cannot be read and
    /// [`RunError::QueryLog`] when the query log cannot be opened.
    #[instrument(level = "info", skip_all, fields(?mode))]
    pub async fn prepare(
        config: &'a Config,
        mode: ScrapeMode,
        store: &'a S,
        launcher: L,
        extractor: E,
    ) -> Result<Self, RunError> {
        let dedup = DedupStore::load(store).await?;
        let query_log = match mode {
            ScrapeMode::Batch => {
                Some(ProcessedQueryLog::load(&config.storage.processed_queries_path).await?)
            }
            ScrapeMode::OnDemand => None,
        };

        Ok(Self {
            config,
            store,
            mode,
            pacing: config.mode(mode).clone(),
            harvester: SearchResultHarvester::new(launcher, HarvestSettings::from_config(config, mode)),
            extractor,
            dedup,
            query_log,
            log: RunLog::new(),
            summary: RunSummary::default(),
        })
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn events(&self) -> &[RunEvent] {
        self.log.events()
    }

    /// Sweep every configured sector and stock across the configured
    /// domains.
    #[instrument(level = "info", skip(self), fields(%window))]
    pub async fn run_batch(&mut self, window: &DateWindow) -> Result<RunSummary, RunError> {
        let keyword_queries = queries::batch_queries(self.config, window.target_year());
        let domains = self.domains(&[]);
        self.run(keyword_queries, &domains, window).await
    }

    /// Scrape a single target over a short list of domains. Explicit
    /// `domains` win over the configured ones.
    #[instrument(level = "info", skip(self, domains), fields(%window))]
    pub async fn run_on_demand(
        &mut self,
        target: &str,
        sector_hint: Option<&str>,
        domains: &[String],
        window: &DateWindow,
    ) -> Result<RunSummary, RunError> {
        let keyword_queries =
            queries::target_queries(self.config, target, sector_hint, window.target_year());
        let domains = self.domains(domains);
        self.run(keyword_queries, &domains, window).await
    }

    fn domains(&self, explicit: &[String]) -> Vec<String> {
        if !explicit.is_empty() {
            return explicit.to_vec();
        }
        let limit = self.pacing.domain_limit.unwrap_or(usize::MAX);
        self.config.domains.iter().take(limit).cloned().collect()
    }

    async fn run(
        &mut self,
        keyword_queries: Vec<KeywordQuery>,
        domains: &[String],
        window: &DateWindow,
    ) -> Result<RunSummary, RunError> {
        self.log.info(
            "run.started",
            format!(
                "{:?} run: {} keyword queries x {} domains, {window}",
                self.mode,
                keyword_queries.len(),
                domains.len()
            ),
        );

        let total = keyword_queries.len();
        for (index, keyword_query) in keyword_queries.iter().enumerate() {
            info!(
                query = index + 1,
                total,
                keyword = %keyword_query.keyword,
                target = %keyword_query.target_name,
                "Processing keyword query"
            );
            for domain in domains {
                let query = SearchQuery {
                    keyword: keyword_query.keyword.clone(),
                    domain: domain.clone(),
                    start_date: window.start(),
                    end_date: window.end(),
                    target_type: keyword_query.target_type,
                    target_name: keyword_query.target_name.clone(),
                    sector_context: keyword_query.sector_context.clone(),
                };
                let state = self.process_query(&query, window).await;
                debug!(key = %query.key(), ?state, "Query finished");
            }
        }

        self.summary.store_size = match self.store.all_urls().await {
            Ok(urls) => urls.len(),
            Err(e) => {
                warn!(error = %e, "Could not count stored articles");
                self.dedup.len()
            }
        };
        self.log.info(
            "run.completed",
            format!(
                "{} searches, {} articles saved, {} blocked, {} failed queries",
                self.summary.searches_performed,
                self.summary.articles_saved,
                self.summary.queries_blocked,
                self.summary.queries_failed
            ),
        );
        Ok(self.summary.clone())
    }

    /// Run one query through harvesting and URL processing.
    ///
    /// URLs collected before a block are still processed. Blocked and failed
    /// queries are recorded in the query log like completed ones.
    async fn process_query(&mut self, query: &SearchQuery, window: &DateWindow) -> QueryState {
        let key = query.key();
        if self.query_log.as_ref().is_some_and(|log| log.contains(&key)) {
            self.summary.queries_skipped += 1;
            debug!(%key, "Query already processed; skipping");
            return QueryState::Done;
        }

        let request = HarvestRequest {
            keyword: &query.keyword,
            domain: &query.domain,
            date_filter: Some(window.search_filter()),
        };
        let harvest = self.harvester.harvest(&request).await;
        self.summary.searches_performed += 1;

        let (urls, mut state) = match harvest {
            Ok(report) => {
                if let HarvestOutcome::Blocked { page, marker, .. } = &report.outcome {
                    self.summary.queries_blocked += 1;
                    self.log.warn(
                        "query.blocked",
                        format!(
                            "Search blocked ({marker}) on page {} for '{}' on {}",
                            page + 1,
                            query.keyword,
                            query.domain
                        ),
                    );
                    (report.urls, QueryState::Blocked)
                } else {
                    info!(
                        found = report.urls.len(),
                        pages = report.pages_fetched,
                        "Harvested candidate URLs"
                    );
                    (report.urls, QueryState::Harvested)
                }
            }
            Err(e) => {
                self.summary.queries_failed += 1;
                self.log.error(
                    "query.failed",
                    format!("Search for '{}' on {} failed: {e}", query.keyword, query.domain),
                );
                (Vec::new(), QueryState::Error)
            }
        };

        if let Some(log) = self.query_log.as_mut() {
            if let Err(e) = log.record(&key).await {
                warn!(%key, error = %e, "Failed to record processed query");
            }
        }

        if state == QueryState::Harvested {
            state = QueryState::ProcessingUrls;
        }
        for url in &urls {
            let verdict = self.process_url(url, query, window).await;
            self.summary.count(verdict);
            if verdict != UrlVerdict::AlreadySeen {
                pause(&self.pacing.article_delay).await;
            }
        }
        if state == QueryState::ProcessingUrls {
            state = QueryState::Done;
        }

        pause(&self.pacing.search_delay).await;
        state
    }

    /// Extract, validate and persist one candidate. Every outcome other than
    /// `AlreadySeen` marks the URL seen.
    #[instrument(level = "debug", skip(self, query, window))]
    async fn process_url(&mut self, url: &str, query: &SearchQuery, window: &DateWindow) -> UrlVerdict {
        if self.dedup.contains(url) {
            return UrlVerdict::AlreadySeen;
        }

        let verdict = match self.extractor.extract(url).await {
            Ok(article) if !window.contains(article.publish_date) => {
                debug!(published = %article.publish_date, "Article outside the date window");
                UrlVerdict::OutOfWindow
            }
            Ok(article) => {
                let record = build_record(article, query);
                match self.store.upsert(&record).await {
                    Ok(outcome) => {
                        let action = match outcome {
                            UpsertOutcome::Inserted => "Saved",
                            UpsertOutcome::Updated => "Updated",
                        };
                        self.log.info(
                            "article.saved",
                            format!(
                                "{action}: {}",
                                record.headline.as_deref().unwrap_or(&record.url)
                            ),
                        );
                        UrlVerdict::Saved
                    }
                    Err(e) => {
                        self.log.error("article.failed", format!("Could not store {url}: {e}"));
                        UrlVerdict::StoreFailed
                    }
                }
            }
            Err(ExtractError::Rejected { reason, .. }) => {
                debug!(%reason, "Article rejected");
                UrlVerdict::Rejected
            }
            Err(e) => {
                warn!(error = %e, "Article fetch failed");
                UrlVerdict::FetchFailed
            }
        };

        self.dedup.mark(url);
        verdict
    }
}

fn build_record(article: ExtractedArticle, query: &SearchQuery) -> ArticleRecord {
    ArticleRecord {
        url: article.url,
        headline: Some(article.headline),
        body_text: Some(article.body_text),
        publication_date: article.publish_date,
        download_date: Utc::now().naive_utc(),
        source_domain: article.source_domain,
        language: article.language,
        authors: article.authors,
        extracted_keywords: article.keywords,
        generated_summary: article.summary,
        vader_score: None,
        llm_sentiment_score: None,
        llm_sentiment_label: None,
        llm_analysis_payload: None,
        related_sector: query.sector_context.clone(),
        related_stock: query.related_stock().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelayBounds, SectorConfig, StockConfig};
    use crate::error::RejectReason;
    use crate::harvest::fake::{FakeLauncher, FakePage, results_page};
    use crate::storage::memory::MemoryStore;
    use crate::storage::test_support::{at, record};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    const A1: &str = "https://www.moneycontrol.com/news/business/it-services-demand-recovers-1.html";
    const A2: &str = "https://www.moneycontrol.com/news/business/tech-spending-outlook-2.html";
    const A3: &str = "https://www.moneycontrol.com/news/business/infosys-wins-mega-deal-3.html";

    enum Script {
        Article(NaiveDateTime),
        Reject(RejectReason),
        Status(u16),
    }

    #[derive(Default)]
    struct FakeExtractor {
        scripts: HashMap<String, Script>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeExtractor {
        fn with(mut self, url: &str, script: Script) -> Self {
            self.scripts.insert(url.to_string(), script);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ArticleExtractor for &FakeExtractor {
        async fn extract(&self, url: &str) -> Result<ExtractedArticle, ExtractError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.scripts.get(url) {
                Some(Script::Article(published)) => Ok(ExtractedArticle {
                    url: url.to_string(),
                    headline: format!("Headline for {url}"),
                    body_text: "IT services demand is recovering across large deals.".to_string(),
                    publish_date: *published,
                    authors: vec!["Staff".to_string()],
                    language: Some("en".to_string()),
                    source_domain: crate::models::source_host(url),
                    keywords: vec!["it".to_string()],
                    summary: None,
                }),
                Some(Script::Reject(reason)) => Err(ExtractError::Rejected {
                    url: url.to_string(),
                    reason: reason.clone(),
                }),
                Some(Script::Status(status)) => Err(ExtractError::HttpStatus {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(ExtractError::InvalidUrl(url.to_string())),
            }
        }
    }

    fn quiet() -> ModeConfig {
        ModeConfig {
            pages: 1,
            search_delay: DelayBounds::zero(),
            article_delay: DelayBounds::zero(),
            page_delay: DelayBounds::zero(),
            domain_limit: None,
        }
    }

    fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.domains = vec!["moneycontrol.com".to_string()];
        config.batch = quiet();
        config.on_demand = ModeConfig {
            domain_limit: Some(1),
            ..quiet()
        };
        config.search.snapshot_dir = dir.join("snapshots");
        config.storage.processed_queries_path = dir.join("processed_queries.log");
        config.sectors = vec![SectorConfig {
            name: "Nifty IT".to_string(),
            keywords: vec!["IT services".to_string()],
            ticker: None,
            stocks: vec![StockConfig {
                name: "Infosys".to_string(),
                keywords: vec![],
                ticker: None,
            }],
        }];
        config
    }

    fn may_window() -> DateWindow {
        let d = |day| NaiveDate::from_ymd_opt(2025, 5, day).unwrap();
        DateWindow::new(d(1), d(7), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()).unwrap()
    }

    fn launcher() -> FakeLauncher {
        FakeLauncher::new()
            .serve("IT services", vec![results_page(&[A1, A2])])
            .serve("'Infosys'", vec![results_page(&[A2, A3])])
    }

    fn extractor() -> FakeExtractor {
        FakeExtractor::default()
            .with(A1, Script::Article(at(2025, 5, 2)))
            .with(A2, Script::Article(at(2025, 5, 3)))
            .with(A3, Script::Article(at(2025, 5, 4)))
    }

    #[tokio::test]
    async fn test_batch_run_saves_tags_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::new();
        let extractor = extractor();
        let launcher = launcher();
        let tracker = launcher.tracker.clone();

        let mut orchestrator =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::Batch, &store, launcher, &extractor)
                .await
                .unwrap();
        let summary = orchestrator.run_batch(&may_window()).await.unwrap();

        // "IT services 2025", "Nifty IT news 2025", "'Infosys' news 2025"
        assert_eq!(summary.searches_performed, 3);
        assert_eq!(summary.articles_saved, 3);
        assert_eq!(summary.urls_already_seen, 1);
        assert_eq!(summary.store_size, 3);
        assert_eq!(extractor.calls(), vec![A1, A2, A3]);
        assert_eq!(tracker.drops(), tracker.launches());

        let sector_article = store.get(A1).await.unwrap().unwrap();
        assert_eq!(sector_article.related_sector.as_deref(), Some("Nifty IT"));
        assert_eq!(sector_article.related_stock, None);
        let stock_article = store.get(A3).await.unwrap().unwrap();
        assert_eq!(stock_article.related_stock.as_deref(), Some("Infosys"));
        assert_eq!(stock_article.related_sector.as_deref(), Some("Nifty IT"));

        let logged = std::fs::read_to_string(&config.storage.processed_queries_path).unwrap();
        assert_eq!(logged.lines().count(), 3);
        assert!(logged.contains("moneycontrol.com|'Infosys' news 2025|05/01/2025|05/07/2025"));
    }

    #[tokio::test]
    async fn test_second_batch_run_performs_no_harvesting() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::new();
        let extractor = extractor();

        let mut first =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::Batch, &store, launcher(), &extractor)
                .await
                .unwrap();
        first.run_batch(&may_window()).await.unwrap();

        let launcher = launcher();
        let tracker = launcher.tracker.clone();
        let mut second =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::Batch, &store, launcher, &extractor)
                .await
                .unwrap();
        let summary = second.run_batch(&may_window()).await.unwrap();
        assert_eq!(summary.searches_performed, 0);
        assert_eq!(summary.queries_skipped, 3);
        assert_eq!(tracker.launches(), 0);
    }

    #[tokio::test]
    async fn test_stored_urls_are_not_extracted_again() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::new();
        store
            .upsert(&record(A1, "Known", "Already stored body text.", at(2025, 5, 2)))
            .await
            .unwrap();
        let extractor = extractor();

        let mut orchestrator =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::Batch, &store, launcher(), &extractor)
                .await
                .unwrap();
        let summary = orchestrator.run_batch(&may_window()).await.unwrap();
        assert!(!extractor.calls().contains(&A1.to_string()));
        assert_eq!(summary.articles_saved, 2);
        assert_eq!(summary.urls_already_seen, 2);
    }

    #[tokio::test]
    async fn test_unusable_urls_are_marked_and_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::new();
        let extractor = FakeExtractor::default()
            .with(A1, Script::Reject(RejectReason::MissingBody))
            .with(A2, Script::Article(at(2025, 4, 20)))
            .with(A3, Script::Status(503));

        let mut orchestrator =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::Batch, &store, launcher(), &extractor)
                .await
                .unwrap();
        let summary = orchestrator.run_batch(&may_window()).await.unwrap();

        assert_eq!(store.upsert_calls(), 0);
        assert_eq!(summary.urls_rejected, 1);
        assert_eq!(summary.urls_out_of_window, 1);
        assert_eq!(summary.urls_failed, 1);
        // A2 shows up again in the stock query but is not fetched twice.
        assert_eq!(summary.urls_already_seen, 1);
        assert_eq!(extractor.calls(), vec![A1, A2, A3]);
    }

    #[tokio::test]
    async fn test_store_failure_is_contained_to_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::failing_on(&[A1]);
        let extractor = extractor();

        let mut orchestrator =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::Batch, &store, launcher(), &extractor)
                .await
                .unwrap();
        let summary = orchestrator.run_batch(&may_window()).await.unwrap();
        assert_eq!(summary.urls_failed, 1);
        assert_eq!(summary.articles_saved, 2);
        assert!(store.get(A1).await.unwrap().is_none());
        assert!(
            orchestrator
                .events()
                .iter()
                .any(|e| e.kind == "article.failed")
        );
    }

    #[tokio::test]
    async fn test_blocked_and_failed_queries_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::new();
        let extractor = extractor();
        let mut blocked = FakePage::html("<html><body>unusual traffic from your computer</body></html>");
        blocked.title = "Sorry".to_string();
        let launcher = FakeLauncher::new()
            .serve("IT services", vec![blocked])
            .failing_navigation("Infosys");

        let mut orchestrator =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::Batch, &store, launcher, &extractor)
                .await
                .unwrap();
        let summary = orchestrator.run_batch(&may_window()).await.unwrap();
        assert_eq!(summary.queries_blocked, 1);
        assert_eq!(summary.queries_failed, 1);
        assert_eq!(summary.articles_saved, 0);

        let logged = std::fs::read_to_string(&config.storage.processed_queries_path).unwrap();
        assert_eq!(logged.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_on_demand_without_matches_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::new();
        let extractor = extractor();
        let launcher = FakeLauncher::new();
        let tracker = launcher.tracker.clone();

        let mut orchestrator =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::OnDemand, &store, launcher, &extractor)
                .await
                .unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let window = DateWindow::new(day, day, day).unwrap();
        let summary = orchestrator
            .run_on_demand("Infosys", None, &[], &window)
            .await
            .unwrap();

        assert_eq!(summary.searches_performed, 1);
        assert_eq!(summary.articles_saved, 0);
        assert_eq!(store.len().await, 0);
        assert_eq!(tracker.drops(), 1);
        assert!(!config.storage.processed_queries_path.exists());
    }

    #[tokio::test]
    async fn test_on_demand_explicit_domains_and_ad_hoc_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = MemoryStore::new();
        let url = "https://www.livemint.com/companies/tata-motors-ev-sales-surge.html";
        let extractor = FakeExtractor::default().with(url, Script::Article(at(2025, 5, 5)));
        let launcher = FakeLauncher::new().serve("Tata Motors", vec![results_page(&[url])]);
        let tracker = launcher.tracker.clone();

        let mut orchestrator =
            ScrapeOrchestrator::prepare(&config, ScrapeMode::OnDemand, &store, launcher, &extractor)
                .await
                .unwrap();
        let domains = vec!["livemint.com".to_string(), "moneycontrol.com".to_string()];
        let summary = orchestrator
            .run_on_demand("Tata Motors", Some("Nifty Auto"), &domains, &may_window())
            .await
            .unwrap();

        assert_eq!(summary.searches_performed, 2);
        assert_eq!(summary.articles_saved, 1);
        assert_eq!(tracker.navigations().len(), 2);
        let saved = store.get(url).await.unwrap().unwrap();
        assert_eq!(saved.related_stock.as_deref(), Some("Tata Motors"));
        assert_eq!(saved.related_sector.as_deref(), Some("Nifty Auto"));
    }
}
