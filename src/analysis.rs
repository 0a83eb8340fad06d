//! The analyst pass: sentiment and LLM analysis over stored articles.
//!
//! For each target (a sector or a stock) the analyzer:
//! 1. Looks up stored articles matching the target's keywords in the window
//! 2. Scores every article with a body, writing the lexicon score back when
//!    it was missing
//! 3. Sends the newest `max_articles` bodies to the LLM and records the
//!    result on each article sent
//! 4. Attaches the daily closes for the target's ticker
//!
//! A failure inside one target ends up in that target's `error` field and
//! never stops the others.

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::api::{LlmAnalysis, LlmAnalyzer};
use crate::config::{Config, SectorConfig, StockConfig};
use crate::dates::DateWindow;
use crate::error::ConfigError;
use crate::events::{RunEvent, RunLog};
use crate::models::{ArticleRecord, ScoreUpdate, TargetType};
use crate::prices::{PricePoint, PriceSource};
use crate::sentiment::{average, SentimentLabel, SentimentScorer};
use crate::storage::{ArticleQuery, ArticleStore};

/// One sector or stock selected for analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTarget {
    pub target_type: TargetType,
    pub name: String,
    /// Matched case-insensitively against stored headlines and bodies.
    pub keywords: Vec<String>,
    pub ticker: Option<String>,
    /// Sector tag written to analyzed articles.
    pub sector: Option<String>,
    /// Stocks configured under a sector target.
    pub constituents: Vec<String>,
}

impl AnalysisTarget {
    /// The sector name plus its first `keyword_limit` general keywords.
    pub fn sector(sector: &SectorConfig, keyword_limit: usize) -> Self {
        let keywords = std::iter::once(sector.name.as_str())
            .chain(sector.keywords.iter().map(|k| k.trim()).take(keyword_limit))
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .unique_by(|k| k.to_lowercase())
            .collect();
        Self {
            target_type: TargetType::Sector,
            name: sector.name.clone(),
            keywords,
            ticker: sector.ticker.clone(),
            sector: Some(sector.name.clone()),
            constituents: sector.stocks.iter().map(|s| s.name.clone()).collect(),
        }
    }

    /// The stock's specific keywords, or its name when it has none.
    pub fn stock(stock: &StockConfig, sector: Option<&str>) -> Self {
        let keywords: Vec<String> = stock
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            target_type: TargetType::Stock,
            name: stock.name.clone(),
            keywords: if keywords.is_empty() {
                vec![stock.name.clone()]
            } else {
                keywords
            },
            ticker: stock.ticker.clone(),
            sector: sector.map(str::to_string),
            constituents: Vec::new(),
        }
    }
}

/// Resolve the CLI selection into targets: the sector first, then each
/// requested stock. Stocks missing from the configuration are analyzed by
/// name alone under the selected sector.
///
/// # Errors
///
/// [`ConfigError::UnknownSector`] when `sector` is not configured.
pub fn resolve_targets(
    config: &Config,
    sector: &str,
    stocks: &[String],
) -> Result<Vec<AnalysisTarget>, ConfigError> {
    let sector_config = config
        .sector(sector)
        .ok_or_else(|| ConfigError::UnknownSector(sector.to_string()))?;

    let mut targets = vec![AnalysisTarget::sector(
        sector_config,
        config.analysis.sector_keyword_limit,
    )];
    for name in stocks.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).unique() {
        let target = match config.stock(name) {
            Some((owner, stock)) => AnalysisTarget::stock(stock, Some(&owner.name)),
            None => {
                debug!(stock = name, "Stock not configured; analyzing by name");
                let ad_hoc = StockConfig {
                    name: name.to_string(),
                    ..StockConfig::default()
                };
                AnalysisTarget::stock(&ad_hoc, Some(&sector_config.name))
            }
        };
        targets.push(target);
    }
    Ok(targets)
}

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub max_articles: usize,
    pub custom_prompt: Option<String>,
    pub parallel_targets: usize,
}

impl AnalysisOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_articles: config.analysis.max_articles_for_llm,
            custom_prompt: None,
            parallel_targets: config.analysis.parallel_targets,
        }
    }
}

/// One analyzed article as shown in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleDigest {
    pub url: String,
    pub headline: Option<String>,
    pub publication_date: NaiveDateTime,
    pub source_domain: Option<String>,
    pub vader_score: f64,
    pub sent_to_llm: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target_type: TargetType,
    pub target_name: String,
    pub date_range: String,
    pub articles_processed: usize,
    pub avg_vader_score: Option<f64>,
    pub sentiment_label: Option<SentimentLabel>,
    pub num_articles_for_llm: usize,
    pub llm_analysis: Option<LlmAnalysis>,
    pub ticker: Option<String>,
    pub prices: Vec<PricePoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constituent_stocks: Vec<String>,
    pub articles: Vec<ArticleDigest>,
    pub error: Option<String>,
    pub price_error: Option<String>,
}

impl TargetReport {
    fn new(target: &AnalysisTarget, window: &DateWindow) -> Self {
        Self {
            target_type: target.target_type,
            target_name: target.name.clone(),
            date_range: window.to_string(),
            articles_processed: 0,
            avg_vader_score: None,
            sentiment_label: None,
            num_articles_for_llm: 0,
            llm_analysis: None,
            ticker: target.ticker.clone(),
            prices: Vec::new(),
            constituent_stocks: target.constituents.clone(),
            articles: Vec::new(),
            error: None,
            price_error: None,
        }
    }
}

/// Everything one `analyze` run produced.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub window: DateWindow,
    pub targets: Vec<TargetReport>,
    pub events: Vec<RunEvent>,
}

pub struct TargetAnalyzer<'a, S, C, L, P> {
    store: &'a S,
    scorer: C,
    llm: L,
    prices: P,
    options: AnalysisOptions,
}

impl<'a, S, C, L, P> TargetAnalyzer<'a, S, C, L, P>
where
    S: ArticleStore,
    C: SentimentScorer,
    L: LlmAnalyzer,
    P: PriceSource,
{
    pub fn new(store: &'a S, scorer: C, llm: L, prices: P, options: AnalysisOptions) -> Self {
        Self {
            store,
            scorer,
            llm,
            prices,
            options,
        }
    }

    /// Analyze every target, `parallel_targets` at a time, keeping the
    /// input order in the report.
    #[instrument(level = "info", skip_all, fields(targets = targets.len(), window = %window))]
    pub async fn analyze_all(&self, targets: &[AnalysisTarget], window: &DateWindow) -> AnalysisReport {
        let mut log = RunLog::new();
        log.info(
            "run.started",
            format!("Analysis of {} target(s) over {window}", targets.len()),
        );
        for target in targets {
            log.info("target.started", format!("Analyzing {} {}", target.target_type, target.name));
        }

        let reports: Vec<TargetReport> = stream::iter(targets)
            .map(|target| self.analyze_target(target, window))
            .buffered(self.options.parallel_targets.max(1))
            .collect()
            .await;

        for report in &reports {
            match &report.error {
                Some(error) => log.warn(
                    "target.failed",
                    format!("{} {}: {error}", report.target_type, report.target_name),
                ),
                None => log.info(
                    "target.completed",
                    format!(
                        "{} {}: {} article(s), {} sent to LLM, overall {}",
                        report.target_type,
                        report.target_name,
                        report.articles_processed,
                        report.num_articles_for_llm,
                        report
                            .sentiment_label
                            .map(|l| l.to_string())
                            .unwrap_or_else(|| "n/a".to_string()),
                    ),
                ),
            }
        }
        let failed = reports.iter().filter(|r| r.error.is_some()).count();
        log.info(
            "run.completed",
            format!("{} target(s) analyzed, {failed} with errors", reports.len()),
        );

        AnalysisReport {
            generated_at: Utc::now(),
            window: *window,
            targets: reports,
            events: log.into_events(),
        }
    }

    /// Analyze one target. Never fails; problems are reported in the
    /// returned report's `error` and `price_error`.
    #[instrument(level = "info", skip_all, fields(target = %target.name))]
    pub async fn analyze_target(&self, target: &AnalysisTarget, window: &DateWindow) -> TargetReport {
        let mut report = TargetReport::new(target, window);

        match self.score_articles(target, window).await {
            Err(message) => report.error = Some(message),
            Ok(scored) if scored.is_empty() => {
                report.error = Some(format!(
                    "No relevant articles with text found for {} in {window}",
                    target.name
                ));
            }
            Ok(scored) => {
                let scores: Vec<f64> = scored.iter().map(|(_, score)| *score).collect();
                report.articles_processed = scored.len();
                report.avg_vader_score = average(&scores);
                report.sentiment_label = report.avg_vader_score.map(SentimentLabel::from_score);

                let sent = &scored[..scored.len().min(self.options.max_articles)];
                report.num_articles_for_llm = sent.len();
                let texts: Vec<String> = sent
                    .iter()
                    .filter_map(|(article, _)| article.body_text.clone())
                    .collect();

                match self
                    .llm
                    .analyze(
                        &texts,
                        &target.name,
                        &window.to_string(),
                        self.options.custom_prompt.as_deref(),
                    )
                    .await
                {
                    Ok(analysis) => {
                        self.record_llm_result(target, sent, &analysis).await;
                        report.llm_analysis = Some(analysis);
                    }
                    Err(e) => {
                        warn!(error = %e, "LLM analysis failed");
                        report.error = Some(format!("LLM analysis failed: {e}"));
                    }
                }

                report.articles = scored
                    .iter()
                    .enumerate()
                    .map(|(i, (article, score))| ArticleDigest {
                        url: article.url.clone(),
                        headline: article.headline.clone(),
                        publication_date: article.publication_date,
                        source_domain: article.source_domain.clone(),
                        vader_score: *score,
                        sent_to_llm: i < sent.len(),
                    })
                    .collect();
            }
        }

        if let Some(ticker) = &target.ticker {
            match self.prices.daily_close(ticker, window.start(), window.end()).await {
                Ok(points) => report.prices = points,
                Err(e) => {
                    warn!(ticker, error = %e, "Price lookup failed");
                    report.price_error = Some(e.to_string());
                }
            }
        }
        report
    }

    /// Stored articles with a body, newest first, each with its lexicon
    /// score. Missing scores are computed and written back.
    async fn score_articles(
        &self,
        target: &AnalysisTarget,
        window: &DateWindow,
    ) -> Result<Vec<(ArticleRecord, f64)>, String> {
        let query = ArticleQuery {
            start: window.start_datetime(),
            end: window.end_datetime(),
            keywords: target.keywords.clone(),
            domains: Vec::new(),
            limit: self.options.max_articles.saturating_mul(3),
        };
        let articles = self
            .store
            .find_by_keywords(&query)
            .await
            .map_err(|e| format!("Article lookup failed: {e}"))?;
        debug!(found = articles.len(), "Candidate articles");

        let mut scored = Vec::with_capacity(articles.len());
        for article in articles.into_iter().filter(ArticleRecord::has_body) {
            let score = match article.vader_score {
                Some(score) => score,
                None => {
                    let score = self.scorer.score(article.body_text.as_deref().unwrap_or_default());
                    if let Err(e) = self
                        .store
                        .update_scores(&article.url, &ScoreUpdate::vader(score))
                        .await
                    {
                        warn!(url = %article.url, error = %e, "Failed to store sentiment score");
                    }
                    score
                }
            };
            scored.push((article, score));
        }
        Ok(scored)
    }

    async fn record_llm_result(
        &self,
        target: &AnalysisTarget,
        sent: &[(ArticleRecord, f64)],
        analysis: &LlmAnalysis,
    ) {
        // Sector targets only tag the articles they sent.
        let update = match target.target_type {
            TargetType::Stock => ScoreUpdate {
                vader_score: None,
                llm_sentiment_score: Some(analysis.sentiment_score_llm),
                llm_sentiment_label: Some(analysis.overall_sentiment.clone()),
                llm_analysis_payload: serde_json::to_value(analysis).ok(),
                related_sector: target.sector.clone(),
                related_stock: Some(target.name.clone()),
            },
            TargetType::Sector => ScoreUpdate {
                related_sector: target.sector.clone(),
                ..ScoreUpdate::default()
            },
        };
        let mut written = 0usize;
        for (article, _) in sent {
            match self.store.update_scores(&article.url, &update).await {
                Ok(true) => written += 1,
                Ok(false) => debug!(url = %article.url, "Article vanished before LLM update"),
                Err(e) => warn!(url = %article.url, error = %e, "Failed to store LLM result"),
            }
        }
        info!(written, "Recorded LLM result on analyzed articles");
    }
}
