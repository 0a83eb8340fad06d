//! # Sector News
//!
//! A financial news pipeline that finds articles about Indian market sectors
//! and stocks through a search engine, extracts them from heterogeneous news
//! sites, stores them once per URL, and scores them with lexicon and LLM
//! sentiment for an analyst.
//!
//! ## Features
//!
//! - Harvests candidate article URLs with a headless Chrome session, handling
//!   pagination, consent pages and bot-detection blocks
//! - Extracts headline, body, publish date and authors with three competing
//!   strategies merged field by field
//! - Deduplicates by URL against a SQLite store and remembers processed
//!   queries between batch runs
//! - Scores stored articles with a lexicon model and an OpenAI-compatible
//!   LLM, and attaches daily closing prices
//!
//! ## Usage
//!
//! ```sh
//! sector_news batch --start 2025-05-01 --end 2025-05-07
//! sector_news scrape --target Infosys --lookback 3
//! sector_news analyze --sector "Nifty IT" --stock Infosys -o ./reports
//! ```
//!
//! ## Architecture
//!
//! 1. **Query generation**: Keywords per sector and stock, paired with domains
//! 2. **Harvesting**: Search result pages to candidate URLs
//! 3. **Extraction**: Candidate URLs to validated articles
//! 4. **Persistence**: One upsert per article, dedup set updated
//! 5. **Analysis**: Stored articles to a per-target JSON report

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod analysis;
mod api;
mod cli;
mod config;
mod dates;
mod dedup;
mod error;
mod events;
mod extract;
mod harvest;
mod models;
mod orchestrator;
mod outputs;
mod prices;
mod queries;
mod query_log;
mod sentiment;
mod storage;
mod text;
mod utils;

use analysis::{resolve_targets, AnalysisOptions, TargetAnalyzer};
use api::LlmSentimentAnalyzer;
use cli::{Cli, Command};
use config::{Config, ScrapeMode};
use dates::{parse_cli_date, today_utc, DateWindow};
use extract::ContentExtractor;
use harvest::browser::ChromeLauncher;
use orchestrator::{RunSummary, ScrapeOrchestrator};
use prices::YahooChartSource;
use sentiment::LexiconScorer;
use storage::sqlite::SqliteStore;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("sector_news starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.database, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.storage.database_path = database;
    }
    let store = SqliteStore::open(&config.storage.database_path).await?;
    info!(
        path = %store.db_path().display(),
        articles = store.count().await?,
        "Opened article store"
    );
    let today = today_utc();

    match args.command {
        Command::Batch { start, end } => {
            let window = DateWindow::new(parse_cli_date(&start)?, parse_cli_date(&end)?, today)?;
            run_batch(&config, &store, &window).await?;
        }
        Command::Scrape {
            target,
            sector,
            domains,
            lookback,
            end,
        } => {
            let window = lookback_window(&config, end.as_deref(), lookback, today)?;
            run_scrape(&config, &store, &target, sector.as_deref(), &domains, &window).await?;
        }
        Command::Analyze {
            sector,
            stocks,
            lookback,
            end,
            max_articles,
            prompt,
            output_dir,
        } => {
            let window = lookback_window(&config, end.as_deref(), lookback, today)?;
            let mut options = AnalysisOptions::from_config(&config);
            if let Some(max_articles) = max_articles {
                options.max_articles = max_articles.max(1);
            }
            options.custom_prompt = prompt;
            run_analysis(&config, &store, &sector, &stocks, options, &window, &output_dir).await?;
        }
    }

    info!(
        elapsed_ms = start_time.elapsed().as_millis(),
        "sector_news finished"
    );
    Ok(())
}

/// Window of `lookback` days (config default when absent) ending at `end`
/// (today when absent).
fn lookback_window(
    config: &Config,
    end: Option<&str>,
    lookback: Option<u32>,
    today: chrono::NaiveDate,
) -> Result<DateWindow, error::ConfigError> {
    let end = end.map(parse_cli_date).transpose()?.unwrap_or(today);
    DateWindow::lookback(
        end,
        lookback.unwrap_or(config.analysis.default_lookback_days),
        today,
    )
}

#[instrument(level = "info", skip_all, fields(%window))]
async fn run_batch(config: &Config, store: &SqliteStore, window: &DateWindow) -> Result<(), Box<dyn Error>> {
    let extractor = ContentExtractor::new(&config.extraction)?;
    let launcher = ChromeLauncher::from_config(&config.search);
    let mut orchestrator =
        ScrapeOrchestrator::prepare(config, ScrapeMode::Batch, store, launcher, extractor).await?;

    tokio::select! {
        result = orchestrator.run_batch(window) => log_summary(&result?),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; saved articles and processed queries are kept for the next run");
        }
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(%target, %window))]
async fn run_scrape(
    config: &Config,
    store: &SqliteStore,
    target: &str,
    sector: Option<&str>,
    domains: &[String],
    window: &DateWindow,
) -> Result<(), Box<dyn Error>> {
    let extractor = ContentExtractor::new(&config.extraction)?;
    let launcher = ChromeLauncher::from_config(&config.search);
    let mut orchestrator =
        ScrapeOrchestrator::prepare(config, ScrapeMode::OnDemand, store, launcher, extractor).await?;

    let summary = orchestrator.run_on_demand(target, sector, domains, window).await?;
    log_summary(&summary);
    Ok(())
}

#[instrument(level = "info", skip_all, fields(%sector, %window))]
async fn run_analysis(
    config: &Config,
    store: &SqliteStore,
    sector: &str,
    stocks: &[String],
    options: AnalysisOptions,
    window: &DateWindow,
    output_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let targets = resolve_targets(config, sector, stocks)?;
    ensure_writable_dir(output_dir).await?;

    let llm = LlmSentimentAnalyzer::from_config(&config.llm)?;
    let prices = YahooChartSource::from_config(&config.prices)?;
    let analyzer = TargetAnalyzer::new(store, LexiconScorer, llm, prices, options);
    let report = analyzer.analyze_all(&targets, window).await;

    for target in &report.targets {
        info!(
            target = %target.target_name,
            articles = target.articles_processed,
            sent_to_llm = target.num_articles_for_llm,
            avg_vader = ?target.avg_vader_score,
            llm_sentiment = ?target.llm_analysis.as_ref().map(|a| a.overall_sentiment.as_str()),
            error = ?target.error,
            "Target analyzed"
        );
    }

    let path = outputs::json::write_report(&report, output_dir).await?;
    info!(path = %path.display(), "Analysis report written");
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    info!(
        searches = summary.searches_performed,
        saved = summary.articles_saved,
        already_seen = summary.urls_already_seen,
        out_of_window = summary.urls_out_of_window,
        rejected = summary.urls_rejected,
        failed = summary.urls_failed,
        queries_skipped = summary.queries_skipped,
        queries_blocked = summary.queries_blocked,
        queries_failed = summary.queries_failed,
        store_size = summary.store_size,
        "Scrape run summary"
    );
}
