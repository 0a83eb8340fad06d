//! Error taxonomy for the scraping pipeline.
//!
//! Every layer owns one error type and failures are contained at the
//! smallest unit that can absorb them:
//!
//! | Type | Unit | Raised by |
//! |------|------|-----------|
//! | [`ConfigError`] | run | CLI/config validation, before any network call |
//! | [`HarvestError`] | query | browser launch, navigation, page reads |
//! | [`ExtractError`] | URL | article download and the validation gate |
//! | [`StoreError`] | record | the persistence collaborator |
//! | [`DownstreamError`] | target | LLM and price-series collaborators |
//! | [`RunError`] | run | setup steps of a scrape run (store, query log) |
//!
//! Bot-detection blocks are not an error: the harvester reports them as
//! [`crate::harvest::HarvestOutcome::Blocked`] together with whatever it
//! collected before the block.

use chrono::NaiveDate;
use thiserror::Error;

/// Invalid or missing run parameters. The only class that aborts a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("start date {start} is after end date {end}")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },

    #[error("lookback must cover at least one day")]
    ZeroLookback,

    #[error("unknown sector '{0}'")]
    UnknownSector(String),

    #[error("no news domains configured")]
    NoDomains,
}

/// Failure of a single harvest call (one query).
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("failed to launch browser session: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("browser error: {0}")]
    Browser(String),
}

/// Why an extracted article failed the validation gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingBody,
    MissingHeadline,
    MissingPublishDate,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            RejectReason::MissingBody => "no body text from any strategy",
            RejectReason::MissingHeadline => "no headline from any strategy",
            RejectReason::MissingPublishDate => "no parseable publish date",
        };
        f.write_str(reason)
    }
}

/// Failure to turn one URL into a usable article.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Network failure or timeout. Transient; never retried within a run.
    #[error("fetch of {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetch of {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid article url {0}")]
    InvalidUrl(String),

    /// Every strategy ran but the merged record is unusable.
    #[error("article {url} rejected: {reason}")]
    Rejected { url: String, reason: RejectReason },
}

/// Failure inside one extraction strategy. Logged and swallowed by the
/// extractor so the remaining strategies still run.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("document has no usable content")]
    EmptyDocument,

    #[error("strategy panicked")]
    Panicked,
}

/// Persistence failure for a single record or query.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored date '{0}' is not valid")]
    InvalidStoredDate(String),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a slow, fallible collaborator (LLM, price source).
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unusable payload: {message}")]
    Payload {
        service: &'static str,
        message: String,
    },

    #[error("{service} is not configured: {message}")]
    NotConfigured {
        service: &'static str,
        message: String,
    },
}

/// Failure that prevents a scrape run from starting or finishing its setup.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("article store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("processed-query log unavailable: {0}")]
    QueryLog(#[from] std::io::Error),
}
