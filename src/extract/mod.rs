//! Article content extraction.
//!
//! A page is downloaded once and handed to several independent
//! [`ExtractionStrategy`] implementations:
//!
//! - [`metadata::MetadataStrategy`]: JSON-LD, OpenGraph and `<meta>` tags
//! - [`readability::ReadabilityStrategy`]: paragraph-density boilerplate removal
//! - [`markup::MarkupStrategy`]: raw `h1`/`article`/`time`/byline selectors
//!
//! Their [`PartialRecord`]s are merged field by field. For every field the
//! [`FIELD_PRIORITY`] table names the strategies to consult, in order; the
//! first usable value wins. A strategy that errors or panics is logged and
//! skipped, and never stops the others.
//!
//! The merged result passes a validation gate: body, headline and a
//! parseable publish date are all required.

pub mod markup;
pub mod metadata;
pub mod readability;

use chrono::NaiveDateTime;
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::{rng, Rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, RejectReason, StrategyError};
use crate::models::source_host;
use crate::text;

/// Desktop browser user agents rotated per article request.
static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    ]
});

pub fn random_user_agent() -> &'static str {
    let i = rng().random_range(0..USER_AGENTS.len());
    USER_AGENTS[i]
}

/// A downloaded article page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Metadata,
    Readability,
    Markup,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::Metadata => "metadata",
            StrategyKind::Readability => "readability",
            StrategyKind::Markup => "markup",
        };
        f.write_str(name)
    }
}

/// One strategy's best-effort output. Every field is optional; values are
/// raw and get normalized during the merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub headline: Option<String>,
    pub body_text: Option<String>,
    pub authors: Vec<String>,
    pub publish_date: Option<NaiveDateTime>,
    pub language: Option<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
}

pub trait ExtractionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn extract(&self, page: &FetchedPage) -> Result<PartialRecord, StrategyError>;
}

/// Fields resolved during the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Headline,
    Body,
    Authors,
    PublishDate,
    Language,
    Keywords,
    Summary,
}

use StrategyKind::{Markup, Metadata, Readability};

/// Strategy order consulted for each field.
pub const FIELD_PRIORITY: [(Field, &[StrategyKind]); 7] = [
    (Field::Headline, &[Metadata, Readability, Markup]),
    (Field::Body, &[Readability, Metadata, Markup]),
    (Field::Authors, &[Metadata, Markup, Readability]),
    (Field::PublishDate, &[Metadata, Markup, Readability]),
    (Field::Language, &[Metadata, Readability, Markup]),
    (Field::Keywords, &[Metadata]),
    (Field::Summary, &[Metadata]),
];

pub fn priority(field: Field) -> &'static [StrategyKind] {
    FIELD_PRIORITY
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, order)| *order)
        .unwrap_or(&[])
}

/// A validated article ready to become an [`crate::models::ArticleRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArticle {
    pub url: String,
    pub headline: String,
    pub body_text: String,
    pub publish_date: NaiveDateTime,
    pub authors: Vec<String>,
    pub language: Option<String>,
    pub source_domain: Option<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
}

/// Merged fields before the validation gate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedFields {
    pub headline: Option<String>,
    pub body_text: Option<String>,
    pub authors: Vec<String>,
    pub publish_date: Option<NaiveDateTime>,
    pub language: Option<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
}

fn resolve<T>(
    outputs: &[(StrategyKind, PartialRecord)],
    field: Field,
    pick: impl Fn(&PartialRecord) -> Option<T>,
) -> Option<T> {
    priority(field).iter().find_map(|kind| {
        outputs
            .iter()
            .filter(|(k, _)| k == kind)
            .find_map(|(_, partial)| pick(partial))
    })
}

fn usable_list(items: &[String]) -> Option<Vec<String>> {
    let cleaned: Vec<String> = items
        .iter()
        .filter_map(|item| text::usable(item))
        .unique()
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Merge strategy outputs with first-valid-wins per field, then fill
/// keywords and summary from the body when no strategy supplied them.
pub fn merge(outputs: &[(StrategyKind, PartialRecord)], config: &ExtractionConfig) -> MergedFields {
    let headline = resolve(outputs, Field::Headline, |p| p.headline.as_deref().and_then(text::usable));
    let body_text = resolve(outputs, Field::Body, |p| p.body_text.as_deref().and_then(text::usable));
    let authors = resolve(outputs, Field::Authors, |p| usable_list(&p.authors)).unwrap_or_default();
    let publish_date = resolve(outputs, Field::PublishDate, |p| p.publish_date);
    let language = resolve(outputs, Field::Language, |p| {
        p.language.as_deref().and_then(text::usable).map(|l| l.to_lowercase())
    });

    let keywords = resolve(outputs, Field::Keywords, |p| usable_list(&p.keywords))
        .or_else(|| {
            body_text
                .as_deref()
                .map(|body| text::extract_keywords(body, config.max_keywords))
                .filter(|kws| !kws.is_empty())
        })
        .unwrap_or_default();
    let summary = resolve(outputs, Field::Summary, |p| p.summary.as_deref().and_then(text::usable))
        .or_else(|| {
            body_text
                .as_deref()
                .map(|body| text::summarize(body, config.summary_sentences))
                .filter(|s| !s.is_empty())
        });

    MergedFields {
        headline,
        body_text,
        authors,
        publish_date,
        language,
        keywords,
        summary,
    }
}

impl MergedFields {
    /// Apply the validation gate.
    pub fn validate(self, url: &str) -> Result<ExtractedArticle, RejectReason> {
        let body_text = self.body_text.ok_or(RejectReason::MissingBody)?;
        let headline = self.headline.ok_or(RejectReason::MissingHeadline)?;
        let publish_date = self.publish_date.ok_or(RejectReason::MissingPublishDate)?;
        Ok(ExtractedArticle {
            url: url.to_string(),
            headline,
            body_text,
            publish_date,
            authors: self.authors,
            language: self.language,
            source_domain: source_host(url),
            keywords: self.keywords,
            summary: self.summary,
        })
    }
}

/// Something that turns a URL into a validated article.
pub trait ArticleExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, ExtractError>;
}

pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![
        Box::new(metadata::MetadataStrategy),
        Box::new(readability::ReadabilityStrategy),
        Box::new(markup::MarkupStrategy),
    ]
}

/// Downloads article pages and runs the extraction strategies over them.
pub struct ContentExtractor {
    client: reqwest::Client,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    config: ExtractionConfig,
}

impl std::fmt::Debug for ContentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentExtractor")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.kind()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

impl ContentExtractor {
    /// Build an extractor with the default strategies and a client whose
    /// requests time out after `config.request_timeout_secs`.
    pub fn new(config: &ExtractionConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(10)))
            .build()?;
        Ok(Self::with_strategies(client, default_strategies(), config))
    }

    pub fn with_strategies(
        client: reqwest::Client,
        strategies: Vec<Box<dyn ExtractionStrategy>>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            client,
            strategies,
            config: config.clone(),
        }
    }

    /// Run every strategy over already-downloaded HTML and merge the results.
    pub fn extract_from_html(&self, url: &str, html: &str) -> Result<ExtractedArticle, ExtractError> {
        let page = FetchedPage {
            url: url.to_string(),
            html: html.to_string(),
        };
        let outputs = self.run_strategies(&page);
        merge(&outputs, &self.config)
            .validate(url)
            .map_err(|reason| ExtractError::Rejected {
                url: url.to_string(),
                reason,
            })
    }

    fn run_strategies(&self, page: &FetchedPage) -> Vec<(StrategyKind, PartialRecord)> {
        let mut outputs = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let kind = strategy.kind();
            let result = catch_unwind(AssertUnwindSafe(|| strategy.extract(page)))
                .unwrap_or(Err(StrategyError::Panicked));
            match result {
                Ok(partial) => {
                    debug!(
                        strategy = %kind,
                        has_body = partial.body_text.is_some(),
                        has_headline = partial.headline.is_some(),
                        has_date = partial.publish_date.is_some(),
                        "Strategy finished"
                    );
                    outputs.push((kind, partial));
                }
                Err(e) => warn!(strategy = %kind, url = %page.url, error = %e, "Extraction strategy failed"),
            }
        }
        outputs
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ExtractError> {
        let parsed = url::Url::parse(url).map_err(|_| ExtractError::InvalidUrl(url.to_string()))?;
        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-IN,en;q=0.9")
            .send()
            .await
            .map_err(|source| ExtractError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await.map_err(|source| ExtractError::Fetch {
            url: url.to_string(),
            source,
        })?;
        debug!(bytes = html.len(), "Downloaded article page");
        Ok(FetchedPage {
            url: url.to_string(),
            html,
        })
    }
}

impl ArticleExtractor for ContentExtractor {
    #[instrument(level = "info", skip(self))]
    async fn extract(&self, url: &str) -> Result<ExtractedArticle, ExtractError> {
        let page = self.fetch(url).await?;
        let article = self.extract_from_html(&page.url, &page.html)?;
        info!(
            headline = %crate::utils::truncate_for_log(&article.headline, 80),
            published = %article.publish_date,
            bytes = article.body_text.len(),
            "Extracted article"
        );
        Ok(article)
    }
}
