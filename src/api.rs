//! LLM API interaction with exponential backoff retry logic.
//!
//! This module talks to an OpenAI-compatible chat-completions API and turns
//! its replies into structured sentiment analyses.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`ChatCompletionsClient`]: `POST {endpoint}/chat/completions` over `reqwest`
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//! - [`LlmSentimentAnalyzer`]: Builds the analysis prompt and parses the reply
//!
//! # Retry Strategy
//!
//! - Maximum retries from `llm.max_retries` (5 by default)
//! - Exponential backoff starting at `llm.base_delay_ms`
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::LlmConfig;
use crate::error::DownstreamError;
use crate::utils::{looks_truncated, truncate_for_log};

const SERVICE: &str = "llm";

/// Characters of each article sent to the model.
const MAX_ARTICLE_CHARS: usize = 4000;

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    ///
    /// # Arguments
    ///
    /// * `text` - The input text to send to the LLM
    ///
    /// # Returns
    ///
    /// The LLM's response, or an error if the request failed.
    async fn ask(&self, text: &str) -> Result<Self::Response, DownstreamError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying LLM client to wrap
    /// * `max_retries` - Maximum number of retry attempts (5 recommended)
    /// * `base_delay` - Initial delay between retries (1 second recommended)
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, DownstreamError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries || !is_retryable(&e) {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() giving up"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let shift = (attempt - 1).min(16) as u32;
                    let mut delay = self.base_delay.saturating_mul(1 << shift);
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Configuration problems and client errors (other than rate limiting) do
/// not improve with retries.
fn is_retryable(e: &DownstreamError) -> bool {
    match e {
        DownstreamError::Http { .. } | DownstreamError::Payload { .. } => true,
        DownstreamError::Status { status, .. } => *status == 429 || *status >= 500,
        DownstreamError::NotConfigured { .. } => false,
    }
}

/// Minimal OpenAI-compatible chat-completions client.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ChatCompletionsClient {
    /// Build a client from configuration. The API key is read from the
    /// environment variable named by `api_key_env`; local endpoints work
    /// without one.
    pub fn from_config(config: &LlmConfig) -> Result<Self, DownstreamError> {
        if config.endpoint.trim().is_empty() || config.model.trim().is_empty() {
            return Err(DownstreamError::NotConfigured {
                service: SERVICE,
                message: "llm.endpoint and llm.model must be set".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| DownstreamError::Http {
                service: SERVICE,
                source,
            })?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "No LLM API key in environment; sending unauthenticated requests");
        }
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl AskAsync for ChatCompletionsClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, DownstreamError> {
        let t0 = Instant::now();
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": "You are a financial news analyst. Reply with a single JSON object and nothing else."},
                {"role": "user", "content": text},
            ],
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|source| DownstreamError::Http {
            service: SERVICE,
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis(), "API call failed");
            return Err(DownstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|source| DownstreamError::Http {
            service: SERVICE,
            source,
        })?;
        debug!(elapsed_ms = t0.elapsed().as_millis(), "API call succeeded");
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DownstreamError::Payload {
                service: SERVICE,
                message: "response has no message content".to_string(),
            })
    }
}

/// Structured result of one LLM analysis over a set of articles.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LlmAnalysis {
    /// `Positive`, `Negative`, `Neutral` or `Mixed`.
    pub overall_sentiment: String,
    /// Model-assigned score in `[-1, 1]`.
    pub sentiment_score_llm: f64,
    pub summary: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub potential_impact: Option<String>,
}

/// Something that analyzes a batch of article texts for one target.
pub trait LlmAnalyzer {
    async fn analyze(
        &self,
        texts: &[String],
        target_name: &str,
        date_range: &str,
        custom_prompt: Option<&str>,
    ) -> Result<LlmAnalysis, DownstreamError>;
}

/// [`LlmAnalyzer`] over any string-returning [`AskAsync`] backend.
#[derive(Debug)]
pub struct LlmSentimentAnalyzer<A> {
    asker: A,
}

impl LlmSentimentAnalyzer<RetryAsk<ChatCompletionsClient>> {
    /// Chat-completions client wrapped in the configured retry policy.
    pub fn from_config(config: &LlmConfig) -> Result<Self, DownstreamError> {
        let client = ChatCompletionsClient::from_config(config)?;
        Ok(Self::new(RetryAsk::new(
            client,
            config.max_retries,
            StdDuration::from_millis(config.base_delay_ms),
        )))
    }
}

impl<A> LlmSentimentAnalyzer<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(asker: A) -> Self {
        Self { asker }
    }
}

/// Build the analysis prompt for `texts`.
pub fn build_prompt(
    texts: &[String],
    target_name: &str,
    date_range: &str,
    custom_prompt: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Analyze the following {} news articles about {target_name} published {date_range}.\n\
         Respond with a JSON object with the keys \"overall_sentiment\" (Positive, Negative, Neutral or Mixed), \
         \"sentiment_score_llm\" (a number from -1 to 1), \"summary\" (2-4 sentences), \
         \"key_themes\" (a list of short strings) and \"potential_impact\" (one sentence on the likely \
         effect on {target_name}).\n",
        texts.len()
    );
    if let Some(extra) = custom_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push_str("Additional instructions: ");
        prompt.push_str(extra);
        prompt.push('\n');
    }
    for (i, text) in texts.iter().enumerate() {
        let excerpt: String = text.chars().take(MAX_ARTICLE_CHARS).collect();
        prompt.push_str(&format!("\n--- Article {} ---\n{excerpt}\n", i + 1));
    }
    prompt
}

/// Strip a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_analysis(raw: &str) -> Result<LlmAnalysis, serde_json::Error> {
    serde_json::from_str::<LlmAnalysis>(strip_code_fence(raw)).map(|mut analysis| {
        analysis.sentiment_score_llm = analysis.sentiment_score_llm.clamp(-1.0, 1.0);
        analysis
    })
}

impl<A> LlmAnalyzer for LlmSentimentAnalyzer<A>
where
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip(self, texts, custom_prompt), fields(articles = texts.len()))]
    async fn analyze(
        &self,
        texts: &[String],
        target_name: &str,
        date_range: &str,
        custom_prompt: Option<&str>,
    ) -> Result<LlmAnalysis, DownstreamError> {
        let prompt = build_prompt(texts, target_name, date_range, custom_prompt);
        let response = self.asker.ask(&prompt).await?;
        let mut parsed = parse_analysis(&response);

        // If the parse failed due to EOF (truncation), re-ask ONCE
        if let Err(ref e) = parsed {
            if looks_truncated(e) {
                warn!(error = %e, "EOF while parsing; re-asking once");
                let retry = self.asker.ask(&prompt).await?;
                parsed = parse_analysis(&retry);
            }
        }

        match parsed {
            Ok(analysis) => {
                info!(sentiment = %analysis.overall_sentiment, score = analysis.sentiment_score_llm, "LLM analysis parsed");
                Ok(analysis)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&response, 300),
                    "Model returned non-conforming JSON"
                );
                Err(DownstreamError::Payload {
                    service: SERVICE,
                    message: e.to_string(),
                })
            }
        }
    }
}
