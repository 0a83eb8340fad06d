//! Daily closing prices for sector indices and stocks.
//!
//! [`YahooChartSource`] reads the public chart endpoint
//! `GET {base_url}/v8/finance/chart/{ticker}?period1=..&period2=..&interval=1d`.
//! A ticker with no data in the window yields an empty series, not an error.

use chrono::{DateTime, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::PriceConfig;
use crate::error::DownstreamError;
use crate::extract::random_user_agent;
use crate::utils::truncate_for_log;

const SERVICE: &str = "prices";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// A source of daily closing prices.
pub trait PriceSource {
    /// Closes for `ticker` on trading days in `[start, end]`, oldest first.
    async fn daily_close(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, DownstreamError>;
}

#[derive(Debug, Clone)]
pub struct YahooChartSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooChartSource {
    pub fn from_config(config: &PriceConfig) -> Result<Self, DownstreamError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(random_user_agent())
            .build()
            .map_err(|source| DownstreamError::Http {
                service: SERVICE,
                source,
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Pair timestamps with closes, dropping null closes and days outside the
/// window.
fn points_from_chart(envelope: ChartEnvelope, start: NaiveDate, end: NaiveDate) -> Vec<PricePoint> {
    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Vec::new();
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Vec::new();
    };
    result
        .timestamp
        .iter()
        .zip(quote.close)
        .filter_map(|(&ts, close)| {
            let date = DateTime::from_timestamp(ts, 0)?.date_naive();
            let close = close.filter(|c| c.is_finite())?;
            (date >= start && date <= end).then_some(PricePoint { date, close })
        })
        .collect()
}

impl PriceSource for YahooChartSource {
    #[instrument(level = "info", skip(self))]
    async fn daily_close(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, DownstreamError> {
        let period1 = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive
        let period2 = (end + TimeDelta::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(ticker)
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await
            .map_err(|source| DownstreamError::Http {
                service: SERVICE,
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(ticker, "No price data for ticker");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(ticker, status = status.as_u16(), "Price request failed");
            return Err(DownstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let envelope: ChartEnvelope = response.json().await.map_err(|e| DownstreamError::Payload {
            service: SERVICE,
            message: e.to_string(),
        })?;
        let points = points_from_chart(envelope, start, end);
        debug!(ticker, count = points.len(), "Fetched daily closes");
        Ok(points)
    }
}
