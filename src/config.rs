//! Run configuration.
//!
//! Everything tunable lives in one YAML document. Every field has a serde
//! default, so an empty file (or no file at all) yields the built-in
//! configuration: thirteen Indian financial news domains, one results page
//! per query, slow batch pacing and short on-demand pacing.
//!
//! ```yaml
//! domains: [moneycontrol.com, livemint.com]
//! batch:
//!   search_delay: { min_ms: 15000, max_ms: 18000 }
//! sectors:
//!   - name: Nifty IT
//!     keywords: [Indian IT sector]
//!     ticker: ^CNXIT
//!     stocks:
//!       - { name: Infosys, keywords: [Infosys results], ticker: INFY.NS }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::error::ConfigError;

/// Which of the two scrape modes a run is in. Selects pacing and whether
/// the processed-query log is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    Batch,
    OnDemand,
}

/// Inclusive bounds for a randomized delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelayBounds {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayBounds {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn zero() -> Self {
        Self::new(0, 0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Domains searched with `site:` restrictions. May carry a path prefix,
    /// e.g. `thehindu.com/business/`.
    pub domains: Vec<String>,
    pub search: SearchConfig,
    pub batch: ModeConfig,
    pub on_demand: ModeConfig,
    pub extraction: ExtractionConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
    pub prices: PriceConfig,
    pub sectors: Vec<SectorConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub language: String,
    pub country: String,
    pub page_load_timeout_secs: u64,
    /// Minimum length of at least one path segment for a link to count as an article.
    pub min_slug_len: usize,
    pub snapshot_dir: PathBuf,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub sector_keyword_limit: usize,
    pub stock_keyword_limit: usize,
}

/// Pacing and breadth for one scrape mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModeConfig {
    pub pages: usize,
    pub search_delay: DelayBounds,
    pub article_delay: DelayBounds,
    pub page_delay: DelayBounds,
    /// Number of configured domains used when no domain is given explicitly.
    pub domain_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub request_timeout_secs: u64,
    pub summary_sentences: usize,
    pub max_keywords: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub processed_queries_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_articles_for_llm: usize,
    pub default_lookback_days: u32,
    pub sector_keyword_limit: usize,
    /// Targets analyzed concurrently. Each one makes at most one LLM call.
    pub parallel_targets: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `http://localhost:11434/v1`.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PriceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SectorConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub ticker: Option<String>,
    pub stocks: Vec<StockConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StockConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub ticker: Option<String>,
}

const DEFAULT_DOMAINS: [&str; 13] = [
    "economictimes.indiatimes.com",
    "livemint.com",
    "business-standard.com",
    "thehindubusinessline.com",
    "financialexpress.com",
    "moneycontrol.com",
    "reuters.com",
    "bqprime.com",
    "cnbctv18.com",
    "thehindu.com/business/",
    "ndtvprofit.com",
    "zeebiz.com",
    "indiainfoline.com/news/",
];

impl Default for Config {
    fn default() -> Self {
        Self {
            domains: DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
            search: SearchConfig::default(),
            batch: ModeConfig::batch(),
            on_demand: ModeConfig::on_demand(),
            extraction: ExtractionConfig::default(),
            storage: StorageConfig::default(),
            analysis: AnalysisConfig::default(),
            llm: LlmConfig::default(),
            prices: PriceConfig::default(),
            sectors: default_sectors(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            country: "IN".to_string(),
            page_load_timeout_secs: 45,
            min_slug_len: 12,
            snapshot_dir: PathBuf::from("debug_snapshots"),
            headless: true,
            chrome_path: None,
            sector_keyword_limit: 3,
            stock_keyword_limit: 1,
        }
    }
}

impl ModeConfig {
    fn batch() -> Self {
        Self {
            pages: 1,
            search_delay: DelayBounds::new(15_000, 18_000),
            article_delay: DelayBounds::new(7_000, 9_000),
            page_delay: DelayBounds::new(5_000, 8_000),
            domain_limit: None,
        }
    }

    fn on_demand() -> Self {
        Self {
            pages: 1,
            search_delay: DelayBounds::new(3_000, 5_000),
            article_delay: DelayBounds::new(1_000, 2_000),
            page_delay: DelayBounds::new(2_000, 3_000),
            domain_limit: Some(3),
        }
    }
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self::batch()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 20,
            summary_sentences: 3,
            max_keywords: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/financial_news.db"),
            processed_queries_path: PathBuf::from("data/processed_queries.log"),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_articles_for_llm: 10,
            default_lookback_days: 7,
            sector_keyword_limit: 3,
            parallel_targets: 2,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "llama3.1".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            max_retries: 5,
            base_delay_ms: 1_000,
            request_timeout_secs: 120,
            temperature: 0.2,
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            request_timeout_secs: 20,
        }
    }
}

fn stock(name: &str, keywords: &[&str], ticker: &str) -> StockConfig {
    StockConfig {
        name: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        ticker: Some(ticker.to_string()),
    }
}

fn default_sectors() -> Vec<SectorConfig> {
    vec![
        SectorConfig {
            name: "Nifty IT".to_string(),
            keywords: vec![
                "Indian IT sector".to_string(),
                "IT services outlook India".to_string(),
                "Nifty IT index".to_string(),
            ],
            ticker: Some("^CNXIT".to_string()),
            stocks: vec![
                stock("Infosys", &["Infosys quarterly results"], "INFY.NS"),
                stock("TCS", &["Tata Consultancy Services deal wins"], "TCS.NS"),
                stock("Wipro", &["Wipro revenue guidance"], "WIPRO.NS"),
            ],
        },
        SectorConfig {
            name: "Nifty Bank".to_string(),
            keywords: vec![
                "Indian banking sector".to_string(),
                "RBI policy banks".to_string(),
                "Bank Nifty".to_string(),
            ],
            ticker: Some("^NSEBANK".to_string()),
            stocks: vec![
                stock("HDFC Bank", &["HDFC Bank loan growth"], "HDFCBANK.NS"),
                stock("ICICI Bank", &["ICICI Bank asset quality"], "ICICIBANK.NS"),
            ],
        },
    ]
}

impl Config {
    /// Load configuration from a YAML file, or the built-in defaults when no
    /// path is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] / [`ConfigError::Parse`] for an unreadable
    /// or malformed file and [`ConfigError::NoDomains`] when the resulting
    /// domain list is empty.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => {
                info!("No config file given; using built-in defaults");
                Config::default()
            }
            Some(path) => {
                let path_display = path.display().to_string();
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path_display.clone(),
                    source,
                })?;
                let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
                    path: path_display.clone(),
                    source,
                })?;
                info!(path = %path_display, sectors = config.sectors.len(), "Loaded config file");
                config
            }
        };

        if config.domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }
        debug!(domains = config.domains.len(), "Config validated");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn mode(&self, mode: ScrapeMode) -> &ModeConfig {
        match mode {
            ScrapeMode::Batch => &self.batch,
            ScrapeMode::OnDemand => &self.on_demand,
        }
    }

    pub fn sector(&self, name: &str) -> Option<&SectorConfig> {
        self.sectors
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Find a stock by name across all sectors, returning its sector too.
    pub fn stock(&self, name: &str) -> Option<(&SectorConfig, &StockConfig)> {
        self.sectors.iter().find_map(|sector| {
            sector
                .stocks
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(name))
                .map(|stock| (sector, stock))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_known_domain_list() {
        let config = Config::default();
        assert_eq!(config.domains.len(), 13);
        assert!(config.domains.contains(&"thehindu.com/business/".to_string()));
        assert_eq!(config.batch.pages, 1);
        assert_eq!(config.batch.search_delay.min_ms, 15_000);
        assert_eq!(config.batch.article_delay.min_ms, 7_000);
        assert_eq!(config.search.language, "en");
        assert_eq!(config.search.country, "IN");
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
domains: [moneycontrol.com]
batch:
  pages: 2
  search_delay: { min_ms: 0, max_ms: 0 }
sectors:
  - name: Nifty Auto
    keywords: [Indian auto sales]
    stocks:
      - name: Maruti
        keywords: [Maruti Suzuki sales]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.domains, vec!["moneycontrol.com"]);
        assert_eq!(config.batch.pages, 2);
        assert_eq!(config.batch.search_delay, DelayBounds::zero());
        // Unset fields inside a partially-specified section fall back too.
        assert_eq!(config.batch.article_delay.min_ms, 7_000);
        assert_eq!(config.search.min_slug_len, 12);
        assert_eq!(config.sectors.len(), 1);
        assert_eq!(config.sectors[0].stocks[0].name, "Maruti");
        assert!(config.sectors[0].stocks[0].ticker.is_none());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("   \n").unwrap();
        assert_eq!(config.domains.len(), 13);
    }

    #[test]
    fn test_load_rejects_empty_domain_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "domains: []\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::NoDomains));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/sector_news.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_stock_lookup_is_case_insensitive() {
        let config = Config::default();
        let (sector, stock) = config.stock("infosys").unwrap();
        assert_eq!(sector.name, "Nifty IT");
        assert_eq!(stock.ticker.as_deref(), Some("INFY.NS"));
        assert!(config.sector("nifty bank").is_some());
        assert!(config.stock("Unknown Co").is_none());
    }

    #[test]
    fn test_mode_selects_pacing() {
        let config = Config::default();
        assert!(
            config.mode(ScrapeMode::OnDemand).search_delay.max_ms
                < config.mode(ScrapeMode::Batch).search_delay.min_ms
        );
    }
}
