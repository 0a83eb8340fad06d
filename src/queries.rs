//! Search keyword generation for sectors and stocks.

use itertools::Itertools;

use crate::config::{Config, SectorConfig, StockConfig};
use crate::models::TargetType;

/// One search phrase for one target, before it is paired with domains and
/// a date window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuery {
    pub keyword: String,
    pub target_type: TargetType,
    pub target_name: String,
    pub sector_context: Option<String>,
}

fn with_year(keyword: &str, year: &str) -> String {
    if keyword.contains(year) {
        keyword.to_string()
    } else {
        format!("{keyword} {year}")
    }
}

/// Queries for a sector: its first `limit` general keywords tagged with the
/// year, plus `"{sector} news {year}"` when none of them names the sector.
pub fn sector_queries(sector: &SectorConfig, year: i32, limit: usize) -> Vec<KeywordQuery> {
    let year = year.to_string();
    let query = |keyword: String| KeywordQuery {
        keyword,
        target_type: TargetType::Sector,
        target_name: sector.name.clone(),
        sector_context: Some(sector.name.clone()),
    };

    let mut queries: Vec<KeywordQuery> = sector
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .take(limit)
        .map(|k| query(with_year(k, &year)))
        .collect();

    let name = sector.name.to_lowercase();
    if !queries.iter().any(|q| q.keyword.to_lowercase().contains(&name)) {
        queries.push(query(format!("{} news {year}", sector.name)));
    }
    queries
}

/// Queries for a stock: `"'{stock}' news {year}"` plus its first `limit`
/// specific keywords as `"'{stock}' {kw} {year}"`.
pub fn stock_queries(
    stock: &StockConfig,
    sector: Option<&str>,
    year: i32,
    limit: usize,
) -> Vec<KeywordQuery> {
    let query = |keyword: String| KeywordQuery {
        keyword,
        target_type: TargetType::Stock,
        target_name: stock.name.clone(),
        sector_context: sector.map(str::to_string),
    };

    std::iter::once(query(format!("'{}' news {year}", stock.name)))
        .chain(
            stock
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .take(limit)
                .map(|k| query(format!("'{}' {k} {year}", stock.name))),
        )
        .collect()
}

/// Drop repeats of the same `(keyword, target)` pair, keeping first
/// occurrences in order.
fn dedup(queries: Vec<KeywordQuery>) -> Vec<KeywordQuery> {
    queries
        .into_iter()
        .unique_by(|q| (q.keyword.clone(), q.target_name.clone()))
        .collect()
}

/// Every sector and every stock in the configuration.
pub fn batch_queries(config: &Config, year: i32) -> Vec<KeywordQuery> {
    let queries = config
        .sectors
        .iter()
        .flat_map(|sector| {
            let stocks = sector.stocks.iter().flat_map(|stock| {
                stock_queries(stock, Some(&sector.name), year, config.search.stock_keyword_limit)
            });
            sector_queries(sector, year, config.search.sector_keyword_limit)
                .into_iter()
                .chain(stocks)
                .collect::<Vec<_>>()
        })
        .collect();
    dedup(queries)
}

/// Queries for a single named target.
///
/// Configured sectors are matched first, then configured stocks. Any other
/// name is treated as an ad-hoc stock with no specific keywords, tagged
/// with `sector_hint` when one is given.
pub fn target_queries(
    config: &Config,
    target: &str,
    sector_hint: Option<&str>,
    year: i32,
) -> Vec<KeywordQuery> {
    let queries = if let Some(sector) = config.sector(target) {
        sector_queries(sector, year, config.search.sector_keyword_limit)
    } else if let Some((sector, stock)) = config.stock(target) {
        stock_queries(stock, Some(&sector.name), year, config.search.stock_keyword_limit)
    } else {
        let ad_hoc = StockConfig {
            name: target.trim().to_string(),
            ..StockConfig::default()
        };
        stock_queries(&ad_hoc, sector_hint, year, config.search.stock_keyword_limit)
    };
    dedup(queries)
}
