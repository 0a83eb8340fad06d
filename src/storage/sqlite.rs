//! SQLite [`ArticleStore`] over `sqlx`.
//!
//! Dates are stored as `YYYY-MM-DD HH:MM:SS` text so range filters and
//! ordering work lexicographically. `authors` and `keywords_extracted` hold
//! JSON arrays, `llm_analysis_json` the raw LLM payload.

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use super::{ArticleQuery, ArticleStore, UpsertOutcome};
use crate::error::StoreError;
use crate::models::{ArticleRecord, ScoreUpdate};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scraped_articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        headline TEXT,
        article_text TEXT,
        publication_date TEXT NOT NULL,
        download_date TEXT NOT NULL,
        source_domain TEXT,
        language TEXT,
        authors TEXT,
        keywords_extracted TEXT,
        summary_generated TEXT,
        vader_score REAL,
        llm_sentiment_score REAL,
        llm_sentiment_label TEXT,
        llm_analysis_json TEXT,
        related_sector TEXT,
        related_stock TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ix_scraped_articles_pub_date_domain_headline
        ON scraped_articles (publication_date, source_domain, headline)
    "#,
    "CREATE INDEX IF NOT EXISTS ix_scraped_articles_related_sector ON scraped_articles (related_sector)",
    "CREATE INDEX IF NOT EXISTS ix_scraped_articles_related_stock ON scraped_articles (related_stock)",
];

const UPSERT_SQL: &str = r#"
    INSERT INTO scraped_articles (
        url, headline, article_text, publication_date, download_date,
        source_domain, language, authors, keywords_extracted, summary_generated,
        vader_score, llm_sentiment_score, llm_sentiment_label, llm_analysis_json,
        related_sector, related_stock
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(url) DO UPDATE SET
        headline = COALESCE(excluded.headline, scraped_articles.headline),
        article_text = COALESCE(excluded.article_text, scraped_articles.article_text),
        source_domain = COALESCE(excluded.source_domain, scraped_articles.source_domain),
        language = COALESCE(excluded.language, scraped_articles.language),
        authors = COALESCE(excluded.authors, scraped_articles.authors),
        keywords_extracted = COALESCE(excluded.keywords_extracted, scraped_articles.keywords_extracted),
        summary_generated = COALESCE(excluded.summary_generated, scraped_articles.summary_generated),
        related_sector = COALESCE(scraped_articles.related_sector, excluded.related_sector),
        related_stock = COALESCE(scraped_articles.related_stock, excluded.related_stock)
"#;

const UPDATE_SCORES_SQL: &str = r#"
    UPDATE scraped_articles SET
        vader_score = COALESCE(?, vader_score),
        llm_sentiment_score = COALESCE(?, llm_sentiment_score),
        llm_sentiment_label = COALESCE(?, llm_sentiment_label),
        llm_analysis_json = COALESCE(?, llm_analysis_json),
        related_sector = COALESCE(related_sector, ?),
        related_stock = COALESCE(related_stock, ?)
    WHERE url = ?
"#;

pub struct SqliteStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and run migrations.
    #[instrument(level = "info", skip_all, fields(path = %db_path.display()))]
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration).execute(&pool).await?;
            debug!(migration = i, "Applied migration");
        }
        info!("Article database ready");

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM scraped_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn format_date(dt: NaiveDateTime) -> String {
    dt.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| StoreError::InvalidStoredDate(raw.to_string()))
}

fn json_list(items: &[String]) -> Result<Option<String>, StoreError> {
    if items.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(items)?))
    }
}

fn parse_list(raw: Option<String>) -> Result<Vec<String>, StoreError> {
    match raw {
        Some(s) if !s.is_empty() => Ok(serde_json::from_str(&s)?),
        _ => Ok(Vec::new()),
    }
}

/// Escape `LIKE` wildcards so keywords match literally.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn row_to_record(row: &SqliteRow) -> Result<ArticleRecord, StoreError> {
    let payload: Option<String> = row.try_get("llm_analysis_json")?;
    Ok(ArticleRecord {
        url: row.try_get("url")?,
        headline: row.try_get("headline")?,
        body_text: row.try_get("article_text")?,
        publication_date: parse_date(&row.try_get::<String, _>("publication_date")?)?,
        download_date: parse_date(&row.try_get::<String, _>("download_date")?)?,
        source_domain: row.try_get("source_domain")?,
        language: row.try_get("language")?,
        authors: parse_list(row.try_get("authors")?)?,
        extracted_keywords: parse_list(row.try_get("keywords_extracted")?)?,
        generated_summary: row.try_get("summary_generated")?,
        vader_score: row.try_get("vader_score")?,
        llm_sentiment_score: row.try_get("llm_sentiment_score")?,
        llm_sentiment_label: row.try_get("llm_sentiment_label")?,
        llm_analysis_payload: payload.map(|p| serde_json::from_str(&p)).transpose()?,
        related_sector: row.try_get("related_sector")?,
        related_stock: row.try_get("related_stock")?,
    })
}

impl ArticleStore for SqliteStore {
    async fn all_urls(&self) -> Result<HashSet<String>, StoreError> {
        let rows = sqlx::query("SELECT url FROM scraped_articles")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("url").map_err(StoreError::from))
            .collect()
    }

    #[instrument(level = "debug", skip_all, fields(url = %record.url))]
    async fn upsert(&self, record: &ArticleRecord) -> Result<UpsertOutcome, StoreError> {
        let authors = json_list(&record.authors)?;
        let keywords = json_list(&record.extracted_keywords)?;
        let payload = record
            .llm_analysis_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query("SELECT 1 FROM scraped_articles WHERE url = ?")
            .bind(&record.url)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(UPSERT_SQL)
            .bind(&record.url)
            .bind(record.headline.as_deref())
            .bind(record.body_text.as_deref())
            .bind(format_date(record.publication_date))
            .bind(format_date(record.download_date))
            .bind(record.source_domain.as_deref())
            .bind(record.language.as_deref())
            .bind(authors)
            .bind(keywords)
            .bind(record.generated_summary.as_deref())
            .bind(record.vader_score)
            .bind(record.llm_sentiment_score)
            .bind(record.llm_sentiment_label.as_deref())
            .bind(payload)
            .bind(record.related_sector.as_deref())
            .bind(record.related_stock.as_deref())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    #[instrument(level = "debug", skip(self, update))]
    async fn update_scores(&self, url: &str, update: &ScoreUpdate) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(false);
        }
        let payload = update
            .llm_analysis_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(UPDATE_SCORES_SQL)
            .bind(update.vader_score)
            .bind(update.llm_sentiment_score)
            .bind(update.llm_sentiment_label.as_deref())
            .bind(payload)
            .bind(update.related_sector.as_deref())
            .bind(update.related_stock.as_deref())
            .bind(url)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(%url, "Article not found for score update");
            return Ok(false);
        }
        Ok(true)
    }

    #[instrument(level = "debug", skip_all, fields(keywords = query.keywords.len(), limit = query.limit))]
    async fn find_by_keywords(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT * FROM scraped_articles \
             WHERE publication_date >= ? AND publication_date <= ? \
             AND article_text IS NOT NULL AND TRIM(article_text) != ''",
        );
        if !query.domains.is_empty() {
            let clauses = vec!["LOWER(source_domain) LIKE ? ESCAPE '\\'"; query.domains.len()];
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
        if !query.keywords.is_empty() {
            let clauses = vec![
                "LOWER(headline) LIKE ? ESCAPE '\\' OR LOWER(article_text) LIKE ? ESCAPE '\\'";
                query.keywords.len()
            ];
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
        sql.push_str(" ORDER BY publication_date DESC, url ASC LIMIT ?");

        let mut q = sqlx::query(&sql)
            .bind(format_date(query.start))
            .bind(format_date(query.end));
        for domain in &query.domains {
            q = q.bind(like_pattern(domain));
        }
        for keyword in &query.keywords {
            let pattern = like_pattern(keyword);
            q = q.bind(pattern.clone()).bind(pattern);
        }
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = q.bind(limit).fetch_all(&self.pool).await?;

        let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()?;
        debug!(found = records.len(), "Keyword search complete");
        Ok(records)
    }

    async fn get(&self, url: &str) -> Result<Option<ArticleRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM scraped_articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }
}
