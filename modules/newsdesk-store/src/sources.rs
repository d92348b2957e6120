use chrono::{DateTime, Utc};
use newsdesk_common::{ParserConfig, Result};
use sqlx::PgPool;

/// A row from the crawl_sources table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrawlSource {
    pub id: i64,
    pub site_name: String,
    pub base_url: String,
    pub parser_config: serde_json::Value,
    pub enabled: bool,
    pub crawl_interval_seconds: i32,
    pub robots_status: String,
    pub crawl_delay_seconds: Option<f64>,
    pub robots_fetched_at: Option<DateTime<Utc>>,
    pub sitemap_url: Option<String>,
    pub discovery_method: String,
    pub success_count: i32,
    pub failure_count: i32,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlSource {
    /// Decode the embedded parser configuration, falling back to defaults on
    /// malformed JSON so a bad row never takes down a whole crawl batch.
    pub fn parser_config(&self) -> ParserConfig {
        serde_json::from_value(self.parser_config.clone()).unwrap_or_default()
    }
}

/// Parameters for inserting a new crawl source.
#[derive(Debug, Clone)]
pub struct InsertSource {
    pub site_name: String,
    pub base_url: String,
    pub parser_config: ParserConfig,
    pub crawl_interval_seconds: i32,
    pub discovery_method: String,
}

#[derive(Clone)]
pub struct SourceRepo {
    pool: PgPool,
}

impl SourceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, s: InsertSource) -> Result<CrawlSource> {
        let row = sqlx::query_as::<_, CrawlSource>(
            r#"
            INSERT INTO crawl_sources
                (site_name, base_url, parser_config, crawl_interval_seconds, discovery_method)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&s.site_name)
        .bind(s.base_url.trim_end_matches('/'))
        .bind(serde_json::to_value(&s.parser_config).unwrap_or(serde_json::Value::Null))
        .bind(s.crawl_interval_seconds)
        .bind(&s.discovery_method)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<CrawlSource>> {
        let row = sqlx::query_as::<_, CrawlSource>("SELECT * FROM crawl_sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_base_url(&self, base_url: &str) -> Result<Option<CrawlSource>> {
        let row =
            sqlx::query_as::<_, CrawlSource>("SELECT * FROM crawl_sources WHERE base_url = $1")
                .bind(base_url.trim_end_matches('/'))
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    pub async fn list(&self, enabled_only: bool, limit: i64) -> Result<Vec<CrawlSource>> {
        let rows = if enabled_only {
            sqlx::query_as::<_, CrawlSource>(
                "SELECT * FROM crawl_sources WHERE enabled ORDER BY site_name LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, CrawlSource>(
                "SELECT * FROM crawl_sources ORDER BY site_name LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    /// Sources that still have pending URLs waiting to be crawled.
    pub async fn list_with_pending(&self) -> Result<Vec<CrawlSource>> {
        let rows = sqlx::query_as::<_, CrawlSource>(
            r#"
            SELECT DISTINCT s.* FROM crawl_sources s
            INNER JOIN pending_articles p ON p.source_id = s.id
            WHERE p.status = 'pending'
            ORDER BY s.site_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE crawl_sources SET enabled = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_parser_config(&self, id: i64, config: &ParserConfig) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE crawl_sources SET parser_config = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::to_value(config).unwrap_or(serde_json::Value::Null))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record the outcome of a robots.txt check.
    pub async fn update_robots(
        &self,
        id: i64,
        status: &str,
        crawl_delay_seconds: Option<f64>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_sources
            SET robots_status = $2, crawl_delay_seconds = $3,
                robots_fetched_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(crawl_delay_seconds)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_sitemap_url(&self, id: i64, sitemap_url: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE crawl_sources SET sitemap_url = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(sitemap_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Bump success/failure counters after a crawl batch.
    pub async fn record_crawl(&self, id: i64, success: i32, failure: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_sources
            SET success_count = success_count + $2,
                failure_count = failure_count + $3,
                last_crawled_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(success)
        .bind(failure)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM crawl_sources WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
