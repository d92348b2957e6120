use chrono::{DateTime, Utc};
use newsdesk_common::Result;
use sqlx::PgPool;

/// A row from the sitemaps table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Sitemap {
    pub id: i64,
    pub source_id: i64,
    pub url: String,
    pub last_fetched: Option<DateTime<Utc>>,
    pub fetch_status: String,
    pub article_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SitemapRepo {
    pool: PgPool,
}

impl SitemapRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a sitemap, returning the existing row when the URL is already
    /// attached (URLs are globally unique).
    pub async fn upsert(&self, source_id: i64, url: &str) -> Result<Sitemap> {
        let row = sqlx::query_as::<_, Sitemap>(
            r#"
            INSERT INTO sitemaps (source_id, url)
            VALUES ($1, $2)
            ON CONFLICT (url) DO UPDATE SET updated_at = now()
            RETURNING *
            "#,
        )
        .bind(source_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Sitemap>> {
        let row = sqlx::query_as::<_, Sitemap>("SELECT * FROM sitemaps WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<Sitemap>> {
        let row = sqlx::query_as::<_, Sitemap>("SELECT * FROM sitemaps WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_by_source(&self, source_id: i64) -> Result<Vec<Sitemap>> {
        let rows =
            sqlx::query_as::<_, Sitemap>("SELECT * FROM sitemaps WHERE source_id = $1 ORDER BY id")
                .bind(source_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    /// Sitemaps attached to enabled sources, for the periodic sitemap crawl.
    pub async fn list_enabled(&self) -> Result<Vec<Sitemap>> {
        let rows = sqlx::query_as::<_, Sitemap>(
            r#"
            SELECT s.* FROM sitemaps s
            INNER JOIN crawl_sources c ON s.source_id = c.id
            WHERE c.enabled
            ORDER BY s.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn record_fetch(&self, id: i64, status: &str, article_count: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sitemaps
            SET fetch_status = $2, article_count = $3,
                last_fetched = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(article_count)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deleting a sitemap cascades to the pending URLs it produced.
    pub async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sitemaps WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
