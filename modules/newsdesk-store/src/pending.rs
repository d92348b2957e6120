use chrono::{DateTime, Utc};
use newsdesk_common::{url_hash, PendingStatus, Result};
use sqlx::PgPool;

/// A row from the pending_articles table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingArticle {
    pub id: i64,
    pub source_id: i64,
    pub sitemap_id: Option<i64>,
    pub url: String,
    pub url_hash: String,
    pub title: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for importing one discovered URL.
#[derive(Debug, Clone)]
pub struct InsertPending {
    pub source_id: i64,
    pub sitemap_id: Option<i64>,
    pub url: String,
    pub title: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
}

/// Per-status counts for a source's queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingCount {
    pub status: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct PendingRepo {
    pool: PgPool,
}

impl PendingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a discovered URL. Returns None when the url_hash already exists
    /// (already discovered), Some(row) for a fresh insert.
    pub async fn insert(&self, p: InsertPending) -> Result<Option<PendingArticle>> {
        let hash = url_hash(&p.url);
        let row = sqlx::query_as::<_, PendingArticle>(
            r#"
            INSERT INTO pending_articles (source_id, sitemap_id, url, url_hash, title, publish_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (url_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(p.source_id)
        .bind(p.sitemap_id)
        .bind(&p.url)
        .bind(&hash)
        .bind(&p.title)
        .bind(p.publish_time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<PendingArticle>> {
        let row =
            sqlx::query_as::<_, PendingArticle>("SELECT * FROM pending_articles WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    pub async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let hash = url_hash(url);
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM pending_articles WHERE url_hash = $1")
                .bind(&hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Next batch for a source, freshest publish dates first; undated rows
    /// sort last so fresh news is fetched before backfill.
    pub async fn next_for_source(&self, source_id: i64, limit: i64) -> Result<Vec<PendingArticle>> {
        let rows = sqlx::query_as::<_, PendingArticle>(
            r#"
            SELECT * FROM pending_articles
            WHERE source_id = $1 AND status = 'pending'
            ORDER BY publish_time DESC NULLS LAST, created_at DESC
            LIMIT $2
            "#,
        )
        .bind(source_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_by_status(&self, status: PendingStatus, limit: i64) -> Result<Vec<PendingArticle>> {
        let rows = sqlx::query_as::<_, PendingArticle>(
            r#"
            SELECT * FROM pending_articles
            WHERE status = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_by_source(
        &self,
        source_id: i64,
        status: Option<PendingStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PendingArticle>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, PendingArticle>(
                    r#"
                    SELECT * FROM pending_articles
                    WHERE source_id = $1 AND status = $2
                    ORDER BY created_at DESC
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(source_id)
                .bind(status.to_string())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PendingArticle>(
                    r#"
                    SELECT * FROM pending_articles
                    WHERE source_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(source_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn update_status(&self, id: i64, status: PendingStatus) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE pending_articles SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn counts_for_source(&self, source_id: i64) -> Result<Vec<PendingCount>> {
        let rows = sqlx::query_as::<_, PendingCount>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM pending_articles
            WHERE source_id = $1
            GROUP BY status
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Ids of rows with a missing or implausible publish time, for the
    /// low-quality cleanup pass.
    pub async fn find_low_quality(
        &self,
        min_time: DateTime<Utc>,
        max_time: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM pending_articles
            WHERE status != 'low_quality'
              AND (publish_time IS NULL OR publish_time < $1 OR publish_time > $2)
            LIMIT $3
            "#,
        )
        .bind(min_time)
        .bind(max_time)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
