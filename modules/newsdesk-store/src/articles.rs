use chrono::{DateTime, Utc};
use newsdesk_common::{content_hash, url_hash, ArticleStatus, Result, ScrapedArticle};
use sqlx::PgPool;

/// A row from the articles table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub url_hash: String,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub content_hash: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub source_id: i64,
    pub status: String,
    pub fetch_status: String,
    pub retry_count: i32,
    pub error_msg: Option<String>,
    pub extra_data: Option<serde_json::Value>,
    pub crawled_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Image URLs carried in extra_data, if any.
    pub fn images(&self) -> Vec<String> {
        self.extra_data
            .as_ref()
            .and_then(|d| d.get("images"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parameters for inserting a fetched article.
#[derive(Debug, Clone)]
pub struct InsertArticle {
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub source_id: i64,
    pub extra_data: Option<serde_json::Value>,
}

impl InsertArticle {
    /// Build insert params from a scrape result, falling back to the
    /// pending row's title/time where the scrape came back empty.
    pub fn from_scraped(
        scraped: &ScrapedArticle,
        source_id: i64,
        fallback_title: Option<&str>,
        fallback_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            url: scraped.url.clone(),
            title: scraped
                .title
                .clone()
                .or_else(|| fallback_title.map(String::from))
                .unwrap_or_else(|| "Untitled".to_string()),
            content: scraped.content.clone(),
            publish_time: scraped.publish_time.or(fallback_time),
            author: scraped.author.clone(),
            source_id,
            extra_data: scraped.extra_data(),
        }
    }
}

/// Filters for article listing.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub status: Option<String>,
    pub fetch_status: Option<String>,
    pub source_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ArticleRepo {
    pool: PgPool,
}

impl ArticleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new article. Duplicate url_hash is a conflict surfaced to
    /// the caller so executors can mark the pending row completed instead.
    pub async fn insert(&self, a: InsertArticle) -> Result<Article> {
        let hash = url_hash(&a.url);
        let chash = a.content.as_deref().and_then(content_hash);
        let row = sqlx::query_as::<_, Article>(
            r#"
            INSERT INTO articles
                (url_hash, url, title, content, content_hash, publish_time,
                 author, source_id, fetch_status, extra_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'success', $9)
            RETURNING *
            "#,
        )
        .bind(&hash)
        .bind(&a.url)
        .bind(&a.title)
        .bind(&a.content)
        .bind(&chash)
        .bind(a.publish_time)
        .bind(&a.author)
        .bind(a.source_id)
        .bind(&a.extra_data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_url_hash(&self, hash: &str) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE url_hash = $1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn exists_by_url(&self, url: &str) -> Result<bool> {
        let hash = url_hash(url);
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM articles WHERE url_hash = $1")
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn list(&self, filter: &ArticleFilter, limit: i64, offset: i64) -> Result<Vec<Article>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM articles WHERE TRUE");
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(fetch_status) = &filter.fetch_status {
            qb.push(" AND fetch_status = ").push_bind(fetch_status);
        }
        if let Some(source_id) = filter.source_id {
            qb.push(" AND source_id = ").push_bind(source_id);
        }
        if let Some(since) = filter.since {
            qb.push(" AND COALESCE(publish_time, crawled_at) >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            qb.push(" AND COALESCE(publish_time, crawled_at) <= ").push_bind(until);
        }
        qb.push(" ORDER BY COALESCE(publish_time, crawled_at) DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb.build_query_as::<Article>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Articles in a publish-time window, falling back to crawled_at for
    /// rows without a publish time. Feeds the aggregator and report agent.
    pub async fn list_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source_ids: Option<&[i64]>,
    ) -> Result<Vec<Article>> {
        let rows = match source_ids {
            Some(ids) if !ids.is_empty() => {
                sqlx::query_as::<_, Article>(
                    r#"
                    SELECT * FROM articles
                    WHERE (publish_time >= $1 OR (publish_time IS NULL AND crawled_at >= $1))
                      AND COALESCE(publish_time, crawled_at) <= $2
                      AND source_id = ANY($3)
                      AND status != 'low_quality'
                    ORDER BY COALESCE(publish_time, crawled_at) DESC
                    "#,
                )
                .bind(start)
                .bind(end)
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
            _ => {
                sqlx::query_as::<_, Article>(
                    r#"
                    SELECT * FROM articles
                    WHERE (publish_time >= $1 OR (publish_time IS NULL AND crawled_at >= $1))
                      AND COALESCE(publish_time, crawled_at) <= $2
                      AND status != 'low_quality'
                    ORDER BY COALESCE(publish_time, crawled_at) DESC
                    "#,
                )
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn update_status(&self, id: i64, status: ArticleStatus) -> Result<u64> {
        let result =
            sqlx::query("UPDATE articles SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn record_fetch_error(&self, id: i64, error: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET fetch_status = 'failed', error_msg = $2,
                retry_count = retry_count + 1, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Ids of articles that fail the quality gate: short content, missing
    /// publish time, or a publish time outside the plausible window.
    pub async fn find_low_quality(
        &self,
        min_time: DateTime<Utc>,
        max_time: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM articles
            WHERE status != 'low_quality'
              AND (
                    LENGTH(COALESCE(content, '')) < 50
                 OR publish_time IS NULL
                 OR publish_time < $1
                 OR publish_time > $2
              )
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

    pub async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_many(&self, ids: &[i64]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_source(&self, source_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE source_id = $1")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
