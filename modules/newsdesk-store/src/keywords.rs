use chrono::{DateTime, Utc};
use newsdesk_common::Result;
use sqlx::PgPool;

/// A row from the search_keywords table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchKeyword {
    pub id: i64,
    pub keyword: String,
    pub time_range: String,
    pub max_results: i32,
    pub region: String,
    pub is_active: bool,
    pub search_count: i32,
    pub last_searched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a stored search keyword.
#[derive(Debug, Clone)]
pub struct InsertKeyword {
    pub keyword: String,
    pub time_range: String,
    pub max_results: i32,
    pub region: String,
}

#[derive(Clone)]
pub struct KeywordRepo {
    pool: PgPool,
}

impl KeywordRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, k: InsertKeyword) -> Result<SearchKeyword> {
        let row = sqlx::query_as::<_, SearchKeyword>(
            r#"
            INSERT INTO search_keywords (keyword, time_range, max_results, region)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&k.keyword)
        .bind(&k.time_range)
        .bind(k.max_results)
        .bind(&k.region)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<SearchKeyword>> {
        let row = sqlx::query_as::<_, SearchKeyword>("SELECT * FROM search_keywords WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<SearchKeyword>> {
        let rows = sqlx::query_as::<_, SearchKeyword>(
            "SELECT * FROM search_keywords ORDER BY id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_active(&self) -> Result<Vec<SearchKeyword>> {
        let rows = sqlx::query_as::<_, SearchKeyword>(
            "SELECT * FROM search_keywords WHERE is_active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_active(&self, id: i64, is_active: bool) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE search_keywords SET is_active = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn record_search(&self, id: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE search_keywords
            SET search_count = search_count + 1,
                last_searched_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_keywords WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
