use chrono::{DateTime, Duration, Utc};
use newsdesk_common::{Result, ScheduleStatus};
use sqlx::PgPool;

/// A row from the schedules table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Schedule {
    pub id: i64,
    pub name: String,
    pub schedule_type: String,
    pub status: String,
    pub interval_minutes: i32,
    pub max_executions: Option<i32>,
    pub execution_count: i32,
    pub config: Option<serde_json::Value>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a schedule.
#[derive(Debug, Clone)]
pub struct InsertSchedule {
    pub name: String,
    pub schedule_type: String,
    pub interval_minutes: i32,
    pub max_executions: Option<i32>,
    pub config: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct ScheduleRepo {
    pool: PgPool,
}

impl ScheduleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// New schedules become due immediately.
    pub async fn insert(&self, s: InsertSchedule) -> Result<Schedule> {
        let row = sqlx::query_as::<_, Schedule>(
            r#"
            INSERT INTO schedules (name, schedule_type, interval_minutes, max_executions, config, next_run_at)
            VALUES ($1, $2, $3, $4, $5, now())
            RETURNING *
            "#,
        )
        .bind(&s.name)
        .bind(&s.schedule_type)
        .bind(s.interval_minutes)
        .bind(s.max_executions)
        .bind(&s.config)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Schedule>> {
        let row = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<Schedule>> {
        let rows =
            sqlx::query_as::<_, Schedule>("SELECT * FROM schedules ORDER BY id LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    /// Only active schedules whose next_run_at has passed are eligible for
    /// dispatch; soonest first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, Schedule>(
            r#"
            SELECT * FROM schedules
            WHERE status = 'active' AND next_run_at IS NOT NULL AND next_run_at <= $1
            ORDER BY next_run_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_status(&self, id: i64, status: ScheduleStatus) -> Result<u64> {
        let result =
            sqlx::query("UPDATE schedules SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_config(
        &self,
        id: i64,
        name: Option<&str>,
        interval_minutes: Option<i32>,
        config: Option<&serde_json::Value>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET name = COALESCE($2, name),
                interval_minutes = COALESCE($3, interval_minutes),
                config = COALESCE($4, config),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(interval_minutes)
        .bind(config)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Post-run bookkeeping: bump the execution counter, record the outcome,
    /// and push next_run_at forward by the configured interval.
    pub async fn record_run(
        &self,
        id: i64,
        now: DateTime<Utc>,
        interval_minutes: i32,
        last_status: &str,
        last_error: Option<&str>,
    ) -> Result<u64> {
        let next_run = now + Duration::minutes(interval_minutes as i64);
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET execution_count = execution_count + 1,
                last_run_at = $2,
                next_run_at = $3,
                last_status = $4,
                last_error = $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(next_run)
        .bind(last_status)
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
