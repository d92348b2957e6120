use chrono::{DateTime, Utc};
use newsdesk_common::{Result, TaskEventType, TaskStatus};
use sqlx::PgPool;

/// A row from the tasks table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub task_type: String,
    pub status: String,
    pub title: String,
    pub params: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub progress_current: i32,
    pub progress_total: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the task_events table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskEvent {
    pub id: i64,
    pub task_id: i64,
    pub event_type: String,
    pub event_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TaskRepo {
    pool: PgPool,
}

impl TaskRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        task_type: &str,
        title: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Task> {
        let row = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (task_type, title, params)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(task_type)
        .bind(title)
        .bind(&params)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        task_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM tasks WHERE TRUE");
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(task_type) = task_type {
            qb.push(" AND task_type = ").push_bind(task_type.to_string());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb.build_query_as::<Task>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Move a task into a new status. Terminal statuses stamp completed_at;
    /// running stamps started_at.
    pub async fn update_status(
        &self,
        id: i64,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                error_message = COALESCE($3, error_message),
                started_at = CASE WHEN $2 = 'running' THEN now() ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed', 'cancelled')
                                    THEN now() ELSE completed_at END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_progress(
        &self,
        id: i64,
        current: i32,
        total: i32,
        intermediate_result: Option<&serde_json::Value>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET progress_current = $2, progress_total = $3,
                result = COALESCE($4, result), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(current)
        .bind(total)
        .bind(intermediate_result)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_result(&self, id: i64, result_value: &serde_json::Value) -> Result<u64> {
        let result =
            sqlx::query("UPDATE tasks SET result = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(result_value)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Append an event to the task's ordered log.
    pub async fn add_event(
        &self,
        task_id: i64,
        event_type: TaskEventType,
        event_data: Option<serde_json::Value>,
    ) -> Result<TaskEvent> {
        let row = sqlx::query_as::<_, TaskEvent>(
            r#"
            INSERT INTO task_events (task_id, event_type, event_data)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(event_type.to_string())
        .bind(&event_data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn events(&self, task_id: i64, limit: i64) -> Result<Vec<TaskEvent>> {
        let rows = sqlx::query_as::<_, TaskEvent>(
            r#"
            SELECT * FROM task_events
            WHERE task_id = $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_by_status(&self, status: TaskStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = $1")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
