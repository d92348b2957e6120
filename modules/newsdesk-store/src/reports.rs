use chrono::{DateTime, Utc};
use newsdesk_common::{AgentStage, ReportStatus, Result};
use sqlx::PgPool;

/// A row from the reports table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub time_range_start: DateTime<Utc>,
    pub time_range_end: DateTime<Utc>,
    pub template_id: Option<String>,
    pub language: String,
    pub custom_prompt: Option<String>,
    pub max_events: i32,
    pub status: String,
    pub agent_stage: String,
    pub progress: i32,
    pub content: Option<String>,
    pub sections: Option<serde_json::Value>,
    pub statistics: Option<serde_json::Value>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the report_references table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportReference {
    pub id: i64,
    pub report_id: i64,
    pub article_id: i64,
    pub citation_index: i32,
    pub snippet: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a report.
#[derive(Debug, Clone)]
pub struct InsertReport {
    pub title: String,
    pub time_range_start: DateTime<Utc>,
    pub time_range_end: DateTime<Utc>,
    pub template_id: Option<String>,
    pub language: String,
    pub custom_prompt: Option<String>,
    pub max_events: i32,
}

#[derive(Clone)]
pub struct ReportRepo {
    pool: PgPool,
}

impl ReportRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, r: InsertReport) -> Result<Report> {
        let row = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports
                (title, time_range_start, time_range_end, template_id, language,
                 custom_prompt, max_events)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&r.title)
        .bind(r.time_range_start)
        .bind(r.time_range_end)
        .bind(&r.template_id)
        .bind(&r.language)
        .bind(&r.custom_prompt)
        .bind(r.max_events)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Report>> {
        let rows = sqlx::query_as::<_, Report>(
            "SELECT * FROM reports ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Advance the agent stage/progress shown to pollers.
    pub async fn update_stage(&self, id: i64, stage: AgentStage, progress: i32) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE reports SET agent_stage = $2, progress = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(stage.to_string())
        .bind(progress)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn complete(
        &self,
        id: i64,
        content: &str,
        sections: &serde_json::Value,
        statistics: &serde_json::Value,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = $2, agent_stage = $3, progress = 100,
                content = $4, sections = $5, statistics = $6,
                completed_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ReportStatus::Completed.to_string())
        .bind(AgentStage::Completed.to_string())
        .bind(content)
        .bind(sections)
        .bind(statistics)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn fail(&self, id: i64, error: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = $2, agent_stage = $3, error = $4,
                completed_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ReportStatus::Failed.to_string())
        .bind(AgentStage::Failed.to_string())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --- references ---

    pub async fn add_reference(
        &self,
        report_id: i64,
        article_id: i64,
        citation_index: i32,
        snippet: Option<&str>,
    ) -> Result<ReportReference> {
        let row = sqlx::query_as::<_, ReportReference>(
            r#"
            INSERT INTO report_references (report_id, article_id, citation_index, snippet)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(report_id)
        .bind(article_id)
        .bind(citation_index)
        .bind(snippet)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn references(&self, report_id: i64) -> Result<Vec<ReportReference>> {
        let rows = sqlx::query_as::<_, ReportReference>(
            r#"
            SELECT * FROM report_references
            WHERE report_id = $1
            ORDER BY citation_index ASC
            "#,
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
