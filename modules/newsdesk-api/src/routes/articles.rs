use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use newsdesk_common::NewsdeskError;
use newsdesk_store::{Article, ArticleFilter};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub fetch_status: Option<String>,
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let filter = ArticleFilter {
        status: query.status,
        fetch_status: query.fetch_status,
        source_id: query.source_id,
        since: query.since,
        until: query.until,
    };
    let articles = state.store.articles.list(&filter, query.limit, query.offset).await?;
    let items: Vec<serde_json::Value> = articles.iter().map(summary_view).collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let article = state
        .store
        .articles
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("article {id}")))?;
    Ok(Json(detail_view(&article)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.store.articles.delete(id).await?;
    if deleted == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("article {id}"))));
    }
    Ok(Json(serde_json::json!({ "deleted": 1 })))
}

#[derive(Deserialize)]
pub struct AggregateRequest {
    #[serde(default = "default_time_range")]
    pub time_range: String,
    #[serde(default)]
    pub source_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    /// When true, an LLM pass narrows the candidates to the top events.
    #[serde(default)]
    pub use_llm: bool,
}

fn default_time_range() -> String {
    "week".to_string()
}

/// Aggregate core events over a time window: score, dedup, rank, and
/// optionally narrow with the LLM selector.
pub async fn aggregate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AggregateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !["week", "month"].contains(&body.time_range.as_str()) {
        return Err(ApiError(NewsdeskError::Validation(
            "time_range must be week or month".to_string(),
        )));
    }

    let aggregator = newsdesk_analysis::DataAggregator::new();
    let selector = body
        .use_llm
        .then(|| newsdesk_agent::LlmEventSelector::new(state.llm.clone()));

    let results = aggregator
        .aggregate_core_events(
            &state.store.articles,
            &body.time_range,
            body.source_ids.as_deref(),
            body.keywords.as_deref(),
            selector
                .as_ref()
                .map(|s| s as &dyn newsdesk_analysis::EventSelector),
        )
        .await?;

    let items: Vec<serde_json::Value> = results.iter().map(summary_view).collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

#[derive(Deserialize)]
pub struct BulkDelete {
    pub ids: Vec<i64>,
}

pub async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkDelete>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.ids.is_empty() {
        return Err(ApiError(NewsdeskError::Validation("ids must not be empty".to_string())));
    }
    let deleted = state.store.articles.delete_many(&body.ids).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

fn summary_view(article: &Article) -> serde_json::Value {
    serde_json::json!({
        "id": article.id,
        "url": article.url,
        "title": article.title,
        "publish_time": article.publish_time,
        "author": article.author,
        "source_id": article.source_id,
        "status": article.status,
        "fetch_status": article.fetch_status,
        "content_length": article.content.as_deref().map(|c| c.chars().count()).unwrap_or(0),
        "crawled_at": article.crawled_at,
    })
}

fn detail_view(article: &Article) -> serde_json::Value {
    serde_json::json!({
        "id": article.id,
        "url_hash": article.url_hash,
        "url": article.url,
        "title": article.title,
        "content": article.content,
        "content_hash": article.content_hash,
        "publish_time": article.publish_time,
        "author": article.author,
        "source_id": article.source_id,
        "status": article.status,
        "fetch_status": article.fetch_status,
        "retry_count": article.retry_count,
        "error_msg": article.error_msg,
        "extra_data": article.extra_data,
        "crawled_at": article.crawled_at,
        "created_at": article.created_at,
        "updated_at": article.updated_at,
    })
}
