use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use newsdesk_common::{NewsdeskError, PendingStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn list_for_source(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let sitemaps = state.store.sitemaps.list_by_source(source_id).await?;
    let items: Vec<serde_json::Value> = sitemaps
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.id,
                "source_id": s.source_id,
                "url": s.url,
                "last_fetched": s.last_fetched,
                "fetch_status": s.fetch_status,
                "article_count": s.article_count,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

#[derive(Deserialize)]
pub struct AddSitemap {
    pub url: String,
}

pub async fn add(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<i64>,
    Json(body): Json<AddSitemap>,
) -> ApiResult<Json<serde_json::Value>> {
    if !body.url.starts_with("http://") && !body.url.starts_with("https://") {
        return Err(ApiError(NewsdeskError::Validation(
            "sitemap url must be absolute".to_string(),
        )));
    }
    let source = state
        .store
        .sources
        .get(source_id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("source {source_id}")))?;
    let sitemap = state.store.sitemaps.upsert(source.id, &body.url).await?;
    Ok(Json(serde_json::json!({ "id": sitemap.id, "url": sitemap.url })))
}

/// Re-parse every sitemap of a source and import fresh URLs.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let summary = state.deps.discovery.sync_source_sitemaps(source_id).await?;
    Ok(Json(serde_json::to_value(&summary).unwrap_or_default()))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.store.sitemaps.delete(id).await?;
    if deleted == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("sitemap {id}"))));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Deserialize)]
pub struct PendingQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn pending_for_source(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<i64>,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let status = query
        .status
        .as_deref()
        .map(PendingStatus::from_str)
        .transpose()
        .map_err(NewsdeskError::Validation)?;

    let rows = state
        .store
        .pending
        .list_by_source(source_id, status, query.limit, query.offset)
        .await?;
    let items: Vec<serde_json::Value> = rows
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "source_id": p.source_id,
                "sitemap_id": p.sitemap_id,
                "url": p.url,
                "title": p.title,
                "publish_time": p.publish_time,
                "status": p.status,
                "created_at": p.created_at,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

pub async fn pending_counts(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let counts = state.store.pending.counts_for_source(source_id).await?;
    let by_status: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|c| (c.status, serde_json::json!(c.count)))
        .collect();
    Ok(Json(serde_json::Value::Object(by_status)))
}
