use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use newsdesk_common::{NewsdeskError, TimeRange};
use newsdesk_store::{InsertKeyword, SearchKeyword};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateKeyword {
    pub keyword: String,
    #[serde(default = "default_time_range")]
    pub time_range: String,
    #[serde(default = "default_max_results")]
    pub max_results: i32,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_time_range() -> String {
    "w".to_string()
}

fn default_max_results() -> i32 {
    10
}

fn default_region() -> String {
    "us-en".to_string()
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateKeyword>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.keyword.trim().is_empty() {
        return Err(ApiError(NewsdeskError::Validation("keyword must not be empty".to_string())));
    }
    TimeRange::from_str(&body.time_range).map_err(NewsdeskError::Validation)?;

    let keyword = state
        .store
        .keywords
        .insert(InsertKeyword {
            keyword: body.keyword.trim().to_string(),
            time_range: body.time_range,
            max_results: body.max_results.clamp(1, 50),
            region: body.region,
        })
        .await?;
    Ok(Json(keyword_view(&keyword)))
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let keywords = state.store.keywords.list(500).await?;
    let items: Vec<serde_json::Value> = keywords.iter().map(keyword_view).collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

/// Active keywords only, for the scheduler and external pollers.
pub async fn list_active(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let keywords = state.store.keywords.list_active().await?;
    let items: Vec<serde_json::Value> = keywords.iter().map(keyword_view).collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let keyword = state
        .store
        .keywords
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("keyword {id}")))?;
    Ok(Json(keyword_view(&keyword)))
}

#[derive(Deserialize)]
pub struct UpdateKeyword {
    #[serde(default)]
    pub is_active: Option<bool>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateKeyword>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(is_active) = body.is_active {
        let updated = state.store.keywords.set_active(id, is_active).await?;
        if updated == 0 {
            return Err(ApiError(NewsdeskError::NotFound(format!("keyword {id}"))));
        }
    }
    Ok(Json(serde_json::json!({ "updated": true })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.store.keywords.delete(id).await?;
    if deleted == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("keyword {id}"))));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Run this keyword's search synchronously and import the results.
pub async fn run_search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let keyword = state
        .store
        .keywords
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("keyword {id}")))?;

    let task = state
        .tasks
        .create(
            "keyword_search",
            &format!("Search: {}", keyword.keyword),
            Some(serde_json::json!({ "keyword_id": id })),
        )
        .await?;
    state.tasks.run(task.id).await?;

    let finished = state.store.tasks.get(task.id).await?;
    Ok(Json(serde_json::json!({
        "task_id": task.id,
        "result": finished.and_then(|t| t.result),
    })))
}

fn keyword_view(keyword: &SearchKeyword) -> serde_json::Value {
    serde_json::json!({
        "id": keyword.id,
        "keyword": keyword.keyword,
        "time_range": keyword.time_range,
        "max_results": keyword.max_results,
        "region": keyword.region,
        "is_active": keyword.is_active,
        "search_count": keyword.search_count,
        "last_searched_at": keyword.last_searched_at,
        "created_at": keyword.created_at,
    })
}
