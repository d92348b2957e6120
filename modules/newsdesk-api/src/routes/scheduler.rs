use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let status = state.scheduler.status().await;
    Ok(Json(serde_json::to_value(&status).unwrap_or_default()))
}

/// Force one immediate tick; returns how many schedules were dispatched.
pub async fn trigger(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let dispatched = state.scheduler.tick().await?;
    Ok(Json(serde_json::json!({ "dispatched": dispatched })))
}
