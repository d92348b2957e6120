use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use newsdesk_common::{NewsdeskError, ScheduleStatus, ScheduleType};
use newsdesk_store::{InsertSchedule, Schedule};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateSchedule {
    pub name: String,
    pub schedule_type: String,
    pub interval_minutes: i32,
    #[serde(default)]
    pub max_executions: Option<i32>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSchedule>,
) -> ApiResult<Json<serde_json::Value>> {
    ScheduleType::from_str(&body.schedule_type).map_err(NewsdeskError::Validation)?;
    if body.interval_minutes < 1 {
        return Err(ApiError(NewsdeskError::Validation(
            "interval_minutes must be at least 1".to_string(),
        )));
    }

    let schedule = state
        .store
        .schedules
        .insert(InsertSchedule {
            name: body.name,
            schedule_type: body.schedule_type,
            interval_minutes: body.interval_minutes,
            max_executions: body.max_executions,
            config: body.config,
        })
        .await?;
    Ok(Json(schedule_view(&schedule)))
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let schedules = state.store.schedules.list(500).await?;
    let items: Vec<serde_json::Value> = schedules.iter().map(schedule_view).collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let schedule = state
        .store
        .schedules
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("schedule {id}")))?;
    Ok(Json(schedule_view(&schedule)))
}

#[derive(Deserialize)]
pub struct UpdateSchedule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub interval_minutes: Option<i32>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSchedule>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(interval) = body.interval_minutes {
        if interval < 1 {
            return Err(ApiError(NewsdeskError::Validation(
                "interval_minutes must be at least 1".to_string(),
            )));
        }
    }
    let updated = state
        .store
        .schedules
        .update_config(id, body.name.as_deref(), body.interval_minutes, body.config.as_ref())
        .await?;
    if updated == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("schedule {id}"))));
    }
    Ok(Json(serde_json::json!({ "updated": true })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.store.schedules.delete(id).await?;
    if deleted == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("schedule {id}"))));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    set_status(&state, id, ScheduleStatus::Paused).await
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    set_status(&state, id, ScheduleStatus::Active).await
}

/// Run the schedule synchronously right now.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.scheduler.execute_now(id).await?;
    Ok(Json(serde_json::json!({ "executed": true })))
}

async fn set_status(
    state: &Arc<AppState>,
    id: i64,
    status: ScheduleStatus,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state.store.schedules.set_status(id, status).await?;
    if updated == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("schedule {id}"))));
    }
    Ok(Json(serde_json::json!({ "status": status.to_string() })))
}

fn schedule_view(schedule: &Schedule) -> serde_json::Value {
    serde_json::json!({
        "id": schedule.id,
        "name": schedule.name,
        "schedule_type": schedule.schedule_type,
        "status": schedule.status,
        "interval_minutes": schedule.interval_minutes,
        "max_executions": schedule.max_executions,
        "execution_count": schedule.execution_count,
        "config": schedule.config,
        "last_run_at": schedule.last_run_at,
        "next_run_at": schedule.next_run_at,
        "last_status": schedule.last_status,
        "last_error": schedule.last_error,
        "created_at": schedule.created_at,
    })
}
