use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::Deserialize;

use newsdesk_common::{NewsdeskError, TaskStatus};
use newsdesk_store::Task;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateTask {
    pub task_type: String,
    pub title: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// Create a task and start it in the background.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTask>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state
        .tasks
        .create(&body.task_type, &body.title, body.params)
        .await?;
    state.tasks.spawn(task.id);
    Ok(Json(task_view(&task)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
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
    let status = query
        .status
        .as_deref()
        .map(TaskStatus::from_str)
        .transpose()
        .map_err(NewsdeskError::Validation)?;
    let tasks = state
        .store
        .tasks
        .list(status, query.task_type.as_deref(), query.limit, query.offset)
        .await?;
    let items: Vec<serde_json::Value> = tasks.iter().map(task_view).collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state
        .store
        .tasks
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("task {id}")))?;
    Ok(Json(task_view(&task)))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state
        .store
        .tasks
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("task {id}")))?;
    if TaskStatus::from_str(&task.status)
        .map(|s| s.is_terminal())
        .unwrap_or(false)
    {
        return Err(ApiError(NewsdeskError::Conflict(format!(
            "task {id} already finished"
        ))));
    }
    let requested = state.tasks.cancel(id).await?;
    Ok(Json(serde_json::json!({ "cancellation_requested": requested })))
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let events = state.store.tasks.events(id, 500).await?;
    let items: Vec<serde_json::Value> = events
        .iter()
        .map(|e| {
            serde_json::json!({
                "id": e.id,
                "event_type": e.event_type,
                "event_data": e.event_data,
                "created_at": e.created_at,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

/// SSE stream for a task: replays the persisted event log, then tails the
/// live broadcast until a terminal event arrives.
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    let task = state
        .store
        .tasks
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("task {id}")))?;

    // Subscribe before the replay so nothing falls in the gap.
    let mut live = state.tasks.hub().subscribe(id).await;
    let persisted = state.store.tasks.events(id, 1000).await?;
    let already_terminal = TaskStatus::from_str(&task.status)
        .map(|s| s.is_terminal())
        .unwrap_or(false);

    let stream = async_stream::stream! {
        let mut saw_terminal = false;

        for event in &persisted {
            if is_terminal_event(&event.event_type) {
                saw_terminal = true;
            }
            yield Ok(sse_event(
                &event.event_type,
                &serde_json::json!({
                    "task_id": id,
                    "event_type": event.event_type,
                    "event_data": event.event_data,
                    "created_at": event.created_at,
                }),
            ));
        }

        if saw_terminal || already_terminal {
            return;
        }

        while let Ok(event) = live.recv().await {
            let terminal = is_terminal_event(&event.event_type);
            yield Ok(sse_event(
                &event.event_type,
                &serde_json::json!({
                    "task_id": event.task_id,
                    "event_type": event.event_type,
                    "event_data": event.data,
                    "created_at": event.created_at,
                }),
            ));
            if terminal {
                return;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn is_terminal_event(event_type: &str) -> bool {
    matches!(event_type, "completed" | "failed" | "cancelled")
}

fn sse_event(event_type: &str, payload: &serde_json::Value) -> Event {
    Event::default()
        .event(event_type)
        .data(payload.to_string())
}

fn task_view(task: &Task) -> serde_json::Value {
    serde_json::json!({
        "id": task.id,
        "task_type": task.task_type,
        "status": task.status,
        "title": task.title,
        "params": task.params,
        "result": task.result,
        "progress_current": task.progress_current,
        "progress_total": task.progress_total,
        "error_message": task.error_message,
        "started_at": task.started_at,
        "completed_at": task.completed_at,
        "created_at": task.created_at,
        "updated_at": task.updated_at,
    })
}
