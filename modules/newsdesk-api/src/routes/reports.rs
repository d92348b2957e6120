use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Deserialize;

use newsdesk_agent::{ReportEvent, TemplateManager};
use newsdesk_common::{AgentStage, NewsdeskError, ReportStatus};
use newsdesk_store::{InsertReport, Report};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct GenerateReport {
    pub title: String,
    pub time_range_start: DateTime<Utc>,
    pub time_range_end: DateTime<Utc>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default = "default_max_events")]
    pub max_events: i32,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_events() -> i32 {
    20
}

/// Create a report row and start generation in the background. Clients
/// follow progress on the stream endpoint.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateReport>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.time_range_end <= body.time_range_start {
        return Err(ApiError(NewsdeskError::Validation(
            "time_range_end must be after time_range_start".to_string(),
        )));
    }
    if let Some(template_id) = &body.template_id {
        if TemplateManager::new().get(template_id).is_none() {
            return Err(ApiError(NewsdeskError::Validation(format!(
                "unknown template: {template_id}"
            ))));
        }
    }

    let report = state
        .store
        .reports
        .insert(InsertReport {
            title: body.title,
            time_range_start: body.time_range_start,
            time_range_end: body.time_range_end,
            template_id: body.template_id,
            language: body.language,
            custom_prompt: body.custom_prompt,
            max_events: body.max_events.clamp(1, 100),
        })
        .await?;

    let agent = state.report_agent.clone();
    let hub = state.report_hub.clone();
    let report_id = report.id;
    tokio::spawn(async move {
        agent.generate(report_id, &hub).await;
        hub.remove(report_id).await;
    });

    Ok(Json(serde_json::json!({ "id": report.id, "status": report.status })))
}

#[derive(Deserialize)]
pub struct ListQuery {
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
    let reports = state.store.reports.list(query.limit, query.offset).await?;
    let items: Vec<serde_json::Value> = reports.iter().map(summary_view).collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let report = state
        .store
        .reports
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("report {id}")))?;
    Ok(Json(detail_view(&report)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.store.reports.delete(id).await?;
    if deleted == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("report {id}"))));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn references(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let references = state.store.reports.references(id).await?;
    let items: Vec<serde_json::Value> = references
        .iter()
        .map(|r| {
            serde_json::json!({
                "article_id": r.article_id,
                "citation_index": r.citation_index,
                "snippet": r.snippet,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "items": items, "count": items.len() })))
}

pub async fn templates() -> Json<serde_json::Value> {
    let manager = TemplateManager::new();
    let items: Vec<serde_json::Value> = manager
        .list()
        .iter()
        .map(|t| serde_json::to_value(t).unwrap_or_default())
        .collect();
    Json(serde_json::json!({ "items": items }))
}

/// SSE stream for a report: AgentState frames plus `section_stream` token
/// chunks. For an already-finished report a single terminal frame is sent.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    let report = state
        .store
        .reports
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("report {id}")))?;

    let mut live = state.report_hub.subscribe(id).await;
    let terminal_snapshot = terminal_frame(&report);

    let stream = async_stream::stream! {
        if let Some((event_name, payload)) = terminal_snapshot {
            yield Ok(Event::default().event(event_name).data(payload.to_string()));
            return;
        }

        while let Ok(event) = live.recv().await {
            match &event {
                ReportEvent::State(agent_state) => {
                    let name = match agent_state.stage {
                        AgentStage::Completed => "completed",
                        AgentStage::Failed => "failed",
                        _ => "state",
                    };
                    let payload = serde_json::to_value(agent_state).unwrap_or_default();
                    let terminal = matches!(
                        agent_state.stage,
                        AgentStage::Completed | AgentStage::Failed
                    );
                    yield Ok(Event::default().event(name).data(payload.to_string()));
                    if terminal {
                        return;
                    }
                }
                ReportEvent::SectionStream { .. } => {
                    let payload = serde_json::to_value(&event).unwrap_or_default();
                    yield Ok(Event::default().event("section_stream").data(payload.to_string()));
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// For reports already out of the generating state, the single frame to
/// send a late subscriber.
fn terminal_frame(report: &Report) -> Option<(&'static str, serde_json::Value)> {
    match ReportStatus::from_str(&report.status) {
        Ok(ReportStatus::Completed) => Some((
            "completed",
            serde_json::json!({
                "stage": "completed",
                "progress": 100,
                "message": "Report generation complete",
                "data": {
                    "content": report.content,
                    "sections": report.sections,
                    "statistics": report.statistics,
                },
            }),
        )),
        Ok(ReportStatus::Failed) => Some((
            "failed",
            serde_json::json!({
                "stage": "failed",
                "progress": report.progress,
                "message": report.error.clone().unwrap_or_else(|| "generation failed".to_string()),
            }),
        )),
        _ => None,
    }
}

fn summary_view(report: &Report) -> serde_json::Value {
    serde_json::json!({
        "id": report.id,
        "title": report.title,
        "time_range_start": report.time_range_start,
        "time_range_end": report.time_range_end,
        "template_id": report.template_id,
        "language": report.language,
        "status": report.status,
        "agent_stage": report.agent_stage,
        "progress": report.progress,
        "created_at": report.created_at,
        "completed_at": report.completed_at,
    })
}

fn detail_view(report: &Report) -> serde_json::Value {
    serde_json::json!({
        "id": report.id,
        "title": report.title,
        "time_range_start": report.time_range_start,
        "time_range_end": report.time_range_end,
        "template_id": report.template_id,
        "language": report.language,
        "custom_prompt": report.custom_prompt,
        "max_events": report.max_events,
        "status": report.status,
        "agent_stage": report.agent_stage,
        "progress": report.progress,
        "content": report.content,
        "sections": report.sections,
        "statistics": report.statistics,
        "error": report.error,
        "created_at": report.created_at,
        "completed_at": report.completed_at,
    })
}
