use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use newsdesk_common::{NewsdeskError, ParserConfig};
use newsdesk_store::InsertSource;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateSource {
    pub site_name: String,
    pub base_url: String,
    #[serde(default)]
    pub parser_config: Option<ParserConfig>,
    #[serde(default)]
    pub crawl_interval_seconds: Option<i32>,
    #[serde(default)]
    pub discovery_method: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub enabled_only: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let sources = state.store.sources.list(query.enabled_only, query.limit).await?;
    Ok(Json(serde_json::json!({ "items": source_views(&sources), "count": sources.len() })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSource>,
) -> ApiResult<Json<serde_json::Value>> {
    if !body.base_url.starts_with("http://") && !body.base_url.starts_with("https://") {
        return Err(ApiError(NewsdeskError::Validation(
            "base_url must start with http:// or https://".to_string(),
        )));
    }
    let interval = body.crawl_interval_seconds.unwrap_or(3600);
    if interval < 60 {
        return Err(ApiError(NewsdeskError::Validation(
            "crawl_interval_seconds must be at least 60".to_string(),
        )));
    }
    let discovery_method = body.discovery_method.unwrap_or_else(|| "sitemap".to_string());
    if !["sitemap", "list", "hybrid"].contains(&discovery_method.as_str()) {
        return Err(ApiError(NewsdeskError::Validation(
            "discovery_method must be one of: sitemap, list, hybrid".to_string(),
        )));
    }

    let source = state
        .store
        .sources
        .insert(InsertSource {
            site_name: body.site_name,
            base_url: body.base_url,
            parser_config: body.parser_config.unwrap_or_default(),
            crawl_interval_seconds: interval,
            discovery_method,
        })
        .await?;
    Ok(Json(source_view(&source)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let source = state
        .store
        .sources
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))?;
    Ok(Json(source_view(&source)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.store.sources.delete(id).await?;
    if deleted == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("source {id}"))));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Deserialize)]
pub struct UpdateParserConfig {
    pub parser_config: ParserConfig,
}

pub async fn update_parser_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateParserConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state
        .store
        .sources
        .update_parser_config(id, &body.parser_config)
        .await?;
    if updated == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("source {id}"))));
    }
    Ok(Json(serde_json::json!({ "updated": true })))
}

/// A source may only be enabled once robots has been checked and, for
/// sitemap discovery, at least one sitemap is attached.
pub async fn enable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let source = state
        .store
        .sources
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))?;

    if source.robots_status == "pending" {
        return Err(ApiError(NewsdeskError::Validation(
            "robots.txt has not been checked yet; initialize the source first".to_string(),
        )));
    }
    if source.discovery_method == "sitemap" {
        let sitemaps = state.store.sitemaps.list_by_source(id).await?;
        if sitemaps.is_empty() {
            return Err(ApiError(NewsdeskError::Validation(
                "no sitemap attached; attach one or change discovery_method".to_string(),
            )));
        }
    }

    state.store.sources.set_enabled(id, true).await?;
    Ok(Json(serde_json::json!({ "enabled": true })))
}

pub async fn disable(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = state.store.sources.set_enabled(id, false).await?;
    if updated == 0 {
        return Err(ApiError(NewsdeskError::NotFound(format!("source {id}"))));
    }
    Ok(Json(serde_json::json!({ "enabled": false })))
}

/// Robots check plus sitemap discovery for a source.
pub async fn initialize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.deps.discovery.initialize_source(id).await?;
    Ok(Json(serde_json::to_value(&outcome).unwrap_or_default()))
}

#[derive(Deserialize)]
pub struct ParserDebug {
    pub url: String,
}

/// Scrape one URL with the source's parser config and return the raw
/// extraction, for tuning selectors.
pub async fn parser_debug(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ParserDebug>,
) -> ApiResult<Json<serde_json::Value>> {
    let source = state
        .store
        .sources
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))?;
    let scraped = state
        .deps
        .scraper
        .scrape(&body.url, &source.parser_config(), source.id)
        .await;
    Ok(Json(serde_json::to_value(&scraped).unwrap_or_default()))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let source = state
        .store
        .sources
        .get(id)
        .await?
        .ok_or_else(|| NewsdeskError::NotFound(format!("source {id}")))?;
    let article_count = state.store.articles.count_by_source(id).await?;
    let pending_counts = state.store.pending.counts_for_source(id).await?;

    let pending: serde_json::Map<String, serde_json::Value> = pending_counts
        .into_iter()
        .map(|c| (c.status, serde_json::json!(c.count)))
        .collect();

    Ok(Json(serde_json::json!({
        "source_id": source.id,
        "site_name": source.site_name,
        "success_count": source.success_count,
        "failure_count": source.failure_count,
        "last_crawled_at": source.last_crawled_at,
        "article_count": article_count,
        "pending": pending,
    })))
}

fn source_view(source: &newsdesk_store::CrawlSource) -> serde_json::Value {
    serde_json::json!({
        "id": source.id,
        "site_name": source.site_name,
        "base_url": source.base_url,
        "parser_config": source.parser_config,
        "enabled": source.enabled,
        "crawl_interval_seconds": source.crawl_interval_seconds,
        "robots_status": source.robots_status,
        "crawl_delay_seconds": source.crawl_delay_seconds,
        "sitemap_url": source.sitemap_url,
        "discovery_method": source.discovery_method,
        "success_count": source.success_count,
        "failure_count": source.failure_count,
        "last_crawled_at": source.last_crawled_at,
        "created_at": source.created_at,
        "updated_at": source.updated_at,
    })
}

fn source_views(sources: &[newsdesk_store::CrawlSource]) -> Vec<serde_json::Value> {
    sources.iter().map(source_view).collect()
}
