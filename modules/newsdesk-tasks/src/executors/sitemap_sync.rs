use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use newsdesk_common::{Result, TaskEventType};

use crate::executors::ExecutorDeps;
use crate::manager::{TaskContext, TaskExecutor};

/// Syncs sitemaps into the pending queue. With `source_id` in params only
/// that source is synced; otherwise every enabled source is.
pub struct SitemapSyncExecutor {
    deps: Arc<ExecutorDeps>,
}

impl SitemapSyncExecutor {
    pub fn new(deps: Arc<ExecutorDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskExecutor for SitemapSyncExecutor {
    async fn execute(
        &self,
        ctx: &TaskContext,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let source_ids: Vec<i64> = match params.get("source_id").and_then(|v| v.as_i64()) {
            Some(id) => vec![id],
            None => self
                .deps
                .store
                .sources
                .list(true, 1000)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect(),
        };

        ctx.event(
            TaskEventType::Info,
            Some(serde_json::json!({ "message": format!("Syncing {} source(s)", source_ids.len()) })),
        )
        .await?;

        let total = source_ids.len() as i32;
        let mut sitemaps_processed = 0usize;
        let mut urls_found = 0usize;
        let mut urls_imported = 0usize;
        let mut urls_existing = 0usize;
        let mut failures = 0usize;

        for (i, source_id) in source_ids.iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }

            match self.deps.discovery.sync_source_sitemaps(*source_id).await {
                Ok(summary) => {
                    sitemaps_processed += summary.sitemaps_processed;
                    urls_found += summary.urls_found;
                    urls_imported += summary.urls_imported;
                    urls_existing += summary.urls_existing;
                }
                Err(e) => {
                    warn!(source_id, error = %e, "sitemap sync failed for source");
                    failures += 1;
                }
            }

            ctx.progress(
                (i + 1) as i32,
                total,
                Some(&format!("Synced source {source_id}")),
                Some(serde_json::json!({
                    "urls_found": urls_found,
                    "urls_imported": urls_imported,
                })),
            )
            .await?;
        }

        Ok(serde_json::json!({
            "sources": source_ids.len(),
            "sitemaps_processed": sitemaps_processed,
            "urls_found": urls_found,
            "urls_imported": urls_imported,
            "urls_existing": urls_existing,
            "failures": failures,
        }))
    }
}
