use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use newsdesk_common::{PendingStatus, Result};
use newsdesk_crawler::politeness_pause;
use newsdesk_store::InsertArticle;

use crate::executors::ExecutorDeps;
use crate::manager::{TaskContext, TaskExecutor};

const DEFAULT_LIMIT: i64 = 50;
const MIN_CONTENT_LENGTH: usize = 50;

/// One more attempt for failed pending rows. A second failure abandons the
/// row so it never loops.
pub struct RetryFailedExecutor {
    deps: Arc<ExecutorDeps>,
}

impl RetryFailedExecutor {
    pub fn new(deps: Arc<ExecutorDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskExecutor for RetryFailedExecutor {
    async fn execute(
        &self,
        ctx: &TaskContext,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let limit = params.get("limit").and_then(|v| v.as_i64()).unwrap_or(DEFAULT_LIMIT);

        let failed_rows = self
            .deps
            .store
            .pending
            .list_by_status(PendingStatus::Failed, limit)
            .await?;
        let total = failed_rows.len() as i32;

        let mut success = 0u64;
        let mut abandoned = 0u64;

        for (index, row) in failed_rows.iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }

            let display = row.title.as_deref().unwrap_or(&row.url);
            ctx.progress(index as i32, total, Some(&format!("Retrying: {display}")), None)
                .await?;

            let Some(source) = self.deps.store.sources.get(row.source_id).await? else {
                warn!(pending_id = row.id, source_id = row.source_id, "source gone, abandoning");
                self.deps
                    .store
                    .pending
                    .update_status(row.id, PendingStatus::Abandoned)
                    .await?;
                abandoned += 1;
                continue;
            };

            self.deps
                .store
                .pending
                .update_status(row.id, PendingStatus::Crawling)
                .await?;

            let scraped = self
                .deps
                .scraper
                .scrape(&row.url, &source.parser_config(), source.id)
                .await;

            let content_len = scraped.content.as_deref().map(str::len).unwrap_or(0);
            if scraped.is_ok() && content_len >= MIN_CONTENT_LENGTH {
                let insert = InsertArticle::from_scraped(
                    &scraped,
                    source.id,
                    row.title.as_deref(),
                    row.publish_time,
                );
                match self.deps.store.articles.insert(insert).await {
                    Ok(article) => {
                        info!(article_id = article.id, url = %row.url, "retry succeeded");
                        self.deps
                            .store
                            .pending
                            .update_status(row.id, PendingStatus::Completed)
                            .await?;
                        success += 1;
                    }
                    Err(e) => {
                        warn!(url = %row.url, error = %e, "retry insert failed, abandoning");
                        self.deps
                            .store
                            .pending
                            .update_status(row.id, PendingStatus::Abandoned)
                            .await?;
                        abandoned += 1;
                    }
                }
            } else {
                warn!(url = %row.url, "retry failed, abandoning");
                self.deps
                    .store
                    .pending
                    .update_status(row.id, PendingStatus::Abandoned)
                    .await?;
                abandoned += 1;
            }

            politeness_pause(source.crawl_delay_seconds, self.deps.default_delay_secs).await;

            ctx.progress(
                (index + 1) as i32,
                total,
                None,
                Some(serde_json::json!({
                    "success": success,
                    "abandoned": abandoned,
                    "total": total,
                })),
            )
            .await?;
        }

        Ok(serde_json::json!({
            "success": success,
            "abandoned": abandoned,
            "total": total,
        }))
    }
}
