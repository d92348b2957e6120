use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use newsdesk_common::{url_hash, PendingStatus, Result};
use newsdesk_crawler::politeness_pause;
use newsdesk_store::InsertArticle;

use crate::executors::ExecutorDeps;
use crate::manager::{TaskContext, TaskExecutor};

const DEFAULT_LIMIT_PER_SOURCE: i64 = 10;
/// Scrapes with less content than this mark the pending row failed.
const MIN_CONTENT_LENGTH: usize = 50;

/// Drains the pending queue: for every enabled source, fetches up to N
/// pending URLs (freshest first) and turns them into articles.
pub struct CrawlPendingExecutor {
    deps: Arc<ExecutorDeps>,
}

impl CrawlPendingExecutor {
    pub fn new(deps: Arc<ExecutorDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskExecutor for CrawlPendingExecutor {
    async fn execute(
        &self,
        ctx: &TaskContext,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        // Manual runs say limit_per_source; schedule configs say batch_size.
        let limit = params
            .get("limit_per_source")
            .or_else(|| params.get("batch_size"))
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_LIMIT_PER_SOURCE);

        let sources = self.deps.store.sources.list(true, 1000).await?;
        let total_sources = sources.len() as i32;

        let mut success = 0u64;
        let mut failed = 0u64;
        let mut skipped = 0u64;
        let mut per_source = Vec::new();

        for (index, source) in sources.iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }

            ctx.progress(
                index as i32,
                total_sources,
                Some(&format!("Crawling source: {}", source.site_name)),
                None,
            )
            .await?;

            let pending = self.deps.store.pending.next_for_source(source.id, limit).await?;
            if pending.is_empty() {
                skipped += 1;
                continue;
            }

            let config = source.parser_config();
            let delay = source.crawl_delay_seconds;
            let mut source_success = 0u64;
            let mut source_failed = 0u64;
            let mut cancelled_mid_source = false;

            for row in &pending {
                if ctx.is_cancelled() {
                    cancelled_mid_source = true;
                    break;
                }

                // Already fetched through another path: close the row out.
                if self
                    .deps
                    .store
                    .articles
                    .get_by_url_hash(&url_hash(&row.url))
                    .await?
                    .is_some()
                {
                    self.deps
                        .store
                        .pending
                        .update_status(row.id, PendingStatus::Completed)
                        .await?;
                    continue;
                }

                self.deps
                    .store
                    .pending
                    .update_status(row.id, PendingStatus::Crawling)
                    .await?;

                let scraped = self.deps.scraper.scrape(&row.url, &config, source.id).await;

                let content_len = scraped.content.as_deref().map(str::len).unwrap_or(0);
                if !scraped.is_ok() || content_len < MIN_CONTENT_LENGTH {
                    if let Some(error) = &scraped.error {
                        warn!(url = %row.url, error, "crawl failed");
                    } else {
                        warn!(url = %row.url, content_len, "content too short");
                    }
                    self.deps
                        .store
                        .pending
                        .update_status(row.id, PendingStatus::Failed)
                        .await?;
                    source_failed += 1;
                } else {
                    let insert = InsertArticle::from_scraped(
                        &scraped,
                        source.id,
                        row.title.as_deref(),
                        row.publish_time,
                    );
                    match self.deps.store.articles.insert(insert).await {
                        Ok(article) => {
                            info!(article_id = article.id, url = %row.url, "article created");
                            self.deps
                                .store
                                .pending
                                .update_status(row.id, PendingStatus::Completed)
                                .await?;
                            source_success += 1;
                        }
                        Err(e) => {
                            warn!(url = %row.url, error = %e, "article insert failed");
                            self.deps
                                .store
                                .pending
                                .update_status(row.id, PendingStatus::Failed)
                                .await?;
                            source_failed += 1;
                        }
                    }
                }

                politeness_pause(delay, self.deps.default_delay_secs).await;
            }

            success += source_success;
            failed += source_failed;
            self.deps
                .store
                .sources
                .record_crawl(source.id, source_success as i32, source_failed as i32)
                .await?;

            per_source.push(serde_json::json!({
                "source_id": source.id,
                "site_name": source.site_name,
                "success": source_success,
                "failed": source_failed,
            }));

            ctx.progress(
                (index + 1) as i32,
                total_sources,
                Some(&format!("Finished source: {}", source.site_name)),
                Some(serde_json::json!({
                    "success": success,
                    "failed": failed,
                    "skipped": skipped,
                })),
            )
            .await?;

            if cancelled_mid_source {
                break;
            }
        }

        Ok(serde_json::json!({
            "success": success,
            "failed": failed,
            "skipped": skipped,
            "sources": per_source,
        }))
    }
}
