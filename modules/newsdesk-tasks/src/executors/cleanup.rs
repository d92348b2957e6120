use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use newsdesk_common::{ArticleStatus, PendingStatus, Result, TaskEventType};
use newsdesk_crawler::discovery::plausible_publish_window;

use crate::executors::ExecutorDeps;
use crate::manager::{TaskContext, TaskExecutor};

const ARTICLE_BATCH: i64 = 10_000;
const PENDING_BATCH: i64 = 50_000;

/// Demotes junk: articles with trivial content or implausible publish
/// times, and pending rows on the same time criteria. Reruns are
/// retroactive over the whole table (batch-bounded).
pub struct CleanupLowQualityExecutor {
    deps: Arc<ExecutorDeps>,
}

impl CleanupLowQualityExecutor {
    pub fn new(deps: Arc<ExecutorDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskExecutor for CleanupLowQualityExecutor {
    async fn execute(
        &self,
        ctx: &TaskContext,
        _params: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let (min_time, max_time) = plausible_publish_window(Utc::now());

        ctx.progress(10, 100, Some("Scanning articles"), None).await?;

        let article_ids = self
            .deps
            .store
            .articles
            .find_low_quality(min_time, max_time, ARTICLE_BATCH)
            .await?;
        let mut articles_marked = 0u64;
        for id in &article_ids {
            if ctx.is_cancelled() {
                break;
            }
            self.deps
                .store
                .articles
                .update_status(*id, ArticleStatus::LowQuality)
                .await?;
            articles_marked += 1;
        }
        info!(articles_marked, "articles demoted to low quality");

        ctx.progress(
            60,
            100,
            Some("Scanning pending URLs"),
            Some(serde_json::json!({ "articles_marked": articles_marked })),
        )
        .await?;

        let pending_ids = self
            .deps
            .store
            .pending
            .find_low_quality(min_time, max_time, PENDING_BATCH)
            .await?;
        let mut pending_marked = 0u64;
        for id in &pending_ids {
            if ctx.is_cancelled() {
                break;
            }
            self.deps
                .store
                .pending
                .update_status(*id, PendingStatus::LowQuality)
                .await?;
            pending_marked += 1;
        }
        info!(pending_marked, "pending rows demoted to low quality");

        ctx.progress(100, 100, Some("Cleanup complete"), None).await?;
        ctx.event(
            TaskEventType::Info,
            Some(serde_json::json!({
                "message": format!(
                    "Marked {articles_marked} articles and {pending_marked} pending rows as low quality"
                ),
            })),
        )
        .await?;

        Ok(serde_json::json!({
            "articles_marked": articles_marked,
            "pending_marked": pending_marked,
            "total_marked": articles_marked + pending_marked,
        }))
    }
}
