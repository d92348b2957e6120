//! The executor catalogue. Every executor reads its `params`, honours the
//! context's cooperation points, and returns a structured result.

mod cleanup;
mod crawl_pending;
mod keyword_search;
mod retry_failed;
mod sitemap_sync;

pub use cleanup::CleanupLowQualityExecutor;
pub use crawl_pending::CrawlPendingExecutor;
pub use keyword_search::KeywordSearchExecutor;
pub use retry_failed::RetryFailedExecutor;
pub use sitemap_sync::SitemapSyncExecutor;

use std::sync::Arc;

use newsdesk_crawler::{SiteDiscovery, UniversalScraper, WebSearchEngine};
use newsdesk_store::Store;

use crate::manager::TaskManager;

/// Shared collaborators for the executor set.
pub struct ExecutorDeps {
    pub store: Store,
    pub scraper: UniversalScraper,
    pub discovery: SiteDiscovery,
    pub search: WebSearchEngine,
    /// Politeness delay between article fetches when robots.txt names none.
    pub default_delay_secs: f64,
}

/// Register the full catalogue on a manager. Schedule-driven types reuse
/// the same executors under their `schedule_*` aliases.
pub async fn register_all(manager: &TaskManager, deps: Arc<ExecutorDeps>) {
    let sitemap_sync = Arc::new(SitemapSyncExecutor::new(deps.clone()));
    let crawl_pending = Arc::new(CrawlPendingExecutor::new(deps.clone()));
    let retry_failed = Arc::new(RetryFailedExecutor::new(deps.clone()));
    let cleanup = Arc::new(CleanupLowQualityExecutor::new(deps.clone()));
    let keyword_search = Arc::new(KeywordSearchExecutor::new(deps.clone()));

    manager.register("sitemap_sync", sitemap_sync.clone()).await;
    manager.register("schedule_sitemap_crawl", sitemap_sync).await;
    manager.register("crawl_pending", crawl_pending.clone()).await;
    manager.register("schedule_article_crawl", crawl_pending).await;
    manager.register("retry_failed", retry_failed).await;
    manager.register("cleanup_low_quality", cleanup).await;
    manager.register("keyword_search", keyword_search.clone()).await;
    manager.register("schedule_keyword_search", keyword_search).await;
}
