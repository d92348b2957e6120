use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use newsdesk_common::{ParserConfig, Result, TimeRange};
use newsdesk_crawler::politeness_pause;
use newsdesk_store::{InsertArticle, InsertSource};

use crate::executors::ExecutorDeps;
use crate::manager::{TaskContext, TaskExecutor};

const MIN_CONTENT_LENGTH: usize = 50;

/// Runs every active stored keyword through the search backend, fetches
/// unseen result URLs, and imports them as articles. Sources are created
/// lazily for unseen hosts.
pub struct KeywordSearchExecutor {
    deps: Arc<ExecutorDeps>,
}

impl KeywordSearchExecutor {
    pub fn new(deps: Arc<ExecutorDeps>) -> Self {
        Self { deps }
    }

    /// Source id and parser config for a result URL, creating a disabled
    /// source for never-before-seen hosts.
    async fn source_for_url(&self, url: &str) -> Result<Option<(i64, ParserConfig)>> {
        let Ok(parsed) = Url::parse(url) else {
            return Ok(None);
        };
        let Some(host) = parsed.host_str() else {
            return Ok(None);
        };
        let base_url = format!("{}://{}", parsed.scheme(), host);

        if let Some(source) = self.deps.store.sources.get_by_base_url(&base_url).await? {
            return Ok(Some((source.id, source.parser_config())));
        }

        let config = ParserConfig::default();
        let source = self
            .deps
            .store
            .sources
            .insert(InsertSource {
                site_name: host.to_string(),
                base_url,
                parser_config: config.clone(),
                crawl_interval_seconds: 3600,
                discovery_method: "hybrid".to_string(),
            })
            .await?;
        info!(source_id = source.id, host, "created source from search result");
        Ok(Some((source.id, config)))
    }
}

#[async_trait]
impl TaskExecutor for KeywordSearchExecutor {
    async fn execute(
        &self,
        ctx: &TaskContext,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let keywords = match params.get("keyword_id").and_then(|v| v.as_i64()) {
            Some(id) => match self.deps.store.keywords.get(id).await? {
                Some(k) => vec![k],
                None => Vec::new(),
            },
            None => self.deps.store.keywords.list_active().await?,
        };
        let total = keywords.len() as i32;

        let mut searched = 0u64;
        let mut saved = 0u64;

        for (index, keyword) in keywords.iter().enumerate() {
            if ctx.is_cancelled() {
                break;
            }
            if !keyword.is_active {
                continue;
            }

            ctx.progress(
                index as i32,
                total,
                Some(&format!("Searching: {}", keyword.keyword)),
                None,
            )
            .await?;

            let time_range =
                TimeRange::from_str(&keyword.time_range).unwrap_or(TimeRange::Week);
            let results = self
                .deps
                .search
                .search(
                    &keyword.keyword,
                    time_range,
                    &keyword.region,
                    keyword.max_results.max(1) as usize,
                )
                .await;
            searched += results.len() as u64;

            let mut keyword_saved = 0u64;
            for result in results {
                if ctx.is_cancelled() {
                    break;
                }

                if self.deps.store.articles.exists_by_url(&result.url).await? {
                    continue;
                }

                let Some((source_id, config)) = self.source_for_url(&result.url).await? else {
                    continue;
                };

                let scraped = self.deps.scraper.scrape(&result.url, &config, source_id).await;
                let content_len = scraped.content.as_deref().map(str::len).unwrap_or(0);
                if !scraped.is_ok() || content_len < MIN_CONTENT_LENGTH {
                    warn!(url = %result.url, "search result fetch unusable, skipping");
                    continue;
                }

                let mut insert = InsertArticle::from_scraped(
                    &scraped,
                    source_id,
                    Some(&result.title),
                    result.published_date,
                );
                if insert.title == "Untitled" {
                    insert.title = result.title.clone();
                }
                match self.deps.store.articles.insert(insert).await {
                    Ok(article) => {
                        info!(article_id = article.id, url = %result.url, "search result imported");
                        keyword_saved += 1;
                    }
                    Err(e) => warn!(url = %result.url, error = %e, "search result insert failed"),
                }

                politeness_pause(None, self.deps.default_delay_secs).await;
            }
            saved += keyword_saved;

            self.deps.store.keywords.record_search(keyword.id).await?;

            ctx.progress(
                (index + 1) as i32,
                total,
                Some(&format!("Finished: {}", keyword.keyword)),
                Some(serde_json::json!({ "searched": searched, "saved": saved })),
            )
            .await?;
        }

        Ok(serde_json::json!({
            "keywords": keywords.len(),
            "searched": searched,
            "saved": saved,
        }))
    }
}
