//! Core-event aggregation: window fetch, influence scoring, SimHash
//! deduplication, and an optional LLM selection stage. Datasets above the
//! shard threshold are split by source (or by day) and merged with a
//! cross-shard dedup pass.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use newsdesk_common::Result;
use newsdesk_store::{Article, ArticleRepo};

use crate::cluster::scorable;
use crate::compress::{CompressionMode, ContentCompressor};
use crate::scorer::InfluenceScorer;
use crate::simhash::{TextCluster, TokenKind, DEFAULT_BITS};

pub const SHARD_THRESHOLD: usize = 5000;
pub const STAGE_ONE_LIMIT: usize = 100;
pub const STAGE_TWO_LIMIT: usize = 20;
pub const SIMHASH_THRESHOLD: f64 = 0.85;
const PER_SHARD_LIMIT: usize = 10;

/// Compact article view handed to an LLM selector.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArticleSummary {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub source_id: i64,
    pub score: f64,
}

/// Pluggable LLM stage that narrows the candidate set to the most
/// significant events. Implementations live next to the LLM client.
#[async_trait]
pub trait EventSelector: Send + Sync {
    async fn select(&self, candidates: &[ArticleSummary], limit: usize) -> Result<Vec<i64>>;
}

pub struct DataAggregator {
    scorer: InfluenceScorer,
    clusterer: TextCluster,
}

impl DataAggregator {
    pub fn new() -> Self {
        Self {
            scorer: InfluenceScorer::new(),
            clusterer: TextCluster::new(DEFAULT_BITS, SIMHASH_THRESHOLD, TokenKind::Word),
        }
    }

    /// Fetch articles in the window and run the aggregation pipeline.
    /// `time_range` is "week" or "month"; anything else falls back to week.
    pub async fn aggregate_core_events(
        &self,
        repo: &ArticleRepo,
        time_range: &str,
        source_ids: Option<&[i64]>,
        keywords: Option<&[String]>,
        selector: Option<&dyn EventSelector>,
    ) -> Result<Vec<Article>> {
        let now = Utc::now();
        let days = match time_range {
            "month" => 30,
            _ => 7,
        };
        let start = now - Duration::days(days);

        let articles = repo.list_in_window(start, now, source_ids).await?;
        info!(time_range, fetched = articles.len(), "aggregation window fetched");

        Ok(self.aggregate(articles, now, keywords, selector).await)
    }

    /// The in-memory pipeline: shard when large, otherwise the standard
    /// score → cluster → rank → select flow.
    pub async fn aggregate(
        &self,
        articles: Vec<Article>,
        now: DateTime<Utc>,
        keywords: Option<&[String]>,
        selector: Option<&dyn EventSelector>,
    ) -> Vec<Article> {
        if articles.is_empty() {
            return Vec::new();
        }

        if articles.len() > SHARD_THRESHOLD {
            info!(total = articles.len(), "large dataset, sharded aggregation");
            self.aggregate_sharded(articles, now, keywords, selector).await
        } else {
            let ranked = self.rank_and_dedup(articles, now, keywords);
            self.final_selection(ranked, selector).await
        }
    }

    /// Score, dedup, and rank one batch; returns (article, score) sorted by
    /// score descending, capped at the stage-one limit.
    fn rank_and_dedup(
        &self,
        articles: Vec<Article>,
        now: DateTime<Utc>,
        keywords: Option<&[String]>,
    ) -> Vec<(Article, f64)> {
        let scores: HashMap<i64, f64> = articles
            .iter()
            .map(|a| (a.id, self.scorer.score(&scorable(a), now, keywords)))
            .collect();

        let texts: Vec<String> = articles
            .iter()
            .map(|a| {
                let lead: String = a.content.as_deref().unwrap_or("").chars().take(500).collect();
                format!("{}. {}", a.title, lead)
            })
            .collect();
        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let groups = self.clusterer.cluster_texts(&texts, &ids);

        let mut by_id: HashMap<i64, Article> = articles.into_iter().map(|a| (a.id, a)).collect();

        // Keep the longest-content member of each near-duplicate group.
        let mut ranked: Vec<(Article, f64)> = Vec::new();
        for group in groups {
            let representative = std::iter::once(group.representative_id)
                .chain(group.duplicate_ids.iter().copied())
                .filter_map(|id| by_id.remove(&id))
                .max_by_key(|a| a.content.as_deref().map(str::len).unwrap_or(0));
            if let Some(article) = representative {
                let score = scores.get(&article.id).copied().unwrap_or(0.0);
                ranked.push((article, score));
            }
        }

        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(STAGE_ONE_LIMIT);
        ranked
    }

    async fn aggregate_sharded(
        &self,
        articles: Vec<Article>,
        now: DateTime<Utc>,
        keywords: Option<&[String]>,
        selector: Option<&dyn EventSelector>,
    ) -> Vec<Article> {
        let mut shards = shard_by_source(articles);
        if shards.len() < 3 {
            let merged: Vec<Article> = shards.into_iter().flat_map(|(_, v)| v).collect();
            shards = shard_by_day(merged);
        }
        info!(shards = shards.len(), "processing shards");

        let mut candidates: Vec<Article> = Vec::new();
        for (name, shard_articles) in shards {
            let count = shard_articles.len();
            let top = self.rank_and_dedup(shard_articles, now, keywords);
            info!(shard = %name, articles = count, kept = top.len().min(PER_SHARD_LIMIT), "shard processed");
            candidates.extend(top.into_iter().take(PER_SHARD_LIMIT).map(|(a, _)| a));
        }

        // Cross-shard dedup over the merged candidates.
        let ranked = self.rank_and_dedup(candidates, now, keywords);
        self.final_selection(ranked, selector).await
    }

    /// LLM narrowing when a selector is available; score order otherwise.
    /// Selector failure falls back to score order.
    async fn final_selection(
        &self,
        ranked: Vec<(Article, f64)>,
        selector: Option<&dyn EventSelector>,
    ) -> Vec<Article> {
        let Some(selector) = selector else {
            return ranked.into_iter().take(STAGE_TWO_LIMIT).map(|(a, _)| a).collect();
        };

        let compressor = ContentCompressor::default();
        let summaries: Vec<ArticleSummary> = ranked
            .iter()
            .map(|(a, score)| {
                let compressed = compressor.compress(
                    a.id,
                    &a.url,
                    &a.title,
                    a.content.as_deref().unwrap_or(""),
                    CompressionMode::Summary,
                );
                ArticleSummary {
                    id: a.id,
                    url: a.url.clone(),
                    title: compressed.title,
                    summary: compressed.content.unwrap_or_default(),
                    publish_time: a.publish_time,
                    source_id: a.source_id,
                    score: *score,
                }
            })
            .collect();

        match selector.select(&summaries, STAGE_TWO_LIMIT).await {
            Ok(selected_ids) => {
                let id_set: std::collections::HashSet<i64> = selected_ids.into_iter().collect();
                let picked: Vec<Article> = ranked
                    .iter()
                    .filter(|(a, _)| id_set.contains(&a.id))
                    .map(|(a, _)| a.clone())
                    .collect();
                if picked.is_empty() {
                    warn!("selector returned no usable ids, falling back to score order");
                    ranked.into_iter().take(STAGE_TWO_LIMIT).map(|(a, _)| a).collect()
                } else {
                    picked
                }
            }
            Err(e) => {
                warn!(error = %e, "event selector failed, falling back to score order");
                ranked.into_iter().take(STAGE_TWO_LIMIT).map(|(a, _)| a).collect()
            }
        }
    }
}

impl Default for DataAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn shard_by_source(articles: Vec<Article>) -> Vec<(String, Vec<Article>)> {
    let mut shards: HashMap<i64, Vec<Article>> = HashMap::new();
    for article in articles {
        shards.entry(article.source_id).or_default().push(article);
    }
    let mut out: Vec<(String, Vec<Article>)> = shards
        .into_iter()
        .map(|(source_id, v)| (format!("source_{source_id}"), v))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn shard_by_day(articles: Vec<Article>) -> Vec<(String, Vec<Article>)> {
    let mut shards: HashMap<String, Vec<Article>> = HashMap::new();
    for article in articles {
        let day = article
            .publish_time
            .unwrap_or(article.crawled_at)
            .format("%Y-%m-%d")
            .to_string();
        shards.entry(day).or_default().push(article);
    }
    let mut out: Vec<(String, Vec<Article>)> = shards.into_iter().collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simhash::SimHash;

    fn article(id: i64, source_id: i64, title: &str, content: &str, age_days: i64) -> Article {
        let now = Utc::now();
        Article {
            id,
            url_hash: format!("{id:032}"),
            url: format!("https://example.com/{id}"),
            title: title.to_string(),
            content: Some(content.to_string()),
            content_hash: None,
            publish_time: Some(now - Duration::days(age_days)),
            author: None,
            source_id,
            status: "raw".to_string(),
            fetch_status: "success".to_string(),
            retry_count: 0,
            error_msg: None,
            extra_data: None,
            crawled_at: now,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn topic_sentence(topic: usize) -> String {
        (0..25)
            .map(|k| format!("term{topic}x{k}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn small_dataset_dedups_and_ranks() {
        let base = topic_sentence(1);
        let dup = format!("{base} case9999");
        let articles = vec![
            article(1, 1, "Topic one", &base, 0),
            article(2, 1, "Topic one", &dup, 0),
            article(3, 2, "Topic two", &topic_sentence(2), 5),
        ];
        let result = DataAggregator::new().aggregate(articles, Utc::now(), None, None).await;
        // The duplicate pair collapses; the longer member survives.
        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|a| a.id == 2));
        assert!(!result.iter().any(|a| a.id == 1));
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        let result = DataAggregator::new().aggregate(Vec::new(), Utc::now(), None, None).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn sharded_aggregation_returns_dissimilar_top_twenty() {
        // 6000 articles: 6 sources, 30 topics, recency rotated per source so
        // each shard surfaces a different slice of topics.
        let mut articles = Vec::new();
        for i in 0..6000usize {
            let topic = i % 30;
            let source = (i % 6) as i64 + 1;
            let age = ((topic + (source as usize - 1) * 5) % 30) as i64;
            let content = format!("{} case{i}", topic_sentence(topic));
            articles.push(article(
                i as i64 + 1,
                source,
                &format!("Topic {topic} update"),
                &content,
                age,
            ));
        }

        let result = DataAggregator::new().aggregate(articles, Utc::now(), None, None).await;
        assert_eq!(result.len(), STAGE_TWO_LIMIT);

        // No two survivors are near-duplicates.
        let simhash = SimHash::default();
        let hashes: Vec<u64> = result
            .iter()
            .map(|a| {
                let lead: String =
                    a.content.as_deref().unwrap_or("").chars().take(500).collect();
                simhash.compute(&format!("{}. {}", a.title, lead))
            })
            .collect();
        for i in 0..hashes.len() {
            for j in (i + 1)..hashes.len() {
                assert!(
                    simhash.similarity(hashes[i], hashes[j]) < SIMHASH_THRESHOLD,
                    "results {i} and {j} are near-duplicates"
                );
            }
        }
    }

    struct FixedSelector(Vec<i64>);

    #[async_trait]
    impl EventSelector for FixedSelector {
        async fn select(&self, _candidates: &[ArticleSummary], _limit: usize) -> Result<Vec<i64>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSelector;

    #[async_trait]
    impl EventSelector for FailingSelector {
        async fn select(&self, _candidates: &[ArticleSummary], _limit: usize) -> Result<Vec<i64>> {
            Err(newsdesk_common::NewsdeskError::BackendUnavailable("llm down".into()))
        }
    }

    #[tokio::test]
    async fn selector_narrows_results() {
        let articles = vec![
            article(1, 1, "Topic one", &topic_sentence(1), 0),
            article(2, 2, "Topic two", &topic_sentence(2), 0),
            article(3, 3, "Topic three", &topic_sentence(3), 0),
        ];
        let selector = FixedSelector(vec![2]);
        let result = DataAggregator::new()
            .aggregate(articles, Utc::now(), None, Some(&selector))
            .await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 2);
    }

    #[tokio::test]
    async fn selector_failure_falls_back_to_score_order() {
        let articles = vec![
            article(1, 1, "Topic one", &topic_sentence(1), 0),
            article(2, 2, "Topic two", &topic_sentence(2), 10),
        ];
        let result = DataAggregator::new()
            .aggregate(articles, Utc::now(), None, Some(&FailingSelector))
            .await;
        assert_eq!(result.len(), 2);
        // Fresher article scores higher and leads.
        assert_eq!(result[0].id, 1);
    }
}
