//! Article clustering: influence-score gating, SimHash grouping, and
//! longest-content representative election.

use chrono::{DateTime, Utc};
use tracing::info;

use newsdesk_store::Article;

use crate::scorer::{InfluenceScorer, ScorableArticle};
use crate::simhash::{TextCluster, TokenKind, DEFAULT_BITS, DEFAULT_THRESHOLD};

/// Articles below this influence score are dropped when query keywords are
/// present.
pub const DEFAULT_MIN_SCORE: f64 = 20.0;
/// Hard cap on the number of articles fed into one clustering pass.
pub const MAX_CLUSTER_INPUT: usize = 1000;

/// A group of near-duplicate articles. The representative carries the
/// longest content of its members.
#[derive(Debug, Clone)]
pub struct ArticleCluster {
    pub representative: Article,
    pub duplicates: Vec<Article>,
}

impl ArticleCluster {
    pub fn total_count(&self) -> usize {
        1 + self.duplicates.len()
    }

    /// Representative first, then duplicates.
    pub fn members(&self) -> Vec<&Article> {
        std::iter::once(&self.representative)
            .chain(self.duplicates.iter())
            .collect()
    }
}

pub struct ArticleClusteringService {
    clusterer: TextCluster,
    scorer: InfluenceScorer,
    min_score: f64,
    max_input: usize,
}

impl ArticleClusteringService {
    pub fn new() -> Self {
        Self {
            clusterer: TextCluster::new(DEFAULT_BITS, DEFAULT_THRESHOLD, TokenKind::Word),
            scorer: InfluenceScorer::new(),
            min_score: DEFAULT_MIN_SCORE,
            max_input: MAX_CLUSTER_INPUT,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            clusterer: TextCluster::new(DEFAULT_BITS, threshold, TokenKind::Word),
            ..Self::new()
        }
    }

    /// Cluster a set of articles. With keywords, articles are scored first
    /// and weak matches dropped; the input is capped at the strongest 1000.
    /// Clusters come back largest first.
    pub fn cluster_articles(
        &self,
        articles: Vec<Article>,
        keywords: Option<&[String]>,
        now: DateTime<Utc>,
    ) -> Vec<ArticleCluster> {
        let total = articles.len();

        let mut working: Vec<Article> = match keywords {
            Some(kws) if !kws.is_empty() => {
                let mut scored: Vec<(f64, Article)> = articles
                    .into_iter()
                    .map(|a| {
                        let score = self.scorer.score(&scorable(&a), now, Some(kws));
                        (score, a)
                    })
                    .filter(|(score, _)| *score >= self.min_score)
                    .collect();
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                scored.into_iter().map(|(_, a)| a).collect()
            }
            _ => articles,
        };
        working.truncate(self.max_input);

        info!(
            total,
            kept = working.len(),
            "clustering input after score gate"
        );

        if working.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = working
            .iter()
            .map(|a| format!("{}\n{}", a.title, a.content.as_deref().unwrap_or("")))
            .collect();
        let ids: Vec<i64> = working.iter().map(|a| a.id).collect();
        let groups = self.clusterer.cluster_texts(&texts, &ids);

        let mut by_id: std::collections::HashMap<i64, Article> =
            working.into_iter().map(|a| (a.id, a)).collect();

        let mut clusters: Vec<ArticleCluster> = Vec::new();
        for group in groups {
            let mut members: Vec<Article> = std::iter::once(group.representative_id)
                .chain(group.duplicate_ids.iter().copied())
                .filter_map(|id| by_id.remove(&id))
                .collect();
            if members.is_empty() {
                continue;
            }

            // Longest content wins representative; first member keeps the
            // slot on ties.
            let best = members
                .iter()
                .enumerate()
                .max_by_key(|(i, a)| {
                    (
                        a.content.as_deref().map(str::len).unwrap_or(0),
                        std::cmp::Reverse(*i),
                    )
                })
                .map(|(i, _)| i)
                .unwrap_or(0);
            let representative = members.remove(best);

            clusters.push(ArticleCluster {
                representative,
                duplicates: members,
            });
        }

        clusters.sort_by(|a, b| b.total_count().cmp(&a.total_count()));
        info!(clusters = clusters.len(), "clustering complete");
        clusters
    }
}

impl Default for ArticleClusteringService {
    fn default() -> Self {
        Self::new()
    }
}

/// View of a stored article as scorer input.
pub fn scorable(article: &Article) -> ScorableArticle {
    ScorableArticle {
        title: article.title.clone(),
        content: article.content.clone().unwrap_or_default(),
        author: article.author.clone(),
        status: article.status.clone(),
        source_id: article.source_id,
        publish_time: article.publish_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: i64, title: &str, content: &str) -> Article {
        Article {
            id,
            url_hash: format!("{id:032}"),
            url: format!("https://example.com/{id}"),
            title: title.to_string(),
            content: Some(content.to_string()),
            content_hash: None,
            publish_time: Some(Utc::now()),
            author: Some("Reporter".to_string()),
            source_id: 1,
            status: "raw".to_string(),
            fetch_status: "success".to_string(),
            retry_count: 0,
            error_msg: None,
            extra_data: None,
            crawled_at: Utc::now(),
            processed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn near_duplicates_share_a_cluster_and_longest_wins() {
        let base = "The central bank raised interest rates by fifty basis points on Tuesday \
                    citing persistent inflation pressure across the economy";
        let longer = format!("{base} analysts said");
        let articles = vec![
            article(1, "Rates raised", base),
            article(2, "Rates raised", &longer),
            article(3, "Football final tonight", "The championship final kicks off tonight in the capital stadium."),
        ];
        let clusters =
            ArticleClusteringService::new().cluster_articles(articles, None, Utc::now());

        assert_eq!(clusters.len(), 2);
        // Biggest cluster first; its representative is the longer member.
        assert_eq!(clusters[0].total_count(), 2);
        assert_eq!(clusters[0].representative.id, 2);
        assert_eq!(clusters[0].duplicates[0].id, 1);
    }

    #[test]
    fn keyword_gate_drops_weak_matches() {
        let articles = vec![
            article(
                1,
                "Central bank inflation response",
                &"The central bank moved against inflation with decisive rate policy. ".repeat(20),
            ),
            article(
                2,
                "Gardening tips for spring",
                &"Plant tomatoes after the last frost and water them regularly. ".repeat(5),
            ),
        ];
        let keywords = vec!["inflation".to_string()];
        let clusters = ArticleClusteringService::new().cluster_articles(
            articles,
            Some(&keywords),
            Utc::now(),
        );
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].representative.id, 1);
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let clusters =
            ArticleClusteringService::new().cluster_articles(Vec::new(), None, Utc::now());
        assert!(clusters.is_empty());
    }

    #[test]
    fn every_article_lands_in_exactly_one_cluster() {
        let articles = vec![
            article(1, "Story one about local elections", "Voters head to the polls in the municipal elections this weekend."),
            article(2, "Story two about harvest season", "Farmers report a strong grain harvest across the region this year."),
            article(3, "Story three about transit plans", "The city unveiled a new tram line plan connecting the suburbs."),
        ];
        let clusters =
            ArticleClusteringService::new().cluster_articles(articles, None, Utc::now());
        let mut ids: Vec<i64> = clusters
            .iter()
            .flat_map(|c| c.members().iter().map(|a| a.id).collect::<Vec<_>>())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
