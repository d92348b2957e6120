//! Event extraction from article clusters: TF-IDF and TextRank keywords
//! merged 0.6/0.4, a keyword-derived event title, and an importance score
//! that blends cluster size, content volume, and keyword relevance.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::ArticleCluster;

const KEYWORDS_PER_METHOD: usize = 5;
const TEXTRANK_WINDOW: usize = 5;
const TEXTRANK_DAMPING: f64 = 0.85;
const TEXTRANK_ITERATIONS: usize = 10;
/// Clusters matching the query keywords below this ratio are dropped.
const MIN_KEYWORD_RELEVANCE: f64 = 0.2;
/// Reports always carry at least this many events when available.
const MIN_EVENTS: usize = 15;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // English
        "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with",
        "by", "from", "as", "is", "are", "was", "were", "be", "been", "it", "its", "this",
        "that", "these", "those", "he", "she", "they", "we", "you", "his", "her", "their",
        "will", "would", "can", "could", "has", "have", "had", "not", "no", "said", "says",
        "also", "more", "most", "other", "some", "such", "than", "then", "there", "about",
        "after", "before", "over", "under", "between", "into", "through", "during",
        // Chinese
        "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "上", "也",
        "很", "到", "说", "要", "去", "你", "会", "着", "看", "好", "这", "年", "月", "日",
        "可以", "但是", "因为", "所以", "如果", "表示", "指出", "认为", "据", "报道",
        "相关", "有关", "目前", "现在", "正在", "已经", "进行", "工作",
        // Russian
        "и", "в", "на", "с", "по", "не", "что", "как", "это", "для", "его", "был", "была",
        "были", "из", "за", "он", "она", "они", "мы", "вы", "так", "же", "бы", "или",
    ]
    .into_iter()
    .collect()
});

/// Word tokenizer shared by the keyword extractors: lowercase, punctuation
/// stripped, CJK runs split per code point, stopwords and one-char ASCII
/// tokens removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() || is_cjk(c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut tokens = Vec::new();
    for part in cleaned.split_whitespace() {
        if part.chars().any(is_cjk) {
            for c in part.chars() {
                let s = c.to_string();
                if !STOPWORDS.contains(s.as_str()) {
                    tokens.push(s);
                }
            }
        } else if part.chars().count() > 1 && !STOPWORDS.contains(part) {
            tokens.push(part.to_string());
        }
    }
    tokens
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// TF-IDF over a small document set: term frequency within the combined
/// text, inverse document frequency across the individual documents.
pub fn extract_keywords_tfidf(docs: &[String], top_k: usize) -> Vec<(String, f64)> {
    if docs.is_empty() {
        return Vec::new();
    }

    let doc_tokens: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d)).collect();
    let n_docs = doc_tokens.len() as f64;

    let mut term_freq: HashMap<&str, f64> = HashMap::new();
    let mut total_terms = 0f64;
    for tokens in &doc_tokens {
        for token in tokens {
            *term_freq.entry(token.as_str()).or_default() += 1.0;
            total_terms += 1.0;
        }
    }
    if total_terms == 0.0 {
        return Vec::new();
    }

    let mut doc_freq: HashMap<&str, f64> = HashMap::new();
    for tokens in &doc_tokens {
        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for token in unique {
            *doc_freq.entry(token).or_default() += 1.0;
        }
    }

    let mut scored: Vec<(String, f64)> = term_freq
        .into_iter()
        .map(|(term, tf)| {
            let df = doc_freq.get(term).copied().unwrap_or(1.0);
            let idf = (n_docs / df).ln() + 1.0;
            (term.to_string(), (tf / total_terms) * idf)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);
    scored
}

/// TextRank over a co-occurrence window graph, normalized to [0, 1] by the
/// top score.
pub fn extract_keywords_textrank(text: &str, top_k: usize) -> Vec<(String, f64)> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Vec::new();
    }

    let vocab: Vec<&str> = {
        let mut seen = HashSet::new();
        tokens
            .iter()
            .map(String::as_str)
            .filter(|t| seen.insert(*t))
            .collect()
    };
    let index: HashMap<&str, usize> = vocab.iter().enumerate().map(|(i, t)| (*t, i)).collect();
    let n = vocab.len();

    // Undirected co-occurrence edges within the sliding window.
    let mut edges: HashMap<(usize, usize), f64> = HashMap::new();
    for (i, token) in tokens.iter().enumerate() {
        let a = index[token.as_str()];
        for other in tokens.iter().skip(i + 1).take(TEXTRANK_WINDOW - 1) {
            let b = index[other.as_str()];
            if a == b {
                continue;
            }
            *edges.entry((a.min(b), a.max(b))).or_default() += 1.0;
        }
    }

    let mut out_weight = vec![0f64; n];
    for ((a, b), w) in &edges {
        out_weight[*a] += w;
        out_weight[*b] += w;
    }

    let mut rank = vec![1.0 / n as f64; n];
    for _ in 0..TEXTRANK_ITERATIONS {
        let mut next = vec![(1.0 - TEXTRANK_DAMPING) / n as f64; n];
        for ((a, b), w) in &edges {
            if out_weight[*a] > 0.0 {
                next[*b] += TEXTRANK_DAMPING * rank[*a] * w / out_weight[*a];
            }
            if out_weight[*b] > 0.0 {
                next[*a] += TEXTRANK_DAMPING * rank[*b] * w / out_weight[*b];
            }
        }
        rank = next;
    }

    let top = rank.iter().cloned().fold(f64::MIN, f64::max).max(f64::EPSILON);
    let mut scored: Vec<(String, f64)> = vocab
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), rank[i] / top))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);
    scored
}

/// A cluster-derived topic ready for report generation.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedEvent {
    pub title: String,
    pub summary: String,
    pub keywords: Vec<String>,
    /// Blended importance in [0, 1].
    pub importance: f64,
    pub tfidf_importance: f64,
    pub keyword_relevance: f64,
    pub representative_article_id: i64,
    pub article_ids: Vec<i64>,
    pub article_count: usize,
    pub content_length: usize,
}

pub struct EventExtractor;

impl EventExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Build an event from one cluster: merged TF-IDF/TextRank keywords
    /// (0.6/0.4), a keyword-derived title, and a summary from the
    /// representative article.
    pub fn extract_event(&self, cluster: &ArticleCluster) -> ExtractedEvent {
        let members = cluster.members();

        let docs: Vec<String> = members
            .iter()
            .map(|a| {
                let content: String = a.content.as_deref().unwrap_or("").chars().take(500).collect();
                format!("{}\n{}", a.title, content)
            })
            .collect();
        let combined = docs.join("\n");

        let tfidf = extract_keywords_tfidf(&docs, KEYWORDS_PER_METHOD);
        let textrank = extract_keywords_textrank(&combined, KEYWORDS_PER_METHOD);

        let mut merged: HashMap<String, f64> = HashMap::new();
        for (word, score) in tfidf {
            *merged.entry(word).or_default() += score * 0.6;
        }
        for (word, score) in textrank {
            *merged.entry(word).or_default() += score * 0.4;
        }
        let mut top: Vec<(String, f64)> = merged.into_iter().collect();
        top.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        top.truncate(KEYWORDS_PER_METHOD);

        let title = if top.is_empty() {
            let fallback: String = cluster.representative.title.chars().take(50).collect();
            if fallback.is_empty() {
                "Untitled event".to_string()
            } else {
                fallback
            }
        } else {
            top.iter()
                .take(3)
                .map(|(w, _)| w.as_str())
                .collect::<Vec<_>>()
                .join(" · ")
        };

        let summary = {
            let content = cluster.representative.content.as_deref().unwrap_or("");
            if content.is_empty() {
                cluster.representative.title.clone()
            } else {
                let cut: String = content.chars().take(200).collect();
                if content.chars().count() > 200 {
                    format!("{cut}...")
                } else {
                    cut
                }
            }
        };

        let content_length: usize = members
            .iter()
            .map(|a| a.content.as_deref().map(|c| c.chars().count()).unwrap_or(0))
            .sum();

        let keyword_scores: Vec<f64> = top.iter().map(|(_, s)| *s).collect();
        let tfidf_importance = importance_score(
            members.len(),
            content_length,
            &keyword_scores,
            top.len(),
        );

        ExtractedEvent {
            title,
            summary,
            keywords: top.into_iter().map(|(w, _)| w).collect(),
            importance: tfidf_importance,
            tfidf_importance,
            keyword_relevance: 0.0,
            representative_article_id: cluster.representative.id,
            article_ids: members.iter().map(|a| a.id).collect(),
            article_count: members.len(),
            content_length,
        }
    }
}

impl Default for EventExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Importance blend: cluster size 0.4, content volume 0.2, keyword scores
/// 0.2, keyword coverage 0.2. All factors saturate at 1.0.
fn importance_score(
    cluster_size: usize,
    content_length: usize,
    keyword_scores: &[f64],
    keyword_count: usize,
) -> f64 {
    let size_score = (cluster_size as f64 / 10.0).min(1.0);
    let length_score = (content_length as f64 / 2000.0).min(1.0);
    let keyword_score = if keyword_scores.is_empty() {
        0.5
    } else {
        let avg = keyword_scores.iter().sum::<f64>() / keyword_scores.len() as f64;
        (avg / 0.5).min(1.0)
    };
    let coverage_score = (keyword_count as f64 / KEYWORDS_PER_METHOD as f64).min(1.0);

    size_score * 0.4 + length_score * 0.2 + keyword_score * 0.2 + coverage_score * 0.2
}

pub struct EventSelectionService {
    extractor: EventExtractor,
}

impl EventSelectionService {
    pub fn new() -> Self {
        Self {
            extractor: EventExtractor::new(),
        }
    }

    /// Build events from clusters and keep the most important ones. With
    /// query keywords the relevance gate filters unrelated clusters first
    /// and the importance blend becomes 0.6·tfidf + 0.4·relevance.
    pub fn select_top_events(
        &self,
        clusters: &[ArticleCluster],
        max_events: usize,
        query_keywords: Option<&[String]>,
    ) -> Vec<ExtractedEvent> {
        let cap = max_events.max(MIN_EVENTS);
        let mut events = Vec::new();

        for cluster in clusters {
            let relevance = match query_keywords {
                Some(kws) if !kws.is_empty() => {
                    let r = keyword_relevance_from_articles(cluster, kws);
                    if r < MIN_KEYWORD_RELEVANCE {
                        debug!(relevance = r, "cluster below keyword relevance gate");
                        continue;
                    }
                    Some(r)
                }
                _ => None,
            };

            let mut event = self.extractor.extract_event(cluster);
            if let Some(r) = relevance {
                event.keyword_relevance = r;
                event.importance = event.tfidf_importance * 0.6 + r * 0.4;
            }
            events.push(event);
        }

        events.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        events.truncate(cap);

        info!(
            clusters = clusters.len(),
            selected = events.len(),
            max_events,
            "event selection complete"
        );
        events
    }
}

impl Default for EventSelectionService {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of query keywords that appear anywhere in the cluster's titles
/// or leading content.
fn keyword_relevance_from_articles(cluster: &ArticleCluster, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.5;
    }
    let mut haystack = String::new();
    for article in cluster.members() {
        haystack.push_str(&article.title.to_lowercase());
        haystack.push(' ');
        let lead: String = article
            .content
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(500)
            .collect();
        haystack.push_str(&lead.to_lowercase());
        haystack.push(' ');
    }

    let matched = keywords
        .iter()
        .filter(|kw| haystack.contains(&kw.to_lowercase()))
        .count();
    matched as f64 / keywords.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_store::Article;

    fn article(id: i64, title: &str, content: &str) -> Article {
        use chrono::Utc;
        Article {
            id,
            url_hash: format!("{id:032}"),
            url: format!("https://example.com/{id}"),
            title: title.to_string(),
            content: Some(content.to_string()),
            content_hash: None,
            publish_time: Some(Utc::now()),
            author: None,
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

    fn budget_cluster() -> ArticleCluster {
        ArticleCluster {
            representative: article(
                1,
                "Parliament approves national budget amendment",
                "The parliament voted to approve the national budget amendment on Tuesday. \
                 The budget shifts infrastructure spending toward northern provinces. \
                 Opposition parties criticized the budget process.",
            ),
            duplicates: vec![article(
                2,
                "Budget amendment passes parliament vote",
                "Lawmakers in parliament passed the budget amendment with a narrow margin. \
                 Infrastructure spending dominates the revised budget.",
            )],
        }
    }

    #[test]
    fn tokenizer_drops_stopwords_and_splits_cjk() {
        let tokens = tokenize("The budget and the 经济 report");
        assert!(tokens.contains(&"budget".to_string()));
        assert!(tokens.contains(&"经".to_string()));
        assert!(tokens.contains(&"济".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"and".to_string()));
    }

    #[test]
    fn tfidf_surfaces_repeated_terms() {
        let docs = vec![
            "budget budget budget parliament vote".to_string(),
            "budget infrastructure spending".to_string(),
        ];
        let keywords = extract_keywords_tfidf(&docs, 3);
        assert!(!keywords.is_empty());
        assert_eq!(keywords[0].0, "budget");
    }

    #[test]
    fn tfidf_empty_docs() {
        assert!(extract_keywords_tfidf(&[], 5).is_empty());
        assert!(extract_keywords_tfidf(&["".to_string()], 5).is_empty());
    }

    #[test]
    fn textrank_scores_bounded_and_ranked() {
        let text = "budget vote parliament budget spending parliament budget approval process";
        let keywords = extract_keywords_textrank(text, 5);
        assert!(!keywords.is_empty());
        assert!(keywords.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
        // Scores come back sorted descending
        for pair in keywords.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn event_extraction_builds_title_and_keywords() {
        let event = EventExtractor::new().extract_event(&budget_cluster());
        assert!(!event.keywords.is_empty());
        assert!(event.keywords.iter().any(|k| k == "budget"));
        assert!(event.title.contains('·') || !event.title.is_empty());
        assert_eq!(event.article_count, 2);
        assert_eq!(event.representative_article_id, 1);
        assert_eq!(event.article_ids, vec![1, 2]);
        assert!(event.importance > 0.0 && event.importance <= 1.0);
    }

    #[test]
    fn event_summary_truncated_to_200_chars() {
        let long = "x".repeat(400);
        let cluster = ArticleCluster {
            representative: article(1, "Title", &long),
            duplicates: vec![],
        };
        let event = EventExtractor::new().extract_event(&cluster);
        assert!(event.summary.chars().count() <= 203);
        assert!(event.summary.ends_with("..."));
    }

    #[test]
    fn selection_filters_irrelevant_clusters() {
        let clusters = vec![
            budget_cluster(),
            ArticleCluster {
                representative: article(
                    9,
                    "Football final goes to penalties",
                    "The championship final was decided on penalties after extra time.",
                ),
                duplicates: vec![],
            },
        ];
        let keywords = vec!["budget".to_string(), "parliament".to_string()];
        let events =
            EventSelectionService::new().select_top_events(&clusters, 20, Some(&keywords));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].representative_article_id, 1);
        assert!(events[0].keyword_relevance > 0.0);
    }

    #[test]
    fn selection_without_keywords_keeps_all() {
        let clusters = vec![budget_cluster()];
        let events = EventSelectionService::new().select_top_events(&clusters, 20, None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].keyword_relevance, 0.0);
    }

    #[test]
    fn importance_favors_bigger_clusters() {
        let small = importance_score(1, 500, &[0.5], 5);
        let big = importance_score(10, 500, &[0.5], 5);
        assert!(big > small);
    }
}
