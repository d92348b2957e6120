//! Multi-factor influence scoring. Keyword match dominates; source weight,
//! popularity proxies, and recency round the score out.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Source authority tiers, as fractions of the full 100-point sub-score.
pub mod source_weight {
    pub const OFFICIAL: f64 = 1.0;
    pub const MAINSTREAM: f64 = 0.8;
    pub const COMMERCIAL: f64 = 0.6;
    pub const SOCIAL: f64 = 0.4;
    pub const UNKNOWN: f64 = 0.2;
}

/// The article fields the scorer reads. Decoupled from the storage row so
/// the scorer also works on search results and in-flight records.
#[derive(Debug, Clone, Default)]
pub struct ScorableArticle {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub status: String,
    pub source_id: i64,
    pub publish_time: Option<DateTime<Utc>>,
}

pub struct InfluenceScorer {
    source_weights: HashMap<i64, f64>,
    default_weight: f64,
}

impl InfluenceScorer {
    pub fn new() -> Self {
        Self {
            source_weights: HashMap::new(),
            default_weight: source_weight::UNKNOWN,
        }
    }

    pub fn with_source_weights(source_weights: HashMap<i64, f64>) -> Self {
        Self {
            source_weights,
            default_weight: source_weight::UNKNOWN,
        }
    }

    /// Overall influence score in [0, 100]:
    /// keyword 0.65 + source 0.15 + popularity 0.15 + recency 0.05.
    /// Without keywords the keyword factor drops out and the remaining
    /// weights renormalize, so unkeyworded rankings still spread usefully.
    pub fn score(
        &self,
        article: &ScorableArticle,
        current_time: DateTime<Utc>,
        keywords: Option<&[String]>,
    ) -> f64 {
        let source_score =
            self.source_weights.get(&article.source_id).copied().unwrap_or(self.default_weight)
                * 100.0;
        let popularity_score = self.popularity_score(article);
        let recency_score = self.recency_score(article.publish_time, current_time);

        let has_keywords = keywords.map(|k| !k.is_empty()).unwrap_or(false);
        let combined = if has_keywords {
            let keyword_score = self.keyword_match_score(article, keywords);
            keyword_score * 0.65
                + source_score * 0.15
                + popularity_score * 0.15
                + recency_score * 0.05
        } else {
            (source_score * 0.15 + popularity_score * 0.15 + recency_score * 0.05) / 0.35
        };

        (combined * 100.0).round() / 100.0
    }

    /// Keyword sub-score: title exact match 100, title word-boundary 85,
    /// title substring 60; content-only matches earn up to 40 by occurrence
    /// count. The mean over matched keywords gets a match-ratio bonus of up
    /// to 25 points. No keywords at all means a flat low baseline.
    fn keyword_match_score(&self, article: &ScorableArticle, keywords: Option<&[String]>) -> f64 {
        let keywords = match keywords {
            Some(list) if !list.is_empty() => list,
            _ => return 5.0,
        };

        let title = article.title.to_lowercase();
        let content = article.content.to_lowercase();

        let mut total = 0.0;
        let mut matched = 0usize;

        for keyword in keywords {
            let kw = keyword.to_lowercase();
            if kw.len() < 2 {
                continue;
            }

            if title.contains(&kw) {
                if title == kw {
                    total += 100.0;
                } else if word_boundary_match(&title, &kw) {
                    total += 85.0;
                } else {
                    total += 60.0;
                }
                matched += 1;
            } else if content.contains(&kw) {
                let occurrences = content.matches(&kw).count() as f64;
                total += (20.0 + occurrences * 3.0).min(40.0);
                matched += 1;
            }
        }

        if matched == 0 {
            return 1.0;
        }

        let avg = total / matched as f64;
        let match_ratio = matched as f64 / keywords.len() as f64;
        (avg + match_ratio * 25.0).min(100.0)
    }

    /// Popularity proxy: base 50, plus content-length tiers, a title-length
    /// band, an author bonus, and a small processed/synced status bonus.
    fn popularity_score(&self, article: &ScorableArticle) -> f64 {
        let mut score: f64 = 50.0;

        let content_len = article.content.chars().count();
        if content_len > 2000 {
            score += 20.0;
        } else if content_len > 1000 {
            score += 10.0;
        } else if content_len > 500 {
            score += 5.0;
        }

        let title_len = article.title.chars().count();
        if (20..=100).contains(&title_len) {
            score += 15.0;
        } else if title_len > 10 {
            score += 10.0;
        }

        if article.author.as_deref().map(|a| !a.is_empty()).unwrap_or(false) {
            score += 10.0;
        }

        match article.status.as_str() {
            "synced" => score += 5.0,
            "processed" => score += 3.0,
            _ => {}
        }

        score.min(100.0)
    }

    /// Recency tiers: <24h 100, <72h 80, <168h 60, <720h 40, else 20.
    /// Missing publish time scores a neutral 50.
    fn recency_score(&self, publish_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(published) = publish_time else {
            return 50.0;
        };
        // Both sides are UTC-aware; the subtraction is naive-UTC by construction.
        let age_hours = (now - published).num_seconds() as f64 / 3600.0;
        if age_hours < 24.0 {
            100.0
        } else if age_hours < 72.0 {
            80.0
        } else if age_hours < 168.0 {
            60.0
        } else if age_hours < 720.0 {
            40.0
        } else {
            20.0
        }
    }
}

impl Default for InfluenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-word occurrence of the keyword in the text.
fn word_boundary_match(text: &str, keyword: &str) -> bool {
    let escaped = regex::escape(keyword);
    Regex::new(&format!(r"\b{escaped}\b"))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(content_len: usize) -> ScorableArticle {
        ScorableArticle {
            title: "Central bank raises interest rates again".to_string(),
            content: "word ".repeat(content_len / 5),
            author: Some("Jane Doe".to_string()),
            status: "processed".to_string(),
            source_id: 1,
            publish_time: Some(Utc::now()),
        }
    }

    #[test]
    fn zero_keywords_gives_midband_score() {
        let scorer = InfluenceScorer::new();
        // 1500-char content, author present, processed, published just now.
        let a = article(1500);
        let score = scorer.score(&a, Utc::now(), None);
        assert!((60.0..=80.0).contains(&score), "score was {score}");
    }

    #[test]
    fn none_and_empty_keywords_score_identically() {
        let scorer = InfluenceScorer::new();
        let a = article(1500);
        let now = Utc::now();
        let with_none = scorer.score(&a, now, None);
        let with_empty = scorer.score(&a, now, Some(&[]));
        assert_eq!(with_none, with_empty);
    }

    #[test]
    fn title_word_match_beats_content_match() {
        let scorer = InfluenceScorer::new();
        let now = Utc::now();
        let kw = vec!["interest".to_string()];

        let title_hit = article(1000);
        let mut content_hit = article(1000);
        content_hit.title = "Monetary policy update".to_string();
        content_hit.content = "Discussion of interest in markets".to_string();

        let t = scorer.score(&title_hit, now, Some(&kw));
        let c = scorer.score(&content_hit, now, Some(&kw));
        assert!(t > c, "title match {t} should beat content match {c}");
    }

    #[test]
    fn exact_title_match_scores_highest() {
        let scorer = InfluenceScorer::new();
        let mut a = article(1000);
        a.title = "inflation".to_string();
        let kw = vec!["inflation".to_string()];
        let exact = scorer.score(&a, Utc::now(), Some(&kw));

        a.title = "inflation fears rise across markets".to_string();
        let partial = scorer.score(&a, Utc::now(), Some(&kw));
        assert!(exact > partial);
    }

    #[test]
    fn unmatched_keywords_score_near_zero() {
        let scorer = InfluenceScorer::new();
        let a = article(1000);
        let kw = vec!["cryptozoology".to_string()];
        let score = scorer.score(&a, Utc::now(), Some(&kw));
        // keyword part is 1.0 * 0.65
        assert!(score < 30.0);
    }

    #[test]
    fn recency_tiers_decay() {
        let scorer = InfluenceScorer::new();
        let now = Utc::now();
        let fresh = scorer.recency_score(Some(now - Duration::hours(1)), now);
        let days3 = scorer.recency_score(Some(now - Duration::hours(48)), now);
        let week = scorer.recency_score(Some(now - Duration::hours(100)), now);
        let month = scorer.recency_score(Some(now - Duration::hours(400)), now);
        let old = scorer.recency_score(Some(now - Duration::hours(1000)), now);
        assert_eq!(fresh, 100.0);
        assert_eq!(days3, 80.0);
        assert_eq!(week, 60.0);
        assert_eq!(month, 40.0);
        assert_eq!(old, 20.0);
        assert_eq!(scorer.recency_score(None, now), 50.0);
    }

    #[test]
    fn popularity_rewards_length_and_author() {
        let scorer = InfluenceScorer::new();
        let long = scorer.popularity_score(&article(2500));
        let short = scorer.popularity_score(&article(100));
        assert!(long > short);

        let mut anonymous = article(2500);
        anonymous.author = None;
        assert!(scorer.popularity_score(&article(2500)) > scorer.popularity_score(&anonymous));
    }

    #[test]
    fn source_weight_lookup_applies() {
        let mut weights = HashMap::new();
        weights.insert(1_i64, source_weight::OFFICIAL);
        let scorer = InfluenceScorer::with_source_weights(weights);
        let a = article(1000);
        let mut unknown = article(1000);
        unknown.source_id = 99;
        let now = Utc::now();
        assert!(scorer.score(&a, now, None) > scorer.score(&unknown, now, None));
    }
}
