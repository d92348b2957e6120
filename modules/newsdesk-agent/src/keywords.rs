//! LLM-backed keyword generation for report scoping, with a plain
//! tokenization fallback when the backend is unavailable.

use chrono::{DateTime, Utc};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::llm::{ChatMessage, LlmClient};

/// Latin words, CJK runs, and Cyrillic runs count as keyword candidates.
static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[一-鿿]{2,6}|[A-Za-z][A-Za-z-]{1,14}|[Ѐ-ӿ]{2,15}")
        .expect("valid regex")
});

pub struct KeywordGenerator {
    client: LlmClient,
}

impl KeywordGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Generate up to `max_keywords` query keywords for a report. On LLM
    /// failure, falls back to tokenizing the title.
    pub async fn generate(
        &self,
        title: &str,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
        user_prompt: Option<&str>,
        language: &str,
        max_keywords: usize,
    ) -> Vec<String> {
        let span_days = (time_end - time_start).num_days();
        let range_desc = match span_days {
            ..=7 => "this week",
            8..=14 => "the last two weeks",
            15..=31 => "this month",
            32..=90 => "this quarter",
            _ => "the recent period",
        };

        let system = format!(
            "You are a news analysis assistant extracting the core query keywords from a \
             report brief.\n\
             Rules:\n\
             1. Extract at most {max_keywords} keywords.\n\
             2. Keywords are short noun phrases: names of people, places, organizations, events.\n\
             3. Order by importance, most important first.\n\
             4. Reply with the keyword list only, comma-separated, nothing else.\n\
             5. When the report language is not English, include keywords in that language \
                alongside English equivalents (report language: {language})."
        );

        let mut user = format!(
            "Report title: {title}\nTime range: {range_desc} ({} to {})",
            time_start.format("%Y-%m-%d"),
            time_end.format("%Y-%m-%d"),
        );
        if let Some(prompt) = user_prompt {
            user.push_str(&format!("\nUser instructions: {prompt}"));
        }
        user.push_str(&format!(
            "\n\nProduce up to {max_keywords} keywords, comma-separated:"
        ));

        match self
            .client
            .chat(&[ChatMessage::system(system), ChatMessage::user(user)])
            .await
        {
            Ok(reply) => {
                let keywords = parse_keywords(&reply, max_keywords);
                info!(count = keywords.len(), "keywords generated");
                if keywords.is_empty() {
                    fallback_keywords(title, user_prompt, max_keywords)
                } else {
                    keywords
                }
            }
            Err(e) => {
                warn!(error = %e, "keyword generation failed, using title tokens");
                fallback_keywords(title, user_prompt, max_keywords)
            }
        }
    }
}

/// Extract keyword candidates from a model reply, de-duplicated in order.
pub fn parse_keywords(reply: &str, max_keywords: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();
    for m in KEYWORD_RE.find_iter(reply) {
        let kw = m.as_str().to_string();
        if seen.insert(kw.to_lowercase()) {
            keywords.push(kw);
            if keywords.len() >= max_keywords {
                break;
            }
        }
    }
    keywords
}

/// Fallback: tokenize the title (and user prompt) and keep the substantive
/// tokens.
pub fn fallback_keywords(title: &str, user_prompt: Option<&str>, max_keywords: usize) -> Vec<String> {
    let mut text = title.to_string();
    if let Some(prompt) = user_prompt {
        text.push(' ');
        text.push_str(prompt);
    }
    let mut keywords = newsdesk_analysis::events::tokenize(&text);
    keywords.dedup();
    keywords.truncate(max_keywords);
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_reply_parsed() {
        let kws = parse_keywords("Venezuela, Maduro, oil policy, economy", 10);
        assert_eq!(kws, vec!["Venezuela", "Maduro", "oil", "policy", "economy"]);
    }

    #[test]
    fn mixed_script_reply_parsed() {
        let kws = parse_keywords("哈萨克斯坦, Қазақстан, economy, экономика", 10);
        assert!(kws.iter().any(|k| k == "哈萨克斯坦"));
        assert!(kws.iter().any(|k| k == "Қазақстан"));
        assert!(kws.iter().any(|k| k == "economy"));
        assert!(kws.iter().any(|k| k == "экономика"));
    }

    #[test]
    fn duplicates_removed_case_insensitively() {
        let kws = parse_keywords("Economy, economy, ECONOMY, trade", 10);
        assert_eq!(kws, vec!["Economy", "trade"]);
    }

    #[test]
    fn max_keywords_cap_applies() {
        let kws = parse_keywords("one, two, three, four, five", 3);
        assert_eq!(kws.len(), 3);
    }

    #[test]
    fn fallback_uses_title_tokens() {
        let kws = fallback_keywords("Weekly report on pipeline exports", None, 10);
        assert!(kws.iter().any(|k| k == "pipeline"));
        assert!(kws.iter().any(|k| k == "exports"));
        assert!(!kws.iter().any(|k| k == "on"));
    }
}
