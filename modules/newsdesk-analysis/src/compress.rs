//! Content compression for prompt budgets: markdown stripping, paragraph
//! trimming, and a rough token estimate for context assembly.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_SUMMARY_LENGTH: usize = 500;
pub const MAX_FULL_LENGTH: usize = 3000;

/// How much of an article's body survives compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    TitleOnly,
    Summary,
    Full,
}

/// A compressed view of one article, ready for prompt assembly.
#[derive(Debug, Clone, Serialize)]
pub struct CompressedArticle {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub original_length: usize,
    pub compressed_length: usize,
}

pub struct ContentCompressor {
    max_summary_length: usize,
    max_full_length: usize,
}

impl ContentCompressor {
    pub fn new(max_summary_length: usize, max_full_length: usize) -> Self {
        Self {
            max_summary_length,
            max_full_length,
        }
    }

    pub fn compress(
        &self,
        id: i64,
        url: &str,
        title: &str,
        content: &str,
        mode: CompressionMode,
    ) -> CompressedArticle {
        let compressed_content = match mode {
            CompressionMode::TitleOnly => None,
            CompressionMode::Summary => self.to_summary(content),
            CompressionMode::Full => self.to_full(content),
        };
        CompressedArticle {
            id,
            url: url.to_string(),
            title: compress_title(title),
            original_length: content.chars().count(),
            compressed_length: compressed_content
                .as_deref()
                .map(|c| c.chars().count())
                .unwrap_or(0),
            content: compressed_content,
        }
    }

    /// First paragraph, markdown stripped, truncated to the summary budget.
    fn to_summary(&self, content: &str) -> Option<String> {
        let plain = strip_markdown(content);
        let paragraphs = split_paragraphs(&plain);
        let first = paragraphs.first()?;
        Some(truncate_chars(first, self.max_summary_length))
    }

    /// Leading paragraphs up to the full-content budget.
    fn to_full(&self, content: &str) -> Option<String> {
        let plain = strip_markdown(content);
        let paragraphs = split_paragraphs(&plain);
        if paragraphs.is_empty() {
            return None;
        }

        let mut kept = Vec::new();
        let mut length = 0usize;
        for para in &paragraphs {
            let para_len = para.chars().count();
            if length + para_len > self.max_full_length {
                break;
            }
            kept.push(para.as_str());
            length += para_len;
        }
        if kept.is_empty() {
            // A single oversized paragraph still yields a truncated body.
            return Some(truncate_chars(&paragraphs[0], self.max_full_length));
        }
        Some(kept.join("\n\n"))
    }
}

impl Default for ContentCompressor {
    fn default() -> Self {
        Self::new(MAX_SUMMARY_LENGTH, MAX_FULL_LENGTH)
    }
}

fn compress_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return "Untitled".to_string();
    }
    truncate_chars(trimmed, MAX_TITLE_LENGTH)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));
static MD_BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("valid regex"));
static MD_EMPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*|_([^_]+)_").expect("valid regex"));
static MD_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#+\s+").expect("valid regex"));
static MD_CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^`]*```").expect("valid regex"));
static MD_INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
static MD_QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^>\s+").expect("valid regex"));
static MD_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+\.)\s+").expect("valid regex"));
static MD_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

/// Strip markdown decoration, keeping the visible text.
pub fn strip_markdown(text: &str) -> String {
    let text = MD_CODE_BLOCK_RE.replace_all(text, "");
    let text = MD_IMAGE_RE.replace_all(&text, "");
    let text = MD_LINK_RE.replace_all(&text, "$1");
    let text = MD_BOLD_RE.replace_all(&text, "$1$2");
    let text = MD_EMPH_RE.replace_all(&text, "$1$2");
    let text = MD_INLINE_CODE_RE.replace_all(&text, "$1");
    let text = MD_HEADING_RE.replace_all(&text, "");
    let text = MD_QUOTE_RE.replace_all(&text, "");
    let text = MD_LIST_RE.replace_all(&text, "");
    text.trim().to_string()
}

fn split_paragraphs(text: &str) -> Vec<String> {
    static PARA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));
    PARA_RE
        .split(text.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Assembles article context for LLM prompts under a token budget.
pub struct ContextBuilder {
    compressor: ContentCompressor,
    max_tokens: usize,
}

impl ContextBuilder {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            compressor: ContentCompressor::default(),
            max_tokens,
        }
    }

    /// Numbered article list, summaries included, cut off when the token
    /// estimate would overflow the budget.
    pub fn build_prompt_context(&self, articles: &[(i64, String, String, String)]) -> String {
        let mut parts = Vec::new();
        let mut used = 0usize;

        for (i, (id, url, title, content)) in articles.iter().enumerate() {
            let compressed =
                self.compressor
                    .compress(*id, url, title, content, CompressionMode::Summary);
            let block = format!(
                "{}. {}\n{}\nSource: {}\n",
                i + 1,
                compressed.title,
                compressed.content.as_deref().unwrap_or(""),
                compressed.url,
            );
            let cost = estimate_tokens(&block);
            if used + cost > self.max_tokens {
                break;
            }
            used += cost;
            parts.push(block);
        }

        parts.join("\n")
    }
}

/// Rough token estimate: ~4 chars per token for mixed prose.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_keeps_first_paragraph() {
        let compressor = ContentCompressor::default();
        let content = "First paragraph of the story.\n\nSecond paragraph with more detail.";
        let out = compressor.compress(1, "https://e.com", "Title here", content, CompressionMode::Summary);
        assert_eq!(out.content.as_deref(), Some("First paragraph of the story."));
        assert_eq!(out.original_length, content.chars().count());
    }

    #[test]
    fn long_summary_truncated_with_ellipsis() {
        let compressor = ContentCompressor::new(50, 3000);
        let content = "x".repeat(200);
        let out = compressor.compress(1, "u", "t", &content, CompressionMode::Summary);
        let summary = out.content.unwrap();
        assert_eq!(summary.chars().count(), 50);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn full_mode_keeps_paragraphs_under_budget() {
        let compressor = ContentCompressor::new(500, 100);
        let content = format!("{}\n\n{}\n\n{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        let out = compressor.compress(1, "u", "t", &content, CompressionMode::Full);
        let full = out.content.unwrap();
        assert!(full.contains(&"a".repeat(40)));
        assert!(full.contains(&"b".repeat(40)));
        assert!(!full.contains(&"c".repeat(40)), "third paragraph overflows the budget");
    }

    #[test]
    fn title_only_drops_content() {
        let compressor = ContentCompressor::default();
        let out = compressor.compress(1, "u", "A title", "body", CompressionMode::TitleOnly);
        assert!(out.content.is_none());
        assert_eq!(out.compressed_length, 0);
    }

    #[test]
    fn empty_title_becomes_untitled() {
        let compressor = ContentCompressor::default();
        let out = compressor.compress(1, "u", "  ", "body", CompressionMode::TitleOnly);
        assert_eq!(out.title, "Untitled");
    }

    #[test]
    fn markdown_stripped() {
        let md = "# Heading\n\nSome **bold** and *italic* with a [link](https://e.com) and `code`.\n\n- item one\n- item two\n\n> a quote";
        let plain = strip_markdown(md);
        assert!(!plain.contains('#'));
        assert!(!plain.contains("**"));
        assert!(!plain.contains("]("));
        assert!(plain.contains("bold"));
        assert!(plain.contains("link"));
        assert!(plain.contains("item one"));
        assert!(plain.contains("a quote"));
    }

    #[test]
    fn token_estimate_scales_with_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn context_builder_respects_budget() {
        let builder = ContextBuilder::new(30);
        let articles = vec![
            (1, "https://e.com/1".to_string(), "First".to_string(), "Body one.".to_string()),
            (2, "https://e.com/2".to_string(), "Second".to_string(), "Body two.".to_string()),
            (3, "https://e.com/3".to_string(), "Third".to_string(), "Body three.".to_string()),
        ];
        let context = builder.build_prompt_context(&articles);
        assert!(context.contains("First"));
        assert!(!context.contains("Third"), "budget should cut off later articles");
    }
}
