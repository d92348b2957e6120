//! Citation tracking for generated reports: a reference registry keyed by
//! article id, inline marker normalization, validation, and the final
//! References block.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));
static PAREN_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)").expect("valid regex"));
static CJK_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【(\d+)】").expect("valid regex"));

/// One entry in a report's reference list.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub article_id: i64,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub citation_count: u32,
}

impl Reference {
    fn render(&self, index: usize) -> String {
        let mut lines = vec![format!("{index}. **{}**", self.title)];
        if let Some(author) = &self.author {
            lines.push(format!("   Author: {author}"));
        }
        if let Some(source) = &self.source_name {
            lines.push(format!("   Source: {source}"));
        }
        if let Some(published) = &self.publish_time {
            lines.push(format!("   Published: {}", published.format("%Y-%m-%d %H:%M")));
        }
        lines.push(format!("   Link: {}", self.url));
        if let Some(excerpt) = &self.excerpt {
            let cut: String = excerpt.chars().take(100).collect();
            lines.push(format!("   Excerpt: {cut}..."));
        }
        lines.join("\n")
    }
}

/// Outcome of checking a report's inline markers against its references.
#[derive(Debug, Serialize)]
pub struct CitationValidation {
    pub valid: bool,
    pub cited_count: usize,
    pub total_references: usize,
    /// Markers pointing past the reference list.
    pub invalid_indices: Vec<u32>,
    /// References never cited in the text.
    pub uncited_indices: Vec<u32>,
}

/// Registry of references for one report. Citation indices are dense 1..N
/// in first-registration order.
#[derive(Default)]
pub struct ReferenceManager {
    ordered: Vec<Reference>,
    index_by_article: HashMap<i64, usize>,
}

impl ReferenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an article and return its 1-based citation index. Repeat
    /// registrations bump the citation count and return the original index.
    pub fn add_reference(&mut self, reference: Reference) -> usize {
        if let Some(&pos) = self.index_by_article.get(&reference.article_id) {
            self.ordered[pos].citation_count += 1;
            return pos + 1;
        }
        let mut reference = reference;
        reference.citation_count = 1;
        self.index_by_article
            .insert(reference.article_id, self.ordered.len());
        self.ordered.push(reference);
        self.ordered.len()
    }

    pub fn index_of(&self, article_id: i64) -> Option<usize> {
        self.index_by_article.get(&article_id).map(|pos| pos + 1)
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Reference> {
        if index == 0 {
            return None;
        }
        self.ordered.get(index - 1)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn references(&self) -> &[Reference] {
        &self.ordered
    }

    /// Scan the text for `[k]` markers; flag markers beyond the reference
    /// list and references the text never cites.
    pub fn validate(&self, text: &str) -> CitationValidation {
        let cited: std::collections::HashSet<u32> = MARKER_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse().ok())
            .collect();

        let total = self.ordered.len() as u32;
        let mut invalid: Vec<u32> = cited.iter().copied().filter(|&k| k == 0 || k > total).collect();
        let mut uncited: Vec<u32> = (1..=total).filter(|k| !cited.contains(k)).collect();
        invalid.sort();
        uncited.sort();

        CitationValidation {
            valid: invalid.is_empty(),
            cited_count: cited.len(),
            total_references: self.ordered.len(),
            invalid_indices: invalid,
            uncited_indices: uncited,
        }
    }

    /// Deterministic `## References` block in citation order.
    pub fn render_references(&self) -> String {
        if self.ordered.is_empty() {
            return "## References\n\nNo references cited.".to_string();
        }
        let mut parts = vec!["## References\n".to_string()];
        for (i, reference) in self.ordered.iter().enumerate() {
            parts.push(reference.render(i + 1));
        }
        parts.join("\n\n")
    }

    /// Normalize inline markers and append the reference block.
    pub fn format_report(&self, content: &str) -> String {
        let normalized = normalize_markers(content);
        format!("{normalized}\n\n{}", self.render_references())
    }
}

/// Rewrite `(1)` and `【1】` style markers to the canonical `[1]`.
pub fn normalize_markers(text: &str) -> String {
    let text = PAREN_MARKER_RE.replace_all(text, "[$1]");
    CJK_MARKER_RE.replace_all(&text, "[$1]").to_string()
}

/// Marker extraction utilities for downstream consumers.
pub struct CitationParser;

impl CitationParser {
    /// Every citation index in the text, in order of appearance.
    pub fn extract_indices(text: &str) -> Vec<u32> {
        MARKER_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse().ok())
            .collect()
    }

    /// Citation markers with the text around them.
    pub fn extract_with_context(text: &str, window: usize) -> Vec<(u32, String)> {
        let mut out = Vec::new();
        for m in MARKER_RE.find_iter(text) {
            let index: u32 = match text[m.start() + 1..m.end() - 1].parse() {
                Ok(i) => i,
                Err(_) => continue,
            };
            let start = m.start().saturating_sub(window);
            let end = (m.end() + window).min(text.len());
            // Clamp to char boundaries for multi-byte text.
            let start = (0..=start).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
            let end = (end..=text.len()).find(|&i| text.is_char_boundary(i)).unwrap_or(text.len());
            out.push((index, text[start..end].trim().to_string()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(article_id: i64, title: &str) -> Reference {
        Reference {
            article_id,
            title: title.to_string(),
            url: format!("https://example.com/{article_id}"),
            source_name: Some("Example News".to_string()),
            publish_time: None,
            author: None,
            excerpt: None,
            citation_count: 0,
        }
    }

    #[test]
    fn indices_assigned_in_registration_order() {
        let mut manager = ReferenceManager::new();
        assert_eq!(manager.add_reference(reference(10, "First")), 1);
        assert_eq!(manager.add_reference(reference(20, "Second")), 2);
        assert_eq!(manager.add_reference(reference(30, "Third")), 3);
        assert_eq!(manager.index_of(20), Some(2));
    }

    #[test]
    fn re_registration_returns_existing_index() {
        let mut manager = ReferenceManager::new();
        manager.add_reference(reference(10, "First"));
        manager.add_reference(reference(20, "Second"));
        assert_eq!(manager.add_reference(reference(10, "First")), 1);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.references()[0].citation_count, 2);
    }

    #[test]
    fn markers_normalized_to_brackets() {
        assert_eq!(normalize_markers("claim (1) and 【2】 and [3]"), "claim [1] and [2] and [3]");
    }

    #[test]
    fn validation_flags_invalid_and_uncited() {
        let mut manager = ReferenceManager::new();
        manager.add_reference(reference(1, "A"));
        manager.add_reference(reference(2, "B"));
        manager.add_reference(reference(3, "C"));

        let result = manager.validate("Cites [1] and [5].");
        assert!(!result.valid);
        assert_eq!(result.invalid_indices, vec![5]);
        assert_eq!(result.uncited_indices, vec![2, 3]);
        assert_eq!(result.cited_count, 2);
        assert_eq!(result.total_references, 3);
    }

    #[test]
    fn validation_passes_when_all_cited() {
        let mut manager = ReferenceManager::new();
        manager.add_reference(reference(1, "A"));
        manager.add_reference(reference(2, "B"));
        let result = manager.validate("Both [1] and [2] appear.");
        assert!(result.valid);
        assert!(result.uncited_indices.is_empty());
    }

    #[test]
    fn cited_indices_are_subset_of_reference_range() {
        let mut manager = ReferenceManager::new();
        manager.add_reference(reference(1, "A"));
        manager.add_reference(reference(2, "B"));
        let result = manager.validate("Only [2] here.");
        assert!(result.valid, "indices within 1..N are valid");
        assert_eq!(result.uncited_indices, vec![1]);
    }

    #[test]
    fn references_block_renders_in_order() {
        let mut manager = ReferenceManager::new();
        manager.add_reference(reference(10, "First story"));
        manager.add_reference(reference(20, "Second story"));
        let block = manager.render_references();
        assert!(block.starts_with("## References"));
        let first = block.find("First story").unwrap();
        let second = block.find("Second story").unwrap();
        assert!(first < second);
        assert!(block.contains("1. **First story**"));
        assert!(block.contains("2. **Second story**"));
    }

    #[test]
    fn empty_registry_renders_placeholder() {
        let manager = ReferenceManager::new();
        assert!(manager.render_references().contains("No references cited."));
    }

    #[test]
    fn parser_extracts_indices_in_order() {
        assert_eq!(CitationParser::extract_indices("[2] then [1] then [2]"), vec![2, 1, 2]);
    }

    #[test]
    fn parser_context_window() {
        let out = CitationParser::extract_with_context("alpha beta [1] gamma delta", 6);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, 1);
        assert!(out[0].1.contains("beta [1] gamma"));
    }
}
