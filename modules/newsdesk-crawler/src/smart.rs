//! Selector-free fallback extraction. Salvages title/content/time when the
//! configured selectors fail or a site changed its layout.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::time::TimeExtractor;

/// Content shorter than this is treated as noise.
const MIN_TEXT_LENGTH: usize = 50;

/// Class/id fragments that mark boilerplate elements.
static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = concat!(
        r"(?i)\b(nav|navigation|menu|header|footer|sidebar|side-bar|widget|banner|ad|ads|",
        r"comment|comments|share|button|btn|subscribe|follow|like|social|related|recommend|",
        r"popular|trending|tag|tags|category|author-info|breadcrumb|advertisement|sponsored|promo)\b",
    );
    Regex::new(pattern).expect("valid regex")
});

static JS_REQUIRED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(javascript\s*required|enable\s*javascript|请启用|请开启)").expect("valid regex")
});

/// Result of a heuristic extraction pass.
#[derive(Debug, Default)]
pub struct SmartExtraction {
    pub title: Option<String>,
    pub content: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
}

pub struct SmartExtractor {
    time_extractor: TimeExtractor,
}

impl SmartExtractor {
    pub fn new() -> Self {
        Self {
            time_extractor: TimeExtractor::new(),
        }
    }

    /// Extract title, content, and publish time without any site-specific
    /// configuration.
    pub fn extract_all(&self, html: &str, url: &str) -> SmartExtraction {
        let doc = Html::parse_document(html);

        let title = self.extract_title(&doc);
        let content = self.extract_content(&doc);
        let publish_time = self.time_extractor.extract_publish_time(html, url);

        if content.is_none() {
            debug!(url, "smart extractor found no usable content");
        }

        SmartExtraction {
            title,
            content,
            publish_time,
        }
    }

    /// Title preference: h1, then <title> with its " - site" suffix
    /// stripped, then og:title, then the first substantial heading.
    fn extract_title(&self, doc: &Html) -> Option<String> {
        if let Ok(h1) = Selector::parse("h1") {
            if let Some(el) = doc.select(&h1).next() {
                let title = clean_text(&element_text(&el));
                if title.len() > 5 && title.len() < 200 {
                    return Some(title);
                }
            }
        }

        if let Ok(title_sel) = Selector::parse("title") {
            if let Some(el) = doc.select(&title_sel).next() {
                let raw = clean_text(&element_text(&el));
                static SUFFIX_RE: LazyLock<Regex> =
                    LazyLock::new(|| Regex::new(r"\s*[-_|–:].*$").expect("valid regex"));
                let title = SUFFIX_RE.replace(&raw, "").trim().to_string();
                if title.len() > 5 {
                    return Some(title);
                }
            }
        }

        if let Ok(og) = Selector::parse(r#"meta[property="og:title"], meta[name="og:title"]"#) {
            if let Some(el) = doc.select(&og).next() {
                if let Some(content) = el.value().attr("content") {
                    let title = clean_text(content);
                    if title.len() > 5 {
                        return Some(title);
                    }
                }
            }
        }

        for tag in ["h2", "h3", "h4", "h5", "h6"] {
            if let Ok(sel) = Selector::parse(tag) {
                if let Some(el) = doc.select(&sel).next() {
                    let title = clean_text(&element_text(&el));
                    if title.len() > 10 {
                        return Some(title);
                    }
                }
            }
        }

        None
    }

    /// Content preference: <article>/<main>, else the densest non-noise
    /// <div>, else a concatenation of substantive paragraphs.
    fn extract_content(&self, doc: &Html) -> Option<String> {
        for tag in ["article", "main"] {
            if let Ok(sel) = Selector::parse(tag) {
                if let Some(el) = doc.select(&sel).next() {
                    let text = self.text_without_noise(&el);
                    if text.len() > MIN_TEXT_LENGTH {
                        return Some(text);
                    }
                }
            }
        }

        let div_sel = Selector::parse("div").ok()?;
        let mut best: Option<String> = None;
        for div in doc.select(&div_sel).take(100) {
            if is_noise(&div) {
                continue;
            }
            let text = self.text_without_noise(&div);
            if text.len() > MIN_TEXT_LENGTH
                && text.len() > best.as_ref().map(|b| b.len()).unwrap_or(0)
            {
                best = Some(text);
            }
        }
        if best.is_some() {
            return best;
        }

        let p_sel = Selector::parse("p").ok()?;
        let parts: Vec<String> = doc
            .select(&p_sel)
            .take(50)
            .map(|p| clean_text(&element_text(&p)))
            .filter(|t| t.len() > 20)
            .collect();
        if parts.is_empty() {
            None
        } else {
            let joined = parts.join(" ");
            (joined.len() > MIN_TEXT_LENGTH).then_some(joined)
        }
    }

    /// Text of an element, skipping script/style/noise descendants.
    fn text_without_noise(&self, root: &ElementRef) -> String {
        let mut parts: Vec<String> = Vec::new();
        collect_text(root, &mut parts);
        clean_text(&parts.join(" "))
    }
}

impl Default for SmartExtractor {
    fn default() -> Self {
        Self::new()
    }
}

const DROP_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "svg"];

fn collect_text(el: &ElementRef, out: &mut Vec<String>) {
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                let t = text.trim();
                if !t.is_empty() {
                    out.push(t.to_string());
                }
            }
            scraper::Node::Element(element) => {
                let name = element.name();
                if DROP_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    if is_noise(&child_ref) {
                        continue;
                    }
                    collect_text(&child_ref, out);
                }
            }
            _ => {}
        }
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn is_noise(el: &ElementRef) -> bool {
    let value = el.value();
    let mut combined = String::new();
    for class in value.classes() {
        combined.push_str(class);
        combined.push(' ');
    }
    if let Some(id) = value.id() {
        combined.push_str(id);
    }
    !combined.is_empty() && NOISE_RE.is_match(&combined)
}

fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if JS_REQUIRED_RE.is_match(&collapsed) {
        return String::new();
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_h1_title() {
        let html = r#"<html><head><title>Story - Example Site</title></head>
            <body><h1>Parliament passes budget amendment</h1></body></html>"#;
        let result = SmartExtractor::new().extract_all(html, "https://example.com/a");
        assert_eq!(result.title.as_deref(), Some("Parliament passes budget amendment"));
    }

    #[test]
    fn strips_site_suffix_from_title_tag() {
        let html = r#"<html><head><title>Budget amendment passes - Example News</title></head>
            <body></body></html>"#;
        let result = SmartExtractor::new().extract_all(html, "https://example.com/a");
        assert_eq!(result.title.as_deref(), Some("Budget amendment passes"));
    }

    #[test]
    fn article_tag_preferred_for_content() {
        let html = r#"<html><body>
            <nav class="menu">Home News Sports Weather and a lot of navigation text</nav>
            <article>The national assembly voted on Tuesday to amend the annual budget,
            shifting funds toward infrastructure projects in the northern provinces.</article>
        </body></html>"#;
        let result = SmartExtractor::new().extract_all(html, "https://example.com/a");
        let content = result.content.unwrap();
        assert!(content.contains("national assembly"));
        assert!(!content.contains("Sports"));
    }

    #[test]
    fn noise_divs_are_skipped() {
        let html = r#"<html><body>
            <div class="sidebar">Related stories, trending now, subscribe to our newsletter,
            follow us on social media, more links and widgets everywhere.</div>
            <div class="story-body">Officials confirmed the pipeline will resume operation
            next month after a prolonged maintenance shutdown affecting exports.</div>
        </body></html>"#;
        let result = SmartExtractor::new().extract_all(html, "https://example.com/a");
        let content = result.content.unwrap();
        assert!(content.contains("pipeline"));
        assert!(!content.contains("newsletter"));
    }

    #[test]
    fn paragraph_fallback() {
        let html = r#"<html><body>
            <p>First substantial paragraph with enough characters to matter here.</p>
            <p>ok</p>
            <p>Second substantial paragraph, also well above the twenty char floor.</p>
        </body></html>"#;
        let result = SmartExtractor::new().extract_all(html, "https://example.com/a");
        let content = result.content.unwrap();
        assert!(content.contains("First substantial"));
        assert!(content.contains("Second substantial"));
        assert!(!content.contains(" ok "));
    }

    #[test]
    fn javascript_required_rejected() {
        let html = r#"<html><body>
            <div class="content">Please enable JavaScript to view this page.</div>
        </body></html>"#;
        let result = SmartExtractor::new().extract_all(html, "https://example.com/a");
        assert!(result.content.is_none());
    }

    #[test]
    fn short_content_rejected() {
        let html = "<html><body><article>Too short.</article></body></html>";
        let result = SmartExtractor::new().extract_all(html, "https://example.com/a");
        assert!(result.content.is_none());
    }
}
