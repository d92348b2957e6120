//! Universal article scraper: configured-selector extraction with a
//! heuristic fallback, UA rotation, and a bounded retry ladder. `scrape`
//! never fails at the call boundary; errors ride in the result record.

use std::sync::LazyLock;
use std::time::Duration;

use rand::seq::IndexedRandom;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use newsdesk_common::{ParserConfig, ScrapedArticle};

use crate::smart::SmartExtractor;
use crate::time::{extract_date_from_text, parse_datetime_str, TimeExtractor};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Below this content length the smart extractor gets a chance to do better.
const SMART_FALLBACK_THRESHOLD: usize = 100;
const MAX_IMAGES: usize = 20;
const MAX_TAGS: usize = 10;

/// Modern desktop/mobile browser User-Agents, rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Mobile/15E148 Safari/604.1",
];

pub struct UniversalScraper {
    client: reqwest::Client,
    time_extractor: TimeExtractor,
    smart_extractor: SmartExtractor,
}

impl UniversalScraper {
    pub fn new(timeout: Duration, insecure_tls: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure_tls)
            .build()
            .expect("Failed to build HTTP client");
        Self::with_client(client)
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            time_extractor: TimeExtractor::new(),
            smart_extractor: SmartExtractor::new(),
        }
    }

    /// Scrape one article. Network and parse failures populate `error`;
    /// the caller decides the pending-row transition.
    pub async fn scrape(&self, url: &str, config: &ParserConfig, source_id: i64) -> ScrapedArticle {
        debug!(
            url,
            source_id,
            title_selector = %config.title_selector,
            content_selector = %config.content_selector,
            "scraping article"
        );

        let html = match self.fetch_html(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url, error = %e, "article fetch failed");
                return ScrapedArticle::failed(url, e);
            }
        };

        let mut article = extract_with_config(&html, url, config);
        article.publish_time = article
            .publish_time
            .or_else(|| self.time_extractor.extract_publish_time(&html, url));

        // Smart fallback when the configured selectors came up short.
        let content_len = article.content.as_deref().map(str::len).unwrap_or(0);
        if content_len < SMART_FALLBACK_THRESHOLD {
            debug!(url, content_len, "content too short, trying smart extractor");
            let smart = self.smart_extractor.extract_all(&html, url);
            if let Some(smart_title) = smart.title {
                let current_len = article.title.as_deref().map(str::len).unwrap_or(0);
                if smart_title.len() > current_len {
                    article.title = Some(smart_title);
                }
            }
            if let Some(smart_content) = smart.content {
                if smart_content.len() > SMART_FALLBACK_THRESHOLD {
                    article.content = Some(smart_content);
                }
            }
            if article.publish_time.is_none() {
                article.publish_time = smart.publish_time;
            }
        }

        info!(
            url,
            title_len = article.title.as_deref().map(str::len).unwrap_or(0),
            content_len = article.content.as_deref().map(str::len).unwrap_or(0),
            has_time = article.publish_time.is_some(),
            "scrape complete"
        );
        article
    }

    /// GET with UA rotation and the retry ladder: 403 rotates the agent and
    /// backs off 1s, 404 short-circuits, 5xx retries with linear backoff.
    pub async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let mut last_error = String::from("max retries exceeded");

        for attempt in 0..MAX_ATTEMPTS {
            let ua = USER_AGENTS
                .choose(&mut rand::rng())
                .copied()
                .unwrap_or(USER_AGENTS[0]);

            let result = self
                .client
                .get(url)
                .header("User-Agent", ua)
                .header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
                )
                .header("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8,ru;q=0.7,kk;q=0.6")
                .header("Upgrade-Insecure-Requests", "1")
                .header("Sec-Fetch-Dest", "document")
                .header("Sec-Fetch-Mode", "navigate")
                .header("Sec-Fetch-Site", "none")
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(|e| e.to_string());
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err("HTTP 404".to_string());
                    }
                    last_error = format!("HTTP {status}");
                    if status == reqwest::StatusCode::FORBIDDEN {
                        warn!(url, attempt = attempt + 1, "403, rotating user agent");
                        tokio::time::sleep(RETRY_DELAY).await;
                    } else if status.is_server_error() {
                        tokio::time::sleep(RETRY_DELAY * (attempt + 1)).await;
                    } else {
                        return Err(last_error);
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 < MAX_ATTEMPTS {
                        warn!(url, attempt = attempt + 1, error = %last_error, "fetch failed, retrying");
                        tokio::time::sleep(RETRY_DELAY * (attempt + 1)).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}

/// Sleep out the per-source politeness budget between article fetches.
pub async fn politeness_pause(crawl_delay: Option<f64>, default_secs: f64) {
    let secs = crawl_delay.unwrap_or(default_secs).max(0.0);
    if secs > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

/// Selector-driven extraction over one parsed document. Pure so the DOM
/// never crosses an await point.
fn extract_with_config(html: &str, url: &str, config: &ParserConfig) -> ScrapedArticle {
    let doc = Html::parse_document(html);

    let title = select_text(&doc, &config.title_selector);
    let content = select_markdown(&doc, &config.content_selector, url);
    let author = config
        .author_selector
        .as_deref()
        .and_then(|sel| select_text(&doc, sel));

    let publish_time = config.publish_time_selector.as_deref().and_then(|sel| {
        let raw = select_text(&doc, sel)?;
        parse_datetime_str(&raw).or_else(|| extract_date_from_text(&raw))
    });

    let (images, tags) = collect_media_and_tags(&doc, config, url);

    ScrapedArticle {
        url: url.to_string(),
        title,
        content,
        publish_time,
        author,
        images,
        tags,
        error: None,
    }
}

/// First match across comma-separated selector fallbacks, as plain text.
fn select_text(doc: &Html, selector: &str) -> Option<String> {
    for part in selector.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Ok(sel) = Selector::parse(part) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            let text = el
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                return Some(text);
            }
            // A <time> element may carry the value only in its attribute.
            if let Some(datetime) = el.value().attr("datetime") {
                return Some(datetime.to_string());
            }
        }
    }
    None
}

static MD_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").expect("valid regex"));

/// First match across comma-separated selector fallbacks, converted to
/// Markdown. Links, images, and emphasis survive; images whose target is
/// clearly not an image are stripped afterward.
fn select_markdown(doc: &Html, selector: &str, base_url: &str) -> Option<String> {
    for part in selector.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Ok(sel) = Selector::parse(part) else {
            continue;
        };
        if let Some(el) = doc.select(&sel).next() {
            let subtree = el.html();
            let markdown = match htmd::convert(&subtree) {
                Ok(md) => md,
                Err(e) => {
                    debug!(error = %e, "markdown conversion failed");
                    continue;
                }
            };
            let cleaned = strip_non_image_links(&markdown, base_url);
            let trimmed = cleaned.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Remove markdown image references whose URL fails the image heuristic.
fn strip_non_image_links(markdown: &str, base_url: &str) -> String {
    MD_IMAGE_RE
        .replace_all(markdown, |caps: &regex::Captures| {
            let target = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let absolute = resolve_url(base_url, target);
            if is_image_url(&absolute) {
                caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default()
            } else {
                String::new()
            }
        })
        .to_string()
}

/// Absolute image URLs from `img[src]` and `picture > source[srcset]`,
/// de-duplicated and capped, plus up to 10 tags from `article:tag` and
/// `meta[name=keywords]`.
fn collect_media_and_tags(
    doc: &Html,
    config: &ParserConfig,
    base_url: &str,
) -> (Vec<String>, Vec<String>) {
    let mut images: Vec<String> = Vec::new();
    let mut push_image = |url: String| {
        if images.len() < MAX_IMAGES && is_image_url(&url) && !images.contains(&url) {
            images.push(url);
        }
    };

    // Scope image collection to the content subtree when it resolves.
    let content_sel = config
        .content_selector
        .split(',')
        .filter_map(|p| Selector::parse(p.trim()).ok())
        .next();
    let scope = content_sel.as_ref().and_then(|sel| doc.select(sel).next());

    if let Ok(img_sel) = Selector::parse("img[src]") {
        let elements: Vec<_> = match scope {
            Some(root) => root.select(&img_sel).collect(),
            None => doc.select(&img_sel).collect(),
        };
        for img in elements {
            if let Some(src) = img.value().attr("src") {
                push_image(resolve_url(base_url, src));
            }
        }
    }

    if let Ok(source_sel) = Selector::parse("picture > source[srcset]") {
        let elements: Vec<_> = match scope {
            Some(root) => root.select(&source_sel).collect(),
            None => doc.select(&source_sel).collect(),
        };
        for source in elements {
            if let Some(srcset) = source.value().attr("srcset") {
                for item in srcset.split(',') {
                    if let Some(url_part) = item.trim().split_whitespace().next() {
                        push_image(resolve_url(base_url, url_part));
                    }
                }
            }
        }
    }

    let mut tags: Vec<String> = Vec::new();
    if let Ok(tag_sel) = Selector::parse(r#"meta[property="article:tag"]"#) {
        for meta in doc.select(&tag_sel) {
            if let Some(tag) = meta.value().attr("content") {
                let tag = tag.trim().to_string();
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
    }
    if let Ok(kw_sel) = Selector::parse(r#"meta[name="keywords"]"#) {
        for meta in doc.select(&kw_sel) {
            if let Some(keywords) = meta.value().attr("content") {
                for kw in keywords.split(',') {
                    let kw = kw.trim().to_string();
                    if !kw.is_empty() && !tags.contains(&kw) {
                        tags.push(kw);
                    }
                }
            }
        }
    }
    tags.truncate(MAX_TAGS);

    (images, tags)
}

fn resolve_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];
const IMAGE_PATH_HINTS: &[&str] = &["/image", "/img", "/photo", "/upload", "/media", "/static"];
const PAGE_EXTENSIONS: &[&str] = &[".html", ".htm", ".php", ".aspx", ".jsp"];

/// Whether a URL plausibly points at an image: known extension or a CDN-ish
/// path hint, and not an obvious page URL.
pub fn is_image_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());

    if PAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }
    IMAGE_PATH_HINTS.iter().any(|hint| path.contains(hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ParserConfig {
        ParserConfig {
            title_selector: "h1.headline, h1".to_string(),
            content_selector: ".article-body, article".to_string(),
            publish_time_selector: Some("time".to_string()),
            author_selector: Some(".byline".to_string()),
            ..Default::default()
        }
    }

    const PAGE: &str = r#"<html><head>
        <meta property="article:tag" content="economy">
        <meta name="keywords" content="budget, parliament">
    </head><body>
        <h1 class="headline">Budget approved</h1>
        <div class="byline">Jane Doe</div>
        <time datetime="2024-05-20T08:30:00Z">2024-05-20 08:30:00</time>
        <article>
            <p>The committee approved the <strong>annual budget</strong> on Monday.</p>
            <img src="/media/photos/vote.jpg">
            <img src="/news/related.html">
            <a href="https://example.com/more">Read more</a>
        </article>
    </body></html>"#;

    #[test]
    fn selector_extraction_pulls_all_fields() {
        let article = extract_with_config(PAGE, "https://example.com/2024/05/20/budget", &config());
        assert_eq!(article.title.as_deref(), Some("Budget approved"));
        assert_eq!(article.author.as_deref(), Some("Jane Doe"));
        let content = article.content.unwrap();
        assert!(content.contains("annual budget"));
        assert!(article.publish_time.is_some());
    }

    #[test]
    fn comma_fallback_selector_used_when_first_misses() {
        let html = "<html><body><h1>Only plain h1</h1><article><p>Body text that is long enough.</p></article></body></html>";
        let article = extract_with_config(html, "https://example.com/a", &config());
        assert_eq!(article.title.as_deref(), Some("Only plain h1"));
    }

    #[test]
    fn images_collected_with_heuristic() {
        let article = extract_with_config(PAGE, "https://example.com/2024/05/20/budget", &config());
        assert_eq!(article.images, vec!["https://example.com/media/photos/vote.jpg"]);
    }

    #[test]
    fn tags_merged_from_meta() {
        let article = extract_with_config(PAGE, "https://example.com/2024/05/20/budget", &config());
        assert_eq!(article.tags, vec!["economy", "budget", "parliament"]);
    }

    #[test]
    fn markdown_preserves_links_and_emphasis() {
        let article = extract_with_config(PAGE, "https://example.com/2024/05/20/budget", &config());
        let content = article.content.unwrap();
        assert!(content.contains("**annual budget**"));
        assert!(content.contains("https://example.com/more"));
    }

    #[test]
    fn non_image_img_tags_stripped_from_markdown() {
        let article = extract_with_config(PAGE, "https://example.com/2024/05/20/budget", &config());
        let content = article.content.unwrap();
        assert!(!content.contains("related.html"));
    }

    #[test]
    fn image_url_heuristic() {
        assert!(is_image_url("https://cdn.example.com/a/b.jpg"));
        assert!(is_image_url("https://cdn.example.com/photo/123"));
        assert!(is_image_url("https://cdn.example.com/upload/x.webp"));
        assert!(!is_image_url("https://example.com/story.html"));
        assert!(!is_image_url("https://example.com/page.aspx"));
        assert!(!is_image_url(""));
        assert!(!is_image_url("https://example.com/about"));
    }

    #[test]
    fn srcset_images_collected() {
        let html = r#"<html><body><article>
            <picture>
              <source srcset="/img/a-small.webp 480w, /img/a-large.webp 1024w">
              <img src="/img/a.jpg">
            </picture>
            <p>Some body text for the article goes here.</p>
        </article></body></html>"#;
        let article = extract_with_config(html, "https://example.com/x", &config());
        assert!(article.images.contains(&"https://example.com/img/a-small.webp".to_string()));
        assert!(article.images.contains(&"https://example.com/img/a.jpg".to_string()));
    }
}
