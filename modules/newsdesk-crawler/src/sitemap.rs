//! Recursive sitemap parsing: XML urlsets, sitemap indexes, plain-text URL
//! lists, and gzipped variants. Parsing is streaming (quick-xml events), so
//! a multi-megabyte sitemap never has to materialize as a DOM.

use std::collections::VecDeque;
use std::io::Read;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::time::parse_datetime_str;

const MAX_DEPTH: usize = 5;
const MAX_URLS: usize = 100_000;

/// One `<url>` entry from a sitemap.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
}

/// One `<sitemap>` entry from a sitemap index.
#[derive(Debug, Clone)]
pub struct SitemapIndexEntry {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

/// Outcome of a recursive parse. `error` is set when the root fetch failed;
/// per-URL failures are logged and skipped instead.
#[derive(Debug, Default)]
pub struct SitemapParseResult {
    pub entries: Vec<SitemapEntry>,
    pub error: Option<String>,
}

pub struct SitemapParser {
    client: reqwest::Client,
    max_depth: usize,
    max_urls: usize,
}

impl SitemapParser {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_depth: MAX_DEPTH,
            max_urls: MAX_URLS,
        }
    }

    /// Parse a sitemap URL, following nested indexes breadth-first until the
    /// depth and URL bounds are hit. With `since`, entries and sub-sitemaps
    /// whose lastmod is at or before the cutoff are dropped.
    pub async fn parse(
        &self,
        sitemap_url: &str,
        since: Option<DateTime<Utc>>,
    ) -> SitemapParseResult {
        let mut result = SitemapParseResult::default();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((sitemap_url.to_string(), 0));
        let mut root = true;

        while let Some((url, depth)) = queue.pop_front() {
            if depth > self.max_depth {
                warn!(url, depth, "max sitemap recursion depth reached");
                continue;
            }
            if result.entries.len() >= self.max_urls {
                warn!(count = result.entries.len(), "max sitemap URL count reached");
                break;
            }

            let content = match self.fetch(&url).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(url, error = %e, "sitemap fetch failed");
                    if root {
                        result.error = Some(e);
                        return result;
                    }
                    continue;
                }
            };
            root = false;

            if looks_like_xml(&content) {
                let (mut entries, subs) = parse_sitemap_xml(&content);
                if let Some(cutoff) = since {
                    entries.retain(|e| e.lastmod.map(|lm| lm > cutoff).unwrap_or(true));
                }
                let room = self.max_urls.saturating_sub(result.entries.len());
                result.entries.extend(entries.into_iter().take(room));

                for sub in subs {
                    if let (Some(cutoff), Some(lastmod)) = (since, sub.lastmod) {
                        if lastmod <= cutoff {
                            debug!(url = sub.loc, "skipping unchanged sub-sitemap");
                            continue;
                        }
                    }
                    queue.push_back((sub.loc, depth + 1));
                }
            } else {
                let entries = parse_text_sitemap(&content);
                let room = self.max_urls.saturating_sub(result.entries.len());
                result.entries.extend(entries.into_iter().take(room));
            }
        }

        info!(
            sitemap_url,
            entries = result.entries.len(),
            "sitemap parse complete"
        );
        result
    }

    /// Fetch raw sitemap bytes, transparently decompressing gzip payloads
    /// (by extension or by magic bytes).
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(maybe_gunzip(url, bytes))
    }
}

/// Decompress when the URL ends in .gz or the payload carries the gzip
/// magic. Payloads that fail to decompress are passed through unchanged.
fn maybe_gunzip(url: &str, bytes: Vec<u8>) -> Vec<u8> {
    let gzipped_ext = url.ends_with(".gz");
    let gzip_magic = bytes.len() > 2 && bytes[0] == 0x1f && bytes[1] == 0x8b;
    if !gzipped_ext && !gzip_magic {
        return bytes;
    }
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => {
            debug!(url, "decompressed gzipped sitemap");
            out
        }
        Err(_) => bytes,
    }
}

fn looks_like_xml(content: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&content[..content.len().min(200)]);
    head.contains("<?xml") || head.contains("<urlset") || head.contains("<sitemapindex")
}

/// Streaming parse of a sitemap document into url entries and index entries.
/// Namespaces are ignored by matching local element names.
pub fn parse_sitemap_xml(content: &[u8]) -> (Vec<SitemapEntry>, Vec<SitemapIndexEntry>) {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut sitemaps = Vec::new();

    // Per-entry accumulator state.
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut current_field: Option<String> = None;
    let mut loc = String::new();
    let mut lastmod = String::new();
    let mut changefreq = String::new();
    let mut priority = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "url" => {
                        in_url = true;
                        clear_fields(&mut loc, &mut lastmod, &mut changefreq, &mut priority);
                    }
                    "sitemap" => {
                        in_sitemap = true;
                        clear_fields(&mut loc, &mut lastmod, &mut changefreq, &mut priority);
                    }
                    "loc" | "lastmod" | "changefreq" | "priority" => {
                        current_field = Some(name);
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if in_url || in_sitemap {
                    if let Some(field) = &current_field {
                        let text = t.unescape().unwrap_or_default().to_string();
                        match field.as_str() {
                            "loc" => loc.push_str(text.trim()),
                            "lastmod" => lastmod.push_str(text.trim()),
                            "changefreq" => changefreq.push_str(text.trim()),
                            "priority" => priority.push_str(text.trim()),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "url" if in_url => {
                        in_url = false;
                        if !loc.is_empty() {
                            urls.push(SitemapEntry {
                                loc: loc.clone(),
                                lastmod: parse_lastmod(&lastmod),
                                changefreq: (!changefreq.is_empty()).then(|| changefreq.clone()),
                                priority: priority.parse().ok(),
                            });
                        }
                    }
                    "sitemap" if in_sitemap => {
                        in_sitemap = false;
                        if !loc.is_empty() {
                            sitemaps.push(SitemapIndexEntry {
                                loc: loc.clone(),
                                lastmod: parse_lastmod(&lastmod),
                            });
                        }
                    }
                    "loc" | "lastmod" | "changefreq" | "priority" => {
                        current_field = None;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "sitemap XML syntax error, keeping entries parsed so far");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    (urls, sitemaps)
}

fn clear_fields(loc: &mut String, lastmod: &mut String, changefreq: &mut String, priority: &mut String) {
    loc.clear();
    lastmod.clear();
    changefreq.clear();
    priority.clear();
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

fn parse_lastmod(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    parse_datetime_str(raw)
}

/// Plain-text sitemap: one URL per line.
pub fn parse_text_sitemap(content: &[u8]) -> Vec<SitemapEntry> {
    let text = String::from_utf8_lossy(content);
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http://") || line.starts_with("https://"))
        .map(|line| SitemapEntry {
            loc: line.to_string(),
            lastmod: None,
            changefreq: None,
            priority: None,
        })
        .collect()
}

/// Keep entries matching any include pattern (when given) and drop entries
/// matching any exclude pattern.
pub fn filter_by_patterns(
    entries: Vec<SitemapEntry>,
    include: &[Regex],
    exclude: &[Regex],
) -> Vec<SitemapEntry> {
    entries
        .into_iter()
        .filter(|e| include.is_empty() || include.iter().any(|re| re.is_match(&e.loc)))
        .filter(|e| !exclude.iter().any(|re| re.is_match(&e.loc)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/2024/05/20/story-one</loc>
    <lastmod>2024-05-20T08:00:00Z</lastmod>
    <changefreq>daily</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc>https://example.com/2024/05/18/story-two</loc>
    <lastmod>2024-05-18</lastmod>
  </url>
  <url>
    <loc>https://example.com/undated</loc>
  </url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap>
    <loc>https://example.com/sitemap-2024-05.xml</loc>
    <lastmod>2024-05-20T00:00:00Z</lastmod>
  </sitemap>
  <sitemap>
    <loc>https://example.com/sitemap-2024-04.xml</loc>
    <lastmod>2024-04-30T00:00:00Z</lastmod>
  </sitemap>
</sitemapindex>"#;

    #[test]
    fn urlset_entries_parsed_with_all_fields() {
        let (urls, subs) = parse_sitemap_xml(URLSET.as_bytes());
        assert!(subs.is_empty());
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0].loc, "https://example.com/2024/05/20/story-one");
        assert_eq!(
            urls[0].lastmod,
            Some(Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap())
        );
        assert_eq!(urls[0].changefreq.as_deref(), Some("daily"));
        assert_eq!(urls[0].priority, Some(0.8));
        assert!(urls[2].lastmod.is_none());
    }

    #[test]
    fn sitemap_index_entries_parsed() {
        let (urls, subs) = parse_sitemap_xml(INDEX.as_bytes());
        assert!(urls.is_empty());
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].loc, "https://example.com/sitemap-2024-05.xml");
        assert!(subs[1].lastmod.is_some());
    }

    #[test]
    fn namespaced_tags_handled() {
        let xml = r#"<?xml version="1.0"?>
<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sm:url><sm:loc>https://example.com/a</sm:loc></sm:url>
</sm:urlset>"#;
        let (urls, _) = parse_sitemap_xml(xml.as_bytes());
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].loc, "https://example.com/a");
    }

    #[test]
    fn malformed_xml_keeps_parsed_prefix() {
        let xml = r#"<?xml version="1.0"?>
<urlset>
  <url><loc>https://example.com/ok</loc></url>
  <url><loc>https://example.com/broken"#;
        let (urls, _) = parse_sitemap_xml(xml.as_bytes());
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn text_sitemap_parsed_line_wise() {
        let content = "https://example.com/a\n# comment\nnot-a-url\nhttps://example.com/b\n";
        let entries = parse_text_sitemap(content.as_bytes());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].loc, "https://example.com/a");
    }

    #[test]
    fn gzip_roundtrip_is_detected() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(URLSET.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let decompressed = maybe_gunzip("https://example.com/sitemap.xml.gz", gz.clone());
        assert!(looks_like_xml(&decompressed));

        // Magic-byte detection without the .gz extension
        let decompressed = maybe_gunzip("https://example.com/sitemap.xml", gz);
        assert!(looks_like_xml(&decompressed));
    }

    #[test]
    fn plain_content_passes_through_gunzip() {
        let bytes = URLSET.as_bytes().to_vec();
        assert_eq!(maybe_gunzip("https://example.com/sitemap.xml", bytes.clone()), bytes);
    }

    #[test]
    fn incremental_filter_drops_old_entries() {
        let cutoff = Utc.with_ymd_and_hms(2024, 5, 19, 0, 0, 0).unwrap();
        let (mut urls, _) = parse_sitemap_xml(URLSET.as_bytes());
        urls.retain(|e| e.lastmod.map(|lm| lm > cutoff).unwrap_or(true));
        // story-two (05-18) dropped; story-one and the undated entry stay
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().all(|e| !e.loc.contains("story-two")));
    }

    #[test]
    fn pattern_filters_apply() {
        let (urls, _) = parse_sitemap_xml(URLSET.as_bytes());
        let include = vec![Regex::new(r"/2024/").unwrap()];
        let exclude = vec![Regex::new(r"story-two").unwrap()];
        let filtered = filter_by_patterns(urls, &include, &exclude);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].loc.contains("story-one"));
    }
}
