//! Web search against the DuckDuckGo HTML endpoint. No API key; results are
//! parsed out of the returned page and redirect-wrapped URLs are unwrapped.

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use newsdesk_common::{SearchResult, TimeRange};

const DUCKDUCKGO_HTML: &str = "https://html.duckduckgo.com/html/";

pub struct WebSearchEngine {
    client: reqwest::Client,
}

impl WebSearchEngine {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Run one search. Failures return an empty result list; item-level
    /// parse problems are skipped.
    pub async fn search(
        &self,
        query: &str,
        time_range: TimeRange,
        region: &str,
        max_results: usize,
    ) -> Vec<SearchResult> {
        info!(query, time_range = time_range.as_param(), region, "web search");

        let response = self
            .client
            .get(DUCKDUCKGO_HTML)
            .query(&[("q", query), ("kl", region), ("df", time_range.as_param())])
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .send()
            .await;

        let html = match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(query, error = %e, "search response read failed");
                    return Vec::new();
                }
            },
            Ok(resp) => {
                warn!(query, status = %resp.status(), "search request rejected");
                return Vec::new();
            }
            Err(e) => {
                warn!(query, error = %e, "search request failed");
                return Vec::new();
            }
        };

        let results = parse_results(&html, max_results);
        info!(query, count = results.len(), "web search complete");
        results
    }
}

/// Parse the DuckDuckGo HTML results page.
fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let doc = Html::parse_document(html);
    let Ok(result_sel) = Selector::parse(".result") else {
        return Vec::new();
    };
    let Ok(title_sel) = Selector::parse(".result__title a") else {
        return Vec::new();
    };
    let snippet_sel = Selector::parse(".result__snippet").ok();
    let source_sel = Selector::parse(".result__url").ok();

    let mut results = Vec::new();
    for div in doc.select(&result_sel).take(max_results) {
        let Some(title_el) = div.select(&title_sel).next() else {
            continue;
        };
        let Some(href) = title_el.value().attr("href") else {
            continue;
        };
        let title = title_el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            continue;
        }

        let snippet = snippet_sel
            .as_ref()
            .and_then(|sel| div.select(sel).next())
            .map(|el| {
                el.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        let source = source_sel
            .as_ref()
            .and_then(|sel| div.select(sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());

        results.push(SearchResult {
            title,
            url: unwrap_redirect(href),
            snippet,
            published_date: None,
            source,
        });
    }

    results
}

/// DuckDuckGo wraps result links in a redirect whose `uddg` query parameter
/// carries the percent-encoded target. Unwrap it; pass anything else
/// through unchanged.
pub fn unwrap_redirect(href: &str) -> String {
    // Protocol-relative redirect links appear as //duckduckgo.com/l/?uddg=...
    let candidate = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    if !candidate.contains("duckduckgo.com/l/") || !candidate.contains("uddg=") {
        return href.to_string();
    }

    let Ok(parsed) = Url::parse(&candidate) else {
        return href.to_string();
    };
    for (key, value) in parsed.query_pairs() {
        if key == "uddg" {
            debug!(target = %value, "unwrapped search redirect");
            return value.into_owned();
        }
    }
    href.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_url_unwrapped() {
        let wrapped =
            "https://duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fstory%3Fid%3D1&rut=abc";
        assert_eq!(unwrap_redirect(wrapped), "https://example.com/story?id=1");
    }

    #[test]
    fn protocol_relative_redirect_unwrapped() {
        let wrapped = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa";
        assert_eq!(unwrap_redirect(wrapped), "https://example.com/a");
    }

    #[test]
    fn plain_url_passes_through() {
        assert_eq!(
            unwrap_redirect("https://example.com/direct"),
            "https://example.com/direct"
        );
    }

    #[test]
    fn results_parsed_from_html() {
        let html = r#"<html><body>
          <div class="result">
            <h2 class="result__title"><a href="https://example.com/one">First story</a></h2>
            <a class="result__snippet">Snippet one text.</a>
            <span class="result__url">example.com/one</span>
          </div>
          <div class="result">
            <h2 class="result__title"><a href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Ftwo">Second story</a></h2>
            <a class="result__snippet">Snippet two text.</a>
          </div>
        </body></html>"#;
        let results = parse_results(html, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "First story");
        assert_eq!(results[0].url, "https://example.com/one");
        assert_eq!(results[0].source.as_deref(), Some("example.com/one"));
        assert_eq!(results[1].url, "https://example.com/two");
    }

    #[test]
    fn max_results_respected() {
        let item = r#"<div class="result">
            <h2 class="result__title"><a href="https://example.com/x">T</a></h2>
          </div>"#;
        let html = format!("<html><body>{}</body></html>", item.repeat(5));
        assert_eq!(parse_results(&html, 3).len(), 3);
    }
}
