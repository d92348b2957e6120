//! robots.txt fetching and interpretation: allow/deny matching, crawl
//! delays, and Sitemap directive extraction, with a 1h in-process cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use robotstxt::DefaultMatcher;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_USER_AGENT: &str = "newsdeskbot";
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// Outcome of a robots.txt check for one site.
#[derive(Debug, Clone)]
pub struct RobotsInfo {
    pub base_url: String,
    pub allowed: bool,
    pub crawl_delay: Option<f64>,
    pub sitemap_urls: Vec<String>,
    /// Network-level failure description; distinguishes "error" from
    /// "not_found" when updating source status.
    pub error: Option<String>,
    /// True when the site served no robots.txt at all.
    pub not_found: bool,
}

impl RobotsInfo {
    fn open(base_url: &str, not_found: bool) -> Self {
        Self {
            base_url: base_url.to_string(),
            allowed: true,
            crawl_delay: None,
            sitemap_urls: Vec::new(),
            error: None,
            not_found,
        }
    }
}

struct CachedRobots {
    content: Option<String>,
    fetched_at: Instant,
}

pub struct RobotsHandler {
    client: reqwest::Client,
    user_agent: String,
    cache: RwLock<HashMap<String, CachedRobots>>,
}

impl RobotsHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch and interpret robots.txt for a site. A 404 means the site is
    /// open (allowed, no delay, no sitemaps); other failures surface in
    /// `error` so the caller can mark the source accordingly.
    pub async fn check(&self, base_url: &str) -> RobotsInfo {
        let origin = match origin_of(base_url) {
            Some(o) => o,
            None => {
                let mut info = RobotsInfo::open(base_url, false);
                info.allowed = false;
                info.error = Some(format!("invalid base url: {base_url}"));
                return info;
            }
        };

        let content = match self.fetch_cached(&origin).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!(base_url, "no robots.txt, site is open");
                return RobotsInfo::open(base_url, true);
            }
            Err(e) => {
                warn!(base_url, error = %e, "robots.txt fetch failed");
                let mut info = RobotsInfo::open(base_url, false);
                info.error = Some(e);
                return info;
            }
        };

        let allowed = DefaultMatcher::default().one_agent_allowed_by_robots(
            &content,
            &self.user_agent,
            &format!("{origin}/"),
        );
        let crawl_delay = parse_crawl_delay(&content, &self.user_agent);
        let sitemap_urls = parse_sitemap_directives(&content, &origin);

        info!(
            base_url,
            allowed,
            crawl_delay = ?crawl_delay,
            sitemaps = sitemap_urls.len(),
            "robots.txt checked"
        );

        RobotsInfo {
            base_url: base_url.to_string(),
            allowed,
            crawl_delay,
            sitemap_urls,
            error: None,
            not_found: false,
        }
    }

    /// Whether a specific URL may be fetched under the cached rules.
    /// Unknown sites default to allowed.
    pub async fn can_fetch(&self, url: &str) -> bool {
        let Some(origin) = origin_of(url) else {
            return false;
        };
        let cache = self.cache.read().await;
        match cache.get(&origin) {
            Some(cached) if cached.fetched_at.elapsed() < CACHE_TTL => match &cached.content {
                Some(content) => DefaultMatcher::default().one_agent_allowed_by_robots(
                    content,
                    &self.user_agent,
                    url,
                ),
                None => true,
            },
            _ => true,
        }
    }

    /// Drop cached rules for one origin, or everything.
    pub async fn invalidate(&self, base_url: Option<&str>) {
        let mut cache = self.cache.write().await;
        match base_url.and_then(origin_of) {
            Some(origin) => {
                cache.remove(&origin);
            }
            None => cache.clear(),
        }
    }

    /// Ok(Some(content)) when robots.txt exists, Ok(None) on 404,
    /// Err(description) on network failure.
    async fn fetch_cached(&self, origin: &str) -> Result<Option<String>, String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(origin) {
                if cached.fetched_at.elapsed() < CACHE_TTL {
                    return Ok(cached.content.clone());
                }
            }
        }

        let robots_url = format!("{origin}/robots.txt");
        debug!(robots_url, "fetching robots.txt");

        let response = self
            .client
            .get(&robots_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let content = if response.status() == reqwest::StatusCode::NOT_FOUND {
            None
        } else if response.status().is_success() {
            Some(response.text().await.map_err(|e| e.to_string())?)
        } else {
            return Err(format!("robots.txt returned {}", response.status()));
        };

        let mut cache = self.cache.write().await;
        cache.insert(
            origin.to_string(),
            CachedRobots {
                content: content.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(content)
    }
}

fn origin_of(base_url: &str) -> Option<String> {
    let parsed = Url::parse(base_url).ok()?;
    let host = parsed.host_str()?;
    let origin = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };
    Some(origin)
}

/// Parse `Crawl-delay` for our agent group, falling back to the `*` group.
/// The Google-style matcher ignores the directive, so it is read line-wise.
fn parse_crawl_delay(content: &str, user_agent: &str) -> Option<f64> {
    let mut current_agents: Vec<String> = Vec::new();
    let mut wildcard_delay: Option<f64> = None;
    let mut agent_delay: Option<f64> = None;
    let ua_lower = user_agent.to_lowercase();

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                // A new agent line after directives starts a fresh group.
                if agent_delay.is_some() || wildcard_delay.is_some() {
                    current_agents.clear();
                }
                current_agents.push(value.to_lowercase());
            }
            "crawl-delay" => {
                if let Ok(delay) = value.parse::<f64>() {
                    if current_agents.iter().any(|a| ua_lower.contains(a.as_str()) || a == &ua_lower)
                    {
                        agent_delay = Some(delay);
                    } else if current_agents.iter().any(|a| a == "*") {
                        wildcard_delay = Some(delay);
                    }
                }
            }
            _ => {}
        }
    }

    agent_delay.or(wildcard_delay)
}

/// Extract every `Sitemap:` directive, resolving relative URLs against the
/// site origin.
fn parse_sitemap_directives(content: &str, origin: &str) -> Vec<String> {
    let base = Url::parse(origin).ok();
    let mut sitemaps = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.len() < 8 || !line[..8].eq_ignore_ascii_case("sitemap:") {
            continue;
        }
        let value = line[8..].trim();
        if value.is_empty() {
            continue;
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            sitemaps.push(value.to_string());
        } else if let Some(ref b) = base {
            if let Ok(resolved) = b.join(value) {
                sitemaps.push(resolved.to_string());
            }
        }
    }

    sitemaps
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
User-agent: *\n\
Disallow: /private/\n\
Crawl-delay: 2\n\
\n\
Sitemap: https://example.com/sitemap.xml\n\
Sitemap: /news-sitemap.xml\n";

    #[test]
    fn sitemap_directives_extracted_and_resolved() {
        let sitemaps = parse_sitemap_directives(ROBOTS, "https://example.com");
        assert_eq!(
            sitemaps,
            vec![
                "https://example.com/sitemap.xml",
                "https://example.com/news-sitemap.xml"
            ]
        );
    }

    #[test]
    fn sitemap_directive_case_insensitive() {
        let content = "SITEMAP: https://example.com/a.xml\nsitemap: https://example.com/b.xml\n";
        let sitemaps = parse_sitemap_directives(content, "https://example.com");
        assert_eq!(sitemaps.len(), 2);
    }

    #[test]
    fn wildcard_crawl_delay_applies() {
        assert_eq!(parse_crawl_delay(ROBOTS, "newsdeskbot"), Some(2.0));
    }

    #[test]
    fn agent_specific_delay_wins() {
        let content = "\
User-agent: *\n\
Crawl-delay: 5\n\
\n\
User-agent: newsdeskbot\n\
Crawl-delay: 1\n";
        assert_eq!(parse_crawl_delay(content, "newsdeskbot"), Some(1.0));
    }

    #[test]
    fn missing_delay_is_none() {
        let content = "User-agent: *\nDisallow: /admin/\n";
        assert_eq!(parse_crawl_delay(content, "newsdeskbot"), None);
    }

    #[test]
    fn origin_strips_path() {
        assert_eq!(
            origin_of("https://example.com/news/politics").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            origin_of("http://example.com:8080/x").as_deref(),
            Some("http://example.com:8080")
        );
        assert!(origin_of("not a url").is_none());
    }
}
