//! Ingestion plumbing: robots handling, recursive sitemap parsing, the
//! universal scraper with its smart-extraction fallback, multi-language
//! time extraction, and the external web search client.

pub mod discovery;
pub mod robots;
pub mod scraper;
pub mod search;
pub mod sitemap;
pub mod smart;
pub mod time;

pub use discovery::{DiscoveryOutcome, SiteDiscovery, SitemapSyncSummary};
pub use robots::{RobotsHandler, RobotsInfo};
pub use scraper::{is_image_url, politeness_pause, UniversalScraper};
pub use search::WebSearchEngine;
pub use sitemap::{SitemapEntry, SitemapParser, SitemapParseResult};
pub use smart::SmartExtractor;
pub use time::TimeExtractor;

use std::time::Duration;

/// Shared HTTP client for crawler components: follows redirects, sends
/// realistic defaults, and optionally accepts invalid TLS in development.
pub fn build_http_client(timeout: Duration, insecure_tls: bool) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure_tls)
        .gzip(true)
        .build()
        .expect("Failed to build HTTP client")
}
