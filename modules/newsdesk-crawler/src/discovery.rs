//! Source initialization and sitemap synchronization: robots.txt check,
//! sitemap discovery and attachment, and incremental URL import into the
//! pending queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use newsdesk_common::{NewsdeskError, Result, RobotsStatus, SitemapFetchStatus};
use newsdesk_store::{InsertPending, Store};

use crate::robots::RobotsHandler;
use crate::sitemap::{SitemapEntry, SitemapParser};

/// Result of initializing one source.
#[derive(Debug, Serialize)]
pub struct DiscoveryOutcome {
    pub source_id: i64,
    pub robots_status: RobotsStatus,
    pub crawl_delay: Option<f64>,
    pub sitemaps_attached: usize,
}

/// Result of syncing one source's sitemaps.
#[derive(Debug, Default, Serialize)]
pub struct SitemapSyncSummary {
    pub sitemaps_processed: usize,
    pub urls_found: usize,
    pub urls_imported: usize,
    pub urls_existing: usize,
}

pub struct SiteDiscovery {
    robots: RobotsHandler,
    parser: SitemapParser,
    store: Store,
}

impl SiteDiscovery {
    pub fn new(robots: RobotsHandler, parser: SitemapParser, store: Store) -> Self {
        Self {
            robots,
            parser,
            store,
        }
    }

    /// Check robots.txt for a source, persist the verdict, and attach any
    /// discovered sitemaps. Falls back to the conventional /sitemap.xml when
    /// robots.txt yields none.
    pub async fn initialize_source(&self, source_id: i64) -> Result<DiscoveryOutcome> {
        let source = self
            .store
            .sources
            .get(source_id)
            .await?
            .ok_or_else(|| NewsdeskError::NotFound(format!("source {source_id}")))?;

        // Initialization is an explicit re-check, not a cache read.
        self.robots.invalidate(Some(&source.base_url)).await;
        let robots = self.robots.check(&source.base_url).await;

        let status = if robots.error.is_some() {
            RobotsStatus::Error
        } else if robots.not_found {
            RobotsStatus::NotFound
        } else if robots.allowed {
            RobotsStatus::Compliant
        } else {
            RobotsStatus::Restricted
        };

        self.store
            .sources
            .update_robots(source_id, &status.to_string(), robots.crawl_delay)
            .await?;

        let mut sitemap_urls = robots.sitemap_urls;
        if sitemap_urls.is_empty() {
            let conventional = format!(
                "{}/sitemap.xml",
                source.base_url.trim_end_matches('/')
            );
            sitemap_urls.push(conventional);
        }

        let mut attached = 0;
        for url in &sitemap_urls {
            match self.store.sitemaps.upsert(source_id, url).await {
                Ok(_) => attached += 1,
                Err(e) => warn!(source_id, url, error = %e, "failed to attach sitemap"),
            }
        }
        if let Some(first) = sitemap_urls.first() {
            self.store.sources.set_sitemap_url(source_id, first).await?;
        }

        info!(
            source_id,
            robots_status = %status,
            sitemaps = attached,
            "source initialized"
        );

        Ok(DiscoveryOutcome {
            source_id,
            robots_status: status,
            crawl_delay: robots.crawl_delay,
            sitemaps_attached: attached,
        })
    }

    /// Parse every sitemap attached to a source and import fresh URLs into
    /// the pending queue. Incremental: entries unchanged since the sitemap's
    /// last fetch are skipped. Per-sitemap failures are recorded and the
    /// batch continues.
    pub async fn sync_source_sitemaps(&self, source_id: i64) -> Result<SitemapSyncSummary> {
        let source = self
            .store
            .sources
            .get(source_id)
            .await?
            .ok_or_else(|| NewsdeskError::NotFound(format!("source {source_id}")))?;

        let sitemaps = self.store.sitemaps.list_by_source(source_id).await?;
        let mut summary = SitemapSyncSummary::default();

        for sitemap in sitemaps {
            let result = self.parser.parse(&sitemap.url, sitemap.last_fetched).await;
            if let Some(error) = result.error {
                warn!(sitemap_id = sitemap.id, url = %sitemap.url, error, "sitemap fetch failed");
                self.store
                    .sitemaps
                    .record_fetch(sitemap.id, &SitemapFetchStatus::Failed.to_string(), 0)
                    .await?;
                continue;
            }

            let found = result.entries.len();
            let imported = self
                .import_entries(source.id, Some(sitemap.id), &result.entries)
                .await?;

            self.store
                .sitemaps
                .record_fetch(
                    sitemap.id,
                    &SitemapFetchStatus::Success.to_string(),
                    found as i32,
                )
                .await?;

            summary.sitemaps_processed += 1;
            summary.urls_found += found;
            summary.urls_imported += imported;
            summary.urls_existing += found - imported;
        }

        info!(
            source_id,
            sitemaps = summary.sitemaps_processed,
            found = summary.urls_found,
            imported = summary.urls_imported,
            "sitemap sync complete"
        );
        Ok(summary)
    }

    /// Import sitemap entries as pending rows; duplicates (by url_hash) are
    /// counted but not re-inserted.
    async fn import_entries(
        &self,
        source_id: i64,
        sitemap_id: Option<i64>,
        entries: &[SitemapEntry],
    ) -> Result<usize> {
        let mut imported = 0;
        for entry in entries {
            let inserted = self
                .store
                .pending
                .insert(InsertPending {
                    source_id,
                    sitemap_id,
                    url: entry.loc.clone(),
                    title: None,
                    publish_time: entry.lastmod,
                })
                .await?;
            if inserted.is_some() {
                imported += 1;
            }
        }
        Ok(imported)
    }

    /// Effective politeness delay for a source: robots crawl-delay when
    /// present, else the configured default.
    pub fn effective_crawl_delay(crawl_delay: Option<f64>, default_secs: f64) -> f64 {
        crawl_delay.unwrap_or(default_secs).max(0.0)
    }

    /// Whether a URL is fetchable under the cached robots rules.
    pub async fn can_fetch(&self, url: &str) -> bool {
        self.robots.can_fetch(url).await
    }
}

/// Times recorded by a cleanup pass: articles published outside this window
/// around `now` are implausible and get demoted.
pub fn plausible_publish_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - chrono::Duration::days(365), now + chrono::Duration::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn effective_delay_prefers_robots_value() {
        assert_eq!(SiteDiscovery::effective_crawl_delay(Some(2.5), 1.0), 2.5);
        assert_eq!(SiteDiscovery::effective_crawl_delay(None, 1.0), 1.0);
        assert_eq!(SiteDiscovery::effective_crawl_delay(Some(-3.0), 1.0), 0.0);
    }

    #[test]
    fn plausible_window_spans_a_year_each_way() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let (min, max) = plausible_publish_window(now);
        assert_eq!(min, Utc.with_ymd_and_hms(2023, 6, 2, 0, 0, 0).unwrap());
        assert_eq!(max, Utc.with_ymd_and_hms(2025, 5, 31, 0, 0, 0).unwrap());
    }
}
