//! Postgres persistence. One repository per entity; the `Store` facade owns
//! the pool and hands out cheap clones.

pub mod articles;
pub mod keywords;
pub mod pending;
pub mod reports;
pub mod schedules;
pub mod sitemaps;
pub mod sources;
pub mod tasks;

pub use articles::{Article, ArticleFilter, ArticleRepo, InsertArticle};
pub use keywords::{InsertKeyword, KeywordRepo, SearchKeyword};
pub use pending::{InsertPending, PendingArticle, PendingCount, PendingRepo};
pub use reports::{InsertReport, Report, ReportReference, ReportRepo};
pub use schedules::{InsertSchedule, Schedule, ScheduleRepo};
pub use sitemaps::{Sitemap, SitemapRepo};
pub use sources::{CrawlSource, InsertSource, SourceRepo};
pub use tasks::{Task, TaskEvent, TaskRepo};

use newsdesk_common::Result;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    pub sources: SourceRepo,
    pub sitemaps: SitemapRepo,
    pub pending: PendingRepo,
    pub articles: ArticleRepo,
    pub tasks: TaskRepo,
    pub schedules: ScheduleRepo,
    pub keywords: KeywordRepo,
    pub reports: ReportRepo,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self {
            sources: SourceRepo::new(pool.clone()),
            sitemaps: SitemapRepo::new(pool.clone()),
            pending: PendingRepo::new(pool.clone()),
            articles: ArticleRepo::new(pool.clone()),
            tasks: TaskRepo::new(pool.clone()),
            schedules: ScheduleRepo::new(pool.clone()),
            keywords: KeywordRepo::new(pool.clone()),
            reports: ReportRepo::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| newsdesk_common::NewsdeskError::Database(e.into()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
