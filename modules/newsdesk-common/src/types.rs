use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Article states ---

/// Semantic state of a fetched article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Raw,
    Processed,
    Synced,
    Failed,
    LowQuality,
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArticleStatus::Raw => write!(f, "raw"),
            ArticleStatus::Processed => write!(f, "processed"),
            ArticleStatus::Synced => write!(f, "synced"),
            ArticleStatus::Failed => write!(f, "failed"),
            ArticleStatus::LowQuality => write!(f, "low_quality"),
        }
    }
}

impl std::str::FromStr for ArticleStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "processed" => Ok(Self::Processed),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            "low_quality" => Ok(Self::LowQuality),
            other => Err(format!("unknown ArticleStatus: {other}")),
        }
    }
}

/// Technical state of the fetch itself, orthogonal to `ArticleStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    Success,
    Retry,
    Failed,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Pending => write!(f, "pending"),
            FetchStatus::Success => write!(f, "success"),
            FetchStatus::Retry => write!(f, "retry"),
            FetchStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for FetchStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "retry" => Ok(Self::Retry),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown FetchStatus: {other}")),
        }
    }
}

// --- Source / sitemap states ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsStatus {
    Pending,
    Compliant,
    Restricted,
    NotFound,
    Error,
}

impl std::fmt::Display for RobotsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RobotsStatus::Pending => write!(f, "pending"),
            RobotsStatus::Compliant => write!(f, "compliant"),
            RobotsStatus::Restricted => write!(f, "restricted"),
            RobotsStatus::NotFound => write!(f, "not_found"),
            RobotsStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for RobotsStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "compliant" => Ok(Self::Compliant),
            "restricted" => Ok(Self::Restricted),
            "not_found" => Ok(Self::NotFound),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown RobotsStatus: {other}")),
        }
    }
}

/// How article URLs are discovered for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Sitemap,
    List,
    Hybrid,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryMethod::Sitemap => write!(f, "sitemap"),
            DiscoveryMethod::List => write!(f, "list"),
            DiscoveryMethod::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for DiscoveryMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sitemap" => Ok(Self::Sitemap),
            "list" => Ok(Self::List),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown DiscoveryMethod: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitemapFetchStatus {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for SitemapFetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SitemapFetchStatus::Pending => write!(f, "pending"),
            SitemapFetchStatus::Success => write!(f, "success"),
            SitemapFetchStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SitemapFetchStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown SitemapFetchStatus: {other}")),
        }
    }
}

/// State machine for a discovered-but-unfetched URL. Transitions are one-way
/// toward the terminal states except the failed → crawling retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Crawling,
    Completed,
    Failed,
    Abandoned,
    LowQuality,
}

impl PendingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PendingStatus::Completed | PendingStatus::Abandoned | PendingStatus::LowQuality
        )
    }
}

impl std::fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingStatus::Pending => write!(f, "pending"),
            PendingStatus::Crawling => write!(f, "crawling"),
            PendingStatus::Completed => write!(f, "completed"),
            PendingStatus::Failed => write!(f, "failed"),
            PendingStatus::Abandoned => write!(f, "abandoned"),
            PendingStatus::LowQuality => write!(f, "low_quality"),
        }
    }
}

impl std::str::FromStr for PendingStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "crawling" => Ok(Self::Crawling),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            "low_quality" => Ok(Self::LowQuality),
            other => Err(format!("unknown PendingStatus: {other}")),
        }
    }
}

// --- Tasks ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown TaskStatus: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
    Info,
}

impl std::fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskEventType::Created => write!(f, "created"),
            TaskEventType::Started => write!(f, "started"),
            TaskEventType::Progress => write!(f, "progress"),
            TaskEventType::Completed => write!(f, "completed"),
            TaskEventType::Failed => write!(f, "failed"),
            TaskEventType::Cancelled => write!(f, "cancelled"),
            TaskEventType::Info => write!(f, "info"),
        }
    }
}

impl std::str::FromStr for TaskEventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "started" => Ok(Self::Started),
            "progress" => Ok(Self::Progress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "info" => Ok(Self::Info),
            other => Err(format!("unknown TaskEventType: {other}")),
        }
    }
}

// --- Schedules ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    SitemapCrawl,
    ArticleCrawl,
    KeywordSearch,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleType::SitemapCrawl => write!(f, "sitemap_crawl"),
            ScheduleType::ArticleCrawl => write!(f, "article_crawl"),
            ScheduleType::KeywordSearch => write!(f, "keyword_search"),
        }
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sitemap_crawl" => Ok(Self::SitemapCrawl),
            "article_crawl" => Ok(Self::ArticleCrawl),
            "keyword_search" => Ok(Self::KeywordSearch),
            other => Err(format!("unknown ScheduleType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Disabled,
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleStatus::Active => write!(f, "active"),
            ScheduleStatus::Paused => write!(f, "paused"),
            ScheduleStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown ScheduleStatus: {other}")),
        }
    }
}

/// Search recency window, DuckDuckGo-style single letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "w")]
    Week,
    #[serde(rename = "m")]
    Month,
    #[serde(rename = "y")]
    Year,
}

impl TimeRange {
    pub fn as_param(&self) -> &'static str {
        match self {
            TimeRange::Day => "d",
            TimeRange::Week => "w",
            TimeRange::Month => "m",
            TimeRange::Year => "y",
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "d" | "day" => Ok(Self::Day),
            "w" | "week" => Ok(Self::Week),
            "m" | "month" => Ok(Self::Month),
            "y" | "year" => Ok(Self::Year),
            other => Err(format!("unknown TimeRange: {other}")),
        }
    }
}

// --- Reports ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Generating,
    Completed,
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Generating => write!(f, "generating"),
            ReportStatus::Completed => write!(f, "completed"),
            ReportStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(Self::Generating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ReportStatus: {other}")),
        }
    }
}

/// Pipeline stage of the report agent, surfaced in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStage {
    Initializing,
    FilteringArticles,
    GeneratingKeywords,
    ClusteringArticles,
    ExtractingEvents,
    GeneratingSections,
    MergingReport,
    Completed,
    Failed,
}

impl std::fmt::Display for AgentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStage::Initializing => write!(f, "initializing"),
            AgentStage::FilteringArticles => write!(f, "filtering_articles"),
            AgentStage::GeneratingKeywords => write!(f, "generating_keywords"),
            AgentStage::ClusteringArticles => write!(f, "clustering_articles"),
            AgentStage::ExtractingEvents => write!(f, "extracting_events"),
            AgentStage::GeneratingSections => write!(f, "generating_sections"),
            AgentStage::MergingReport => write!(f, "merging_report"),
            AgentStage::Completed => write!(f, "completed"),
            AgentStage::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for AgentStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(Self::Initializing),
            "filtering_articles" => Ok(Self::FilteringArticles),
            "generating_keywords" => Ok(Self::GeneratingKeywords),
            "clustering_articles" => Ok(Self::ClusteringArticles),
            "extracting_events" => Ok(Self::ExtractingEvents),
            "generating_sections" => Ok(Self::GeneratingSections),
            "merging_report" => Ok(Self::MergingReport),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown AgentStage: {other}")),
        }
    }
}

/// Progress event emitted by the report agent. `progress` is 0..=100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub stage: AgentStage,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl AgentState {
    pub fn new(stage: AgentStage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

// --- Value objects ---

/// Selector configuration embedded in a crawl source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub title_selector: String,
    pub content_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_selector: Option<String>,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            title_selector: "h1".to_string(),
            content_selector: "article, main".to_string(),
            publish_time_selector: None,
            author_selector: None,
            list_selector: None,
            url_selector: None,
            encoding: default_encoding(),
        }
    }
}

/// Result of a scrape attempt. Never an Err at the call boundary; failures
/// populate `error` and the caller decides the pending-row transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
    pub author: Option<String>,
    /// Collected image URLs and tags, serialized into `extra_data`.
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub error: Option<String>,
}

impl ScrapedArticle {
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn extra_data(&self) -> Option<serde_json::Value> {
        if self.images.is_empty() && self.tags.is_empty() {
            return None;
        }
        let mut map = serde_json::Map::new();
        if !self.images.is_empty() {
            map.insert("images".into(), serde_json::json!(self.images));
        }
        if !self.tags.is_empty() {
            map.insert("tags".into(), serde_json::json!(self.tags));
        }
        Some(serde_json::Value::Object(map))
    }
}

/// One hit from the external web search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            ArticleStatus::Raw,
            ArticleStatus::Processed,
            ArticleStatus::Synced,
            ArticleStatus::Failed,
            ArticleStatus::LowQuality,
        ] {
            assert_eq!(ArticleStatus::from_str(&s.to_string()).unwrap(), s);
        }
        for s in [
            PendingStatus::Pending,
            PendingStatus::Crawling,
            PendingStatus::Completed,
            PendingStatus::Failed,
            PendingStatus::Abandoned,
            PendingStatus::LowQuality,
        ] {
            assert_eq!(PendingStatus::from_str(&s.to_string()).unwrap(), s);
        }
    }

    #[test]
    fn pending_terminal_states() {
        assert!(PendingStatus::Completed.is_terminal());
        assert!(PendingStatus::Abandoned.is_terminal());
        assert!(PendingStatus::LowQuality.is_terminal());
        assert!(!PendingStatus::Failed.is_terminal());
        assert!(!PendingStatus::Crawling.is_terminal());
    }

    #[test]
    fn task_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn unknown_status_is_an_error() {
        assert!(ArticleStatus::from_str("bogus").is_err());
        assert!(ScheduleType::from_str("cron").is_err());
    }

    #[test]
    fn scraped_article_extra_data_shape() {
        let mut a = ScrapedArticle {
            url: "https://example.com".into(),
            ..Default::default()
        };
        assert!(a.extra_data().is_none());
        a.images.push("https://example.com/a.jpg".into());
        a.tags.push("economy".into());
        let extra = a.extra_data().unwrap();
        assert_eq!(extra["images"][0], "https://example.com/a.jpg");
        assert_eq!(extra["tags"][0], "economy");
    }
}
