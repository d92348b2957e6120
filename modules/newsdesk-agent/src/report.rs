//! The streaming report agent: filters articles, generates scoping
//! keywords, clusters and extracts events, streams each section from the
//! LLM, and merges the final report. Progress and token chunks fan out
//! through a per-report broadcast hub.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use newsdesk_analysis::{ArticleClusteringService, EventSelectionService, ExtractedEvent};
use newsdesk_common::{AgentStage, AgentState};
use newsdesk_store::{Article, Report, Store};

use crate::citation::{Reference, ReferenceManager};
use crate::keywords::KeywordGenerator;
use crate::llm::{ChatMessage, LlmClient};
use crate::templates::{default_sections, SectionTemplate, TemplateManager};

/// Capacity of each report's broadcast channel. Slow subscribers that fall
/// further behind than this are dropped by the channel.
const CHANNEL_CAPACITY: usize = 256;
const MAX_ARTICLES_PER_EVENT: usize = 10;
const MAX_IMAGES_PER_EVENT: usize = 5;

/// One frame on a report's progress stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    State(AgentState),
    SectionStream { section_title: String, chunk: String },
}

/// Process-local registry of per-report broadcast channels.
#[derive(Default)]
pub struct ReportHub {
    channels: RwLock<HashMap<i64, broadcast::Sender<ReportEvent>>>,
}

impl ReportHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publisher(&self, report_id: i64) -> broadcast::Sender<ReportEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(report_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub async fn subscribe(&self, report_id: i64) -> broadcast::Receiver<ReportEvent> {
        self.publisher(report_id).await.subscribe()
    }

    /// Drop the channel once generation is over and subscribers drained.
    pub async fn remove(&self, report_id: i64) {
        self.channels.write().await.remove(&report_id);
    }
}

/// A generated section.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSection {
    pub title: String,
    pub content: String,
}

pub struct ReportAgent {
    store: Store,
    llm: LlmClient,
    keyword_generator: KeywordGenerator,
    clustering: ArticleClusteringService,
    event_selection: EventSelectionService,
    templates: TemplateManager,
}

impl ReportAgent {
    pub fn new(store: Store, llm: LlmClient) -> Self {
        Self {
            keyword_generator: KeywordGenerator::new(llm.clone()),
            store,
            llm,
            clustering: ArticleClusteringService::new(),
            event_selection: EventSelectionService::new(),
            templates: TemplateManager::new(),
        }
    }

    /// Run the full generation pipeline for a stored report. The terminal
    /// state (completed or failed) is both persisted and broadcast.
    pub async fn generate(&self, report_id: i64, hub: &ReportHub) {
        let tx = hub.publisher(report_id).await;

        match self.run(report_id, &tx).await {
            Ok(()) => info!(report_id, "report generation complete"),
            Err(e) => {
                error!(report_id, error = %e, "report generation failed");
                if let Err(db_err) = self.store.reports.fail(report_id, &e.to_string()).await {
                    error!(report_id, error = %db_err, "failed to persist report failure");
                }
                let state = AgentState::new(AgentStage::Failed, 0, format!("Report failed: {e}"))
                    .with_data(serde_json::json!({ "error": e.to_string() }));
                let _ = tx.send(ReportEvent::State(state));
            }
        }
    }

    async fn run(&self, report_id: i64, tx: &broadcast::Sender<ReportEvent>) -> Result<()> {
        let report = self
            .store
            .reports
            .get(report_id)
            .await?
            .ok_or_else(|| anyhow!("report {report_id} not found"))?;

        self.emit(&report, tx, AgentStage::Initializing, 0, "Initializing report generation", None)
            .await?;

        // Stage: filter articles by the report window.
        self.emit(
            &report,
            tx,
            AgentStage::FilteringArticles,
            10,
            format!(
                "Selecting articles from {} to {}",
                report.time_range_start.format("%Y-%m-%d"),
                report.time_range_end.format("%Y-%m-%d")
            ),
            None,
        )
        .await?;

        let articles = self
            .store
            .articles
            .list_in_window(report.time_range_start, report.time_range_end, None)
            .await?;
        let total_articles = articles.len();

        self.emit(
            &report,
            tx,
            AgentStage::FilteringArticles,
            20,
            format!("Found {total_articles} articles"),
            Some(serde_json::json!({ "total_articles": total_articles })),
        )
        .await?;

        // Stage: scoping keywords.
        self.emit(&report, tx, AgentStage::GeneratingKeywords, 25, "Generating keywords", None)
            .await?;

        let keywords = self
            .keyword_generator
            .generate(
                &report.title,
                report.time_range_start,
                report.time_range_end,
                report.custom_prompt.as_deref(),
                &report.language,
                10,
            )
            .await;

        self.emit(
            &report,
            tx,
            AgentStage::GeneratingKeywords,
            28,
            format!("Generated {} keywords", keywords.len()),
            Some(serde_json::json!({ "keywords": keywords })),
        )
        .await?;

        // Stage: cluster and dedup.
        self.emit(&report, tx, AgentStage::ClusteringArticles, 30, "Clustering articles", None)
            .await?;

        let metadata = article_metadata(&articles);
        let keyword_filter = (!keywords.is_empty()).then_some(keywords.as_slice());
        let clusters = self
            .clustering
            .cluster_articles(articles, keyword_filter, Utc::now());
        let clustered_articles = clusters.len();

        self.emit(
            &report,
            tx,
            AgentStage::ClusteringArticles,
            40,
            format!("{total_articles} articles deduplicated into {clustered_articles}"),
            Some(serde_json::json!({
                "total_articles": total_articles,
                "clustered_articles": clustered_articles,
            })),
        )
        .await?;

        // Stage: event extraction.
        self.emit(&report, tx, AgentStage::ExtractingEvents, 50, "Extracting key events", None)
            .await?;

        let events = self.event_selection.select_top_events(
            &clusters,
            report.max_events.max(0) as usize,
            keyword_filter,
        );

        self.emit(
            &report,
            tx,
            AgentStage::ExtractingEvents,
            60,
            format!("Extracted {} events", events.len()),
            Some(serde_json::json!({
                "event_count": events.len(),
                "events": events
                    .iter()
                    .take(5)
                    .map(|e| serde_json::json!({
                        "title": e.title,
                        "summary": e.summary.chars().take(100).collect::<String>(),
                        "importance": e.importance,
                    }))
                    .collect::<Vec<_>>(),
            })),
        )
        .await?;

        // Stage: per-section generation, streamed.
        let section_templates = self.resolve_sections(&report);
        let system_prompt = self.resolve_system_prompt(&report);
        let events_context = build_events_context(&events, &metadata);

        let mut sections: Vec<GeneratedSection> = Vec::new();
        let total_sections = section_templates.len();

        for (i, section) in section_templates.iter().enumerate() {
            let progress = (70 + (10 * (i + 1)) / total_sections.max(1)) as u8;
            self.emit(
                &report,
                tx,
                AgentStage::GeneratingSections,
                progress,
                format!(
                    "Generating section \"{}\" ({}/{total_sections})",
                    section.title,
                    i + 1
                ),
                Some(serde_json::json!({
                    "current_section": section.title,
                    "section_index": i,
                    "total_sections": total_sections,
                })),
            )
            .await?;

            let content = self
                .generate_section(section, &system_prompt, &events_context, events.len(), tx)
                .await;
            sections.push(GeneratedSection {
                title: section.title.clone(),
                content,
            });

            let completed: Vec<serde_json::Value> = sections
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "title": s.title,
                        "content_length": s.content.chars().count(),
                    })
                })
                .collect();
            self.emit(
                &report,
                tx,
                AgentStage::GeneratingSections,
                progress,
                format!("Completed {}/{} sections", sections.len(), total_sections),
                Some(serde_json::json!({
                    "completed_sections": completed,
                    "total_sections": total_sections,
                })),
            )
            .await?;
        }

        // Stage: merge and persist.
        self.emit(&report, tx, AgentStage::MergingReport, 90, "Merging final report", None)
            .await?;

        let mut references = ReferenceManager::new();
        for event in &events {
            for article_id in event.article_ids.iter().take(MAX_ARTICLES_PER_EVENT) {
                if let Some(meta) = metadata.get(article_id) {
                    references.add_reference(Reference {
                        article_id: *article_id,
                        title: meta.title.clone(),
                        url: meta.url.clone(),
                        source_name: None,
                        publish_time: meta.publish_time,
                        author: meta.author.clone(),
                        excerpt: meta.excerpt.clone(),
                        citation_count: 0,
                    });
                }
            }
        }

        let statistics = serde_json::json!({
            "total_articles": total_articles,
            "clustered_articles": clustered_articles,
            "event_count": events.len(),
        });
        let content = merge_report(&report, &sections, &events, &statistics, &references);

        let sections_json = serde_json::to_value(&sections).unwrap_or(serde_json::Value::Null);
        self.store
            .reports
            .complete(report.id, &content, &sections_json, &statistics)
            .await
            .context("persisting completed report")?;

        for (i, reference) in references.references().iter().enumerate() {
            let excerpt = reference.excerpt.as_deref();
            if let Err(e) = self
                .store
                .reports
                .add_reference(report.id, reference.article_id, (i + 1) as i32, excerpt)
                .await
            {
                warn!(report_id = report.id, article_id = reference.article_id, error = %e,
                    "failed to persist reference");
            }
        }

        self.emit(
            &report,
            tx,
            AgentStage::Completed,
            100,
            "Report generation complete",
            Some(serde_json::json!({
                "content": content,
                "sections": sections_json,
                "events": events,
                "statistics": statistics,
            })),
        )
        .await?;

        Ok(())
    }

    /// Persist stage progress and broadcast the state frame.
    async fn emit(
        &self,
        report: &Report,
        tx: &broadcast::Sender<ReportEvent>,
        stage: AgentStage,
        progress: u8,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Result<()> {
        self.store
            .reports
            .update_stage(report.id, stage, progress as i32)
            .await?;
        let mut state = AgentState::new(stage, progress, message);
        if let Some(data) = data {
            state = state.with_data(data);
        }
        // No live subscribers is fine; events are also persisted via the
        // report row.
        let _ = tx.send(ReportEvent::State(state));
        Ok(())
    }

    fn resolve_sections(&self, report: &Report) -> Vec<SectionTemplate> {
        report
            .template_id
            .as_deref()
            .and_then(|id| self.templates.get(id))
            .map(|t| t.sections.clone())
            .unwrap_or_else(default_sections)
    }

    fn resolve_system_prompt(&self, report: &Report) -> String {
        let base = report
            .template_id
            .as_deref()
            .and_then(|id| self.templates.get(id))
            .and_then(|t| t.system_prompt.clone())
            .unwrap_or_else(|| {
                "You are a professional news analyst producing a structured report from the \
                 given events.\n\
                 Rules:\n\
                 1. Base every statement on the provided events and articles.\n\
                 2. Write clear, neutral, well-organized Markdown.\n\
                 3. Section and event headings must be complete sentences, not keyword lists.\n\
                 4. Cite sources inline as [n] referring to the numbered articles.\n\
                 5. When articles carry images, embed the most relevant ones with \
                    Markdown image syntax near the related analysis."
                    .to_string()
            });

        match &report.custom_prompt {
            Some(custom) => format!("{base}\n\nAdditional instructions: {custom}"),
            None => base,
        }
    }

    /// Stream one section from the LLM, forwarding chunks live. A failed
    /// section yields an inline error body rather than aborting the report.
    async fn generate_section(
        &self,
        section: &SectionTemplate,
        system_prompt: &str,
        events_context: &str,
        event_count: usize,
        tx: &broadcast::Sender<ReportEvent>,
    ) -> String {
        let user = format!(
            "Write the \"{title}\" section of the report.\n\
             Section focus: {description}\n\n\
             Events ({event_count} total):\n{events_context}\n\n\
             Begin the section now:",
            title = section.title,
            description = section.description,
        );

        let messages = vec![
            ChatMessage::system(system_prompt.to_string()),
            ChatMessage::user(user),
        ];

        let mut content = String::new();
        let mut stream = Box::pin(self.llm.chat_stream(messages));
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(delta) => {
                    content.push_str(&delta);
                    let _ = tx.send(ReportEvent::SectionStream {
                        section_title: section.title.clone(),
                        chunk: delta,
                    });
                }
                Err(e) => {
                    warn!(section = %section.title, error = %e, "section stream failed");
                    if content.is_empty() {
                        content = format!("Section generation failed: {e}");
                    }
                    break;
                }
            }
        }

        info!(
            section = %section.title,
            chars = content.chars().count(),
            "section generated"
        );
        content
    }
}

/// Slice of article fields the prompt builder and citation registry need.
pub struct ArticleMeta {
    pub title: String,
    pub url: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub images: Vec<String>,
    pub excerpt: Option<String>,
}

fn article_metadata(articles: &[Article]) -> HashMap<i64, ArticleMeta> {
    articles
        .iter()
        .map(|a| {
            let excerpt = a
                .content
                .as_deref()
                .map(|c| c.chars().take(100).collect::<String>())
                .filter(|c| !c.is_empty());
            (
                a.id,
                ArticleMeta {
                    title: a.title.clone(),
                    url: a.url.clone(),
                    publish_time: a.publish_time,
                    author: a.author.clone(),
                    images: a.images(),
                    excerpt,
                },
            )
        })
        .collect()
}

/// Render all events with their article metadata (title, time, url, up to
/// five images per event) for the section prompts.
fn build_events_context(events: &[ExtractedEvent], metadata: &HashMap<i64, ArticleMeta>) -> String {
    if events.is_empty() {
        return "No events in this period.".to_string();
    }

    let mut parts = Vec::new();
    for (i, event) in events.iter().enumerate() {
        let mut block = format!(
            "{n}. {title}\n   Summary: {summary}\n   Importance: {importance:.2}\n   Keywords: {keywords}",
            n = i + 1,
            title = event.title,
            summary = event.summary,
            importance = event.importance,
            keywords = event.keywords.join(", "),
        );

        let mut images: Vec<&str> = Vec::new();
        block.push_str("\n   Articles:");
        for article_id in event.article_ids.iter().take(MAX_ARTICLES_PER_EVENT) {
            let Some(meta) = metadata.get(article_id) else {
                continue;
            };
            let published = meta
                .publish_time
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            block.push_str(&format!(
                "\n   - [{id}] {title} ({published}) {url}",
                id = article_id,
                title = meta.title,
                url = meta.url,
            ));
            for image in &meta.images {
                if images.len() < MAX_IMAGES_PER_EVENT && !images.contains(&image.as_str()) {
                    images.push(image);
                }
            }
        }
        if !images.is_empty() {
            block.push_str("\n   Images:");
            for image in images {
                block.push_str(&format!("\n   ![related image]({image})"));
            }
        }
        parts.push(block);
    }
    parts.join("\n\n")
}

/// Final document: header with overview counts, sections in template order,
/// the event list appendix, and the references block.
fn merge_report(
    report: &Report,
    sections: &[GeneratedSection],
    events: &[ExtractedEvent],
    statistics: &serde_json::Value,
    references: &ReferenceManager,
) -> String {
    let mut out = format!(
        "# {title}\n\n\
         **Time range**: {start} to {end}\n\n\
         **Generated**: {generated}\n\n\
         ---\n\n\
         ## Overview\n\n\
         - **Articles considered**: {total}\n\
         - **After deduplication**: {clustered}\n\
         - **Key events**: {event_count}\n\n\
         ---\n\n",
        title = report.title,
        start = report.time_range_start.format("%Y-%m-%d"),
        end = report.time_range_end.format("%Y-%m-%d"),
        generated = Utc::now().format("%Y-%m-%d %H:%M:%S"),
        total = statistics.get("total_articles").and_then(|v| v.as_u64()).unwrap_or(0),
        clustered = statistics.get("clustered_articles").and_then(|v| v.as_u64()).unwrap_or(0),
        event_count = events.len(),
    );

    for section in sections {
        out.push_str(&format!("## {}\n\n{}\n\n---\n\n", section.title, section.content));
    }

    out.push_str("## Key Event List\n\n");
    for (i, event) in events.iter().enumerate() {
        out.push_str(&format!(
            "{n}. **{title}**\n   - {summary}\n   - Keywords: {keywords}\n   - Articles: {count}\n\n",
            n = i + 1,
            title = event.title,
            summary = event.summary,
            keywords = event.keywords.join(", "),
            count = event.article_count,
        ));
    }

    references.format_report(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(title: &str, article_ids: Vec<i64>) -> ExtractedEvent {
        ExtractedEvent {
            title: title.to_string(),
            summary: "Summary text".to_string(),
            keywords: vec!["alpha".to_string(), "beta".to_string()],
            importance: 0.7,
            tfidf_importance: 0.7,
            keyword_relevance: 0.0,
            representative_article_id: article_ids[0],
            article_count: article_ids.len(),
            content_length: 1000,
            article_ids,
        }
    }

    fn meta(title: &str, images: Vec<String>) -> ArticleMeta {
        ArticleMeta {
            title: title.to_string(),
            url: "https://example.com/a".to_string(),
            publish_time: None,
            author: None,
            images,
            excerpt: Some("Excerpt".to_string()),
        }
    }

    #[test]
    fn events_context_lists_articles_and_caps_images() {
        let mut metadata = HashMap::new();
        metadata.insert(
            1,
            meta(
                "Article one",
                (0..8).map(|i| format!("https://img.example.com/{i}.jpg")).collect(),
            ),
        );
        metadata.insert(2, meta("Article two", vec![]));

        let events = vec![event("Event title", vec![1, 2])];
        let context = build_events_context(&events, &metadata);

        assert!(context.contains("Event title"));
        assert!(context.contains("Article one"));
        assert!(context.contains("Article two"));
        let image_count = context.matches("![related image]").count();
        assert_eq!(image_count, MAX_IMAGES_PER_EVENT);
    }

    #[test]
    fn events_context_empty_case() {
        let context = build_events_context(&[], &HashMap::new());
        assert_eq!(context, "No events in this period.");
    }

    #[test]
    fn merged_report_has_header_sections_and_references() {
        let report = Report {
            id: 1,
            title: "Weekly report".to_string(),
            time_range_start: Utc::now() - chrono::Duration::days(7),
            time_range_end: Utc::now(),
            template_id: None,
            language: "en".to_string(),
            custom_prompt: None,
            max_events: 20,
            status: "generating".to_string(),
            agent_stage: "merging_report".to_string(),
            progress: 90,
            content: None,
            sections: None,
            statistics: None,
            error: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let sections = vec![
            GeneratedSection {
                title: "Key Events".to_string(),
                content: "Body with citation (1).".to_string(),
            },
            GeneratedSection {
                title: "Summary".to_string(),
                content: "Wrap-up.".to_string(),
            },
        ];
        let events = vec![event("Event", vec![1])];
        let stats = serde_json::json!({"total_articles": 10, "clustered_articles": 4});
        let mut refs = ReferenceManager::new();
        refs.add_reference(crate::citation::Reference {
            article_id: 1,
            title: "Cited article".to_string(),
            url: "https://example.com/1".to_string(),
            source_name: None,
            publish_time: None,
            author: None,
            excerpt: None,
            citation_count: 0,
        });

        let merged = merge_report(&report, &sections, &events, &stats, &refs);

        assert!(merged.starts_with("# Weekly report"));
        assert!(merged.contains("**Articles considered**: 10"));
        let key_events = merged.find("## Key Events").unwrap();
        let summary = merged.find("## Summary").unwrap();
        assert!(key_events < summary, "sections stay in template order");
        assert!(merged.contains("## Key Event List"));
        assert!(merged.contains("## References"));
        // Marker normalization turned (1) into [1].
        assert!(merged.contains("citation [1]."));
    }
}
