//! Report templates: ordered section layouts with an optional system
//! prompt. A few presets ship built in; custom templates can be registered
//! at runtime.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionTemplate {
    pub title: String,
    pub description: String,
}

impl SectionTemplate {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub sections: Vec<SectionTemplate>,
}

/// The sections used when a report names no template.
pub fn default_sections() -> Vec<SectionTemplate> {
    vec![
        SectionTemplate::new("Key Events", "The most significant news events of the period"),
        SectionTemplate::new("Detailed Analysis", "In-depth analysis of the selected events"),
        SectionTemplate::new("Summary", "Period summary and outlook"),
    ]
}

pub struct TemplateManager {
    templates: HashMap<String, ReportTemplate>,
}

impl TemplateManager {
    /// Manager pre-loaded with the built-in presets.
    pub fn new() -> Self {
        let mut manager = Self {
            templates: HashMap::new(),
        };
        for template in presets() {
            manager.add(template);
        }
        manager
    }

    pub fn get(&self, template_id: &str) -> Option<&ReportTemplate> {
        self.templates.get(template_id)
    }

    pub fn list(&self) -> Vec<&ReportTemplate> {
        let mut all: Vec<&ReportTemplate> = self.templates.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn add(&mut self, template: ReportTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn remove(&mut self, template_id: &str) -> bool {
        self.templates.remove(template_id).is_some()
    }

    /// Build a one-off template from section titles.
    pub fn custom(
        &self,
        id: &str,
        name: &str,
        section_titles: &[String],
        system_prompt: Option<String>,
    ) -> ReportTemplate {
        ReportTemplate {
            id: id.to_string(),
            name: name.to_string(),
            description: "Custom template".to_string(),
            system_prompt,
            sections: section_titles
                .iter()
                .map(|t| SectionTemplate::new(t, ""))
                .collect(),
        }
    }
}

impl Default for TemplateManager {
    fn default() -> Self {
        Self::new()
    }
}

fn presets() -> Vec<ReportTemplate> {
    vec![
        ReportTemplate {
            id: "weekly-brief".to_string(),
            name: "Weekly Brief".to_string(),
            description: "Compact weekly digest for analysts".to_string(),
            system_prompt: None,
            sections: vec![
                SectionTemplate::new("Top Stories", "The week's most consequential events"),
                SectionTemplate::new("Trends", "Patterns emerging across the coverage"),
                SectionTemplate::new("Watchlist", "Developing situations to track next week"),
            ],
        },
        ReportTemplate {
            id: "monthly-analysis".to_string(),
            name: "Monthly Analysis".to_string(),
            description: "Longer-form monthly situation report".to_string(),
            system_prompt: None,
            sections: vec![
                SectionTemplate::new("Executive Summary", "One-page overview of the month"),
                SectionTemplate::new("Key Events", "The month's defining events in detail"),
                SectionTemplate::new("Sector Impact", "Consequences by sector and region"),
                SectionTemplate::new("Outlook", "Expected developments next month"),
            ],
        },
        ReportTemplate {
            id: "incident-digest".to_string(),
            name: "Incident Digest".to_string(),
            description: "Fast-turnaround digest for a single developing story".to_string(),
            system_prompt: Some(
                "You are drafting a fast incident digest. Lead with verified facts, keep \
                 speculation clearly marked, and cite a source for every claim."
                    .to_string(),
            ),
            sections: vec![
                SectionTemplate::new("What Happened", "Verified timeline of the incident"),
                SectionTemplate::new("Reactions", "Official statements and public response"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_registered() {
        let manager = TemplateManager::new();
        assert!(manager.get("weekly-brief").is_some());
        assert!(manager.get("monthly-analysis").is_some());
        assert!(manager.get("incident-digest").is_some());
        assert!(manager.get("nope").is_none());
    }

    #[test]
    fn listing_is_sorted_by_id() {
        let manager = TemplateManager::new();
        let ids: Vec<&str> = manager.list().iter().map(|t| t.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn custom_template_carries_sections_in_order() {
        let manager = TemplateManager::new();
        let template = manager.custom(
            "adhoc",
            "Ad hoc",
            &["First".to_string(), "Second".to_string()],
            None,
        );
        let titles: Vec<&str> = template.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn add_and_remove_round_trip() {
        let mut manager = TemplateManager::new();
        let template = manager.custom("tmp", "Temp", &["Only".to_string()], None);
        manager.add(template);
        assert!(manager.get("tmp").is_some());
        assert!(manager.remove("tmp"));
        assert!(manager.get("tmp").is_none());
        assert!(!manager.remove("tmp"));
    }

    #[test]
    fn default_sections_are_three_ordered() {
        let sections = default_sections();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, "Key Events");
    }
}
