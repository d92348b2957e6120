//! Report generation: the OpenAI-compatible LLM client, keyword
//! generation, report templates, citation tracking, and the streaming
//! report agent.

pub mod citation;
pub mod keywords;
pub mod llm;
pub mod report;
pub mod templates;

pub use citation::{CitationParser, CitationValidation, Reference, ReferenceManager};
pub use keywords::KeywordGenerator;
pub use llm::{ChatMessage, LlmClient, LlmEventSelector};
pub use report::{GeneratedSection, ReportAgent, ReportEvent, ReportHub};
pub use templates::{default_sections, ReportTemplate, SectionTemplate, TemplateManager};
