//! Deduplication and ranking core: SimHash fingerprints, influence
//! scoring, content compression, event extraction, and the aggregation
//! pipeline that feeds report generation.

pub mod aggregator;
pub mod cluster;
pub mod compress;
pub mod events;
pub mod scorer;
pub mod simhash;

pub use aggregator::{ArticleSummary, DataAggregator, EventSelector};
pub use cluster::{ArticleCluster, ArticleClusteringService};
pub use compress::{CompressedArticle, CompressionMode, ContentCompressor, ContextBuilder};
pub use events::{EventExtractor, EventSelectionService, ExtractedEvent};
pub use scorer::{InfluenceScorer, ScorableArticle};
pub use simhash::{ClusterGroup, SimHash, TextCluster, TokenKind};
