//! Dashboard context cache and relevance retrieval.
//!
//! Keeps one natural-language context per BI dashboard on disk, refreshes the
//! ones that have expired, and answers "which dashboards are relevant to this
//! question?" with vector search over the contexts, falling back to LLM
//! ranking when the index has nothing to offer.

pub mod clock;
pub mod collaborators;
pub mod embedding_index;
pub mod embeddings;
pub mod index_manager;
pub mod record;
pub mod selector;
pub mod source;
pub mod store;
pub mod summarizer;
pub mod system;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{Capture, DashboardSource, DashboardSummary, Summarizer};
pub use embedding_index::{EmbeddingIndex, IndexEntry, SearchHit};
pub use embeddings::{Embedder, EmbeddingConfig, EmbeddingProvider};
pub use index_manager::IndexManager;
pub use selector::{RelevanceSelector, SelectorSettings};
pub use source::StaticSource;
pub use store::ContextStore;
pub use summarizer::{sanitize_summary, MetadataSummarizer};
pub use system::{ContextSystem, ContextSystemParts, DEFAULT_TOP_K};
pub use types::{
    ChartInfo, ChartRef, DashboardContext, DashboardRef, FailedUpdate, IndexStats, IndexStatus,
    RefreshReport, ScoredContext, Selection, SelectionMethod, SystemStatus, UpdatedContext,
};
pub use vector_index::{LanceDbIndex, VectorIndex, VectorRow};
