//! Vector index over dashboard contexts.
//!
//! Each entry keeps a denormalized copy of the context text it was embedded
//! from, so the index can be persisted and searched without the store.
//! Vectors live in a LanceDB table under `<dir>`; `<dir>/<name>.meta.json`
//! names the live table and the embedding identity it was built with.
//!
//! Index `name` alternates between two tables. A rebuild fills the one the
//! metadata does not point at and only then rewrites the metadata, so a
//! failed build leaves the persisted index as it was.

use crate::embeddings::{Embedder, EmbeddingConfig};
use crate::store::write_atomic;
use crate::types::{format_timestamp, DashboardContext, IndexStats};
use crate::vector_index::{LanceDbIndex, VectorIndex, VectorRow};
use dashlens_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const META_VERSION: u32 = 2;
const SLOTS: [&str; 2] = ["a", "b"];

/// Chart text carried by an index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChart {
    pub title: String,
    pub chart_type: String,
    pub summary: String,
}

/// Text of one context as it was embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub dashboard_id: String,
    pub dashboard_name: String,
    pub summary: String,
    pub charts: Vec<IndexedChart>,
    pub last_update_time: String,
}

impl IndexEntry {
    pub fn from_context(context: &DashboardContext) -> Self {
        Self {
            dashboard_id: context.dashboard_id.clone(),
            dashboard_name: context.dashboard_name.clone(),
            summary: context.summary.clone(),
            charts: context
                .charts
                .iter()
                .map(|c| IndexedChart {
                    title: c.title.clone(),
                    chart_type: c.chart_type.clone(),
                    summary: c.summary.clone(),
                })
                .collect(),
            last_update_time: context.last_update_time.clone(),
        }
    }

    /// The text blob that gets embedded.
    ///
    /// Charts contribute only when they have both a title and a summary.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            format!("Dashboard Name: {}", self.dashboard_name),
            format!("Summary: {}", self.summary),
        ];

        let charts: Vec<String> = self
            .charts
            .iter()
            .filter(|c| !c.title.trim().is_empty() && !c.summary.trim().is_empty())
            .map(|c| {
                if c.chart_type.trim().is_empty() {
                    format!("{}: {}", c.title, c.summary)
                } else {
                    format!("{} ({}): {}", c.title, c.chart_type, c.summary)
                }
            })
            .collect();
        if !charts.is_empty() {
            parts.push(format!("Charts: {}", charts.join(" | ")));
        }

        parts.push(format!("Last Updated: {}", self.last_update_time));
        parts.join("\n")
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub dashboard_id: String,

    /// Cosine similarity clamped to [0, 1]
    pub score: f32,
    pub entry: IndexEntry,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    version: u32,
    embedding: EmbeddingConfig,
    table: String,
    created_at: String,
}

/// Embedding-backed similarity index for dashboard contexts.
///
/// An index created with [`EmbeddingIndex::new`] has no table behind it and
/// stays empty; [`EmbeddingIndex::staging`] and [`EmbeddingIndex::load`]
/// attach one.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    embedder: Embedder,
    dir: PathBuf,
    name: String,
    table: Option<String>,
    vectors: Option<Arc<dyn VectorIndex>>,
    entries: Vec<IndexEntry>,
    ids: HashSet<String>,
}

impl EmbeddingIndex {
    pub fn new(embedder: Embedder, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            embedder,
            dir: dir.into(),
            name: name.into(),
            table: None,
            vectors: None,
            entries: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// An empty index writing to `table` through `vectors`.
    pub(crate) fn with_vectors(
        embedder: Embedder,
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        table: impl Into<String>,
        vectors: Arc<dyn VectorIndex>,
    ) -> Self {
        let mut index = Self::new(embedder, dir, name);
        index.table = Some(table.into());
        index.vectors = Some(vectors);
        index
    }

    /// An empty index over the table this one is not using, cleared and
    /// ready to be filled.
    pub async fn staging(&self) -> AppResult<Self> {
        let table = self.next_table();
        let vectors =
            LanceDbIndex::open_or_create(&self.dir, &table, self.embedder.dimensions()).await?;
        vectors.reset().await?;

        tracing::debug!(index = %self.name, table = %table, "Prepared staging table");
        Ok(Self::with_vectors(
            self.embedder.clone(),
            self.dir.clone(),
            self.name.clone(),
            table,
            Arc::new(vectors),
        ))
    }

    fn table_for(&self, slot: &str) -> String {
        format!("{}_{}d_{}", self.name, self.embedder.dimensions(), slot)
    }

    /// The slot not held by this index, or else not named by the metadata.
    fn next_table(&self) -> String {
        let current = self
            .table
            .clone()
            .or_else(|| self.read_meta().ok().map(|meta| meta.table));
        let first = self.table_for(SLOTS[0]);
        if current.as_deref() == Some(first.as_str()) {
            self.table_for(SLOTS[1])
        } else {
            first
        }
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a table backs this index.
    pub fn is_attached(&self) -> bool {
        self.vectors.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, dashboard_id: &str) -> bool {
        self.ids.contains(dashboard_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.dashboard_id.as_str())
    }

    /// Embed `text` into a unit-length vector.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embedder.embed(text).await
    }

    fn vectors(&self) -> AppResult<&Arc<dyn VectorIndex>> {
        self.vectors.as_ref().ok_or_else(|| {
            AppError::Index(format!("Index '{}' has no table to write to", self.name))
        })
    }

    fn ensure_new(&self, dashboard_id: &str) -> AppResult<()> {
        if self.ids.contains(dashboard_id) {
            return Err(AppError::Index(format!(
                "Dashboard '{}' is already indexed",
                dashboard_id
            )));
        }
        Ok(())
    }

    /// Store an already-embedded entry, then record it. Fails on a duplicate
    /// id; nothing is recorded if the table write fails.
    pub async fn insert(&mut self, entry: IndexEntry, vector: Vec<f32>) -> AppResult<()> {
        self.ensure_new(&entry.dashboard_id)?;

        let row = VectorRow { entry, vector };
        self.vectors()?.append(std::slice::from_ref(&row)).await?;

        self.ids.insert(row.entry.dashboard_id.clone());
        self.entries.push(row.entry);
        Ok(())
    }

    /// Embed and insert one entry. Fails on a duplicate id or embedding failure.
    pub async fn add(&mut self, entry: IndexEntry) -> AppResult<()> {
        self.ensure_new(&entry.dashboard_id)?;
        let vector = self.embed(&entry.embedding_text()).await?;
        self.insert(entry, vector).await
    }

    /// Embed every entry and store the ones that embedded in one write.
    ///
    /// Entries that fail to embed or repeat an id are skipped with a warning.
    /// Returns how many were added; an error means the write failed and
    /// nothing was added.
    pub async fn add_batch(&mut self, entries: Vec<IndexEntry>) -> AppResult<usize> {
        let total = entries.len();
        let mut seen = self.ids.clone();
        let mut rows = Vec::with_capacity(total);

        for entry in entries {
            if !seen.insert(entry.dashboard_id.clone()) {
                tracing::warn!(dashboard_id = %entry.dashboard_id, "Skipping duplicate dashboard in index build");
                continue;
            }
            match self.embed(&entry.embedding_text()).await {
                Ok(vector) => rows.push(VectorRow { entry, vector }),
                Err(e) => {
                    tracing::warn!(dashboard_id = %entry.dashboard_id, error = %e, "Skipping dashboard in index build")
                }
            }
        }

        if !rows.is_empty() {
            self.vectors()?.append(&rows).await?;
        }

        let added = rows.len();
        for row in rows {
            self.ids.insert(row.entry.dashboard_id.clone());
            self.entries.push(row.entry);
        }

        tracing::debug!(added, total, "Indexed dashboard contexts");
        Ok(added)
    }

    /// Nearest entries to an already-embedded query.
    pub async fn search_vector(&self, query: &[f32], k: usize) -> AppResult<Vec<SearchHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.vectors()?.search(query, k).await?;
        Ok(hits
            .into_iter()
            .filter(|(entry, _)| self.ids.contains(&entry.dashboard_id))
            .map(|(entry, score)| SearchHit {
                dashboard_id: entry.dashboard_id.clone(),
                score: score.clamp(0.0, 1.0),
                entry,
            })
            .collect())
    }

    /// Nearest entries to `query`; empty when the index is empty or the
    /// query cannot be embedded or searched.
    pub async fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }

        let vector = match self.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to embed search query");
                return Vec::new();
            }
        };

        self.search_vector(&vector, k).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Vector search failed");
            Vec::new()
        })
    }

    /// Empty the index, table first.
    pub async fn clear(&mut self) -> AppResult<()> {
        if let Some(vectors) = &self.vectors {
            vectors.reset().await?;
        }
        self.entries.clear();
        self.ids.clear();
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        let config = self.embedder.config();
        IndexStats {
            vector_count: self.len(),
            dimension: config.dimensions,
            provider: config.provider,
            model: config.model,
            index_dir: self.dir.clone(),
        }
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.meta.json", self.name))
    }

    /// Whether a persisted index exists under this name.
    pub fn artifacts_exist(&self) -> bool {
        self.meta_path().is_file()
    }

    fn read_meta(&self) -> AppResult<IndexMeta> {
        let meta: IndexMeta = serde_json::from_str(&fs::read_to_string(self.meta_path())?)?;
        if meta.version != META_VERSION {
            return Err(AppError::Index(format!(
                "Unsupported index metadata version {}",
                meta.version
            )));
        }
        Ok(meta)
    }

    /// Make this index the persisted one by pointing the metadata at its table.
    pub fn save(&self) -> AppResult<()> {
        let table = self.table.as_deref().ok_or_else(|| {
            AppError::Index(format!("Index '{}' has no table to save", self.name))
        })?;

        let meta = IndexMeta {
            version: META_VERSION,
            embedding: self.embedder.config(),
            table: table.to_string(),
            created_at: format_timestamp(chrono::Local::now().naive_local()),
        };
        write_atomic(&self.meta_path(), &serde_json::to_string_pretty(&meta)?)?;

        tracing::info!(
            index = %self.name,
            table,
            vectors = self.len(),
            dir = %self.dir.display(),
            "Saved vector index"
        );
        Ok(())
    }

    /// Replace this index with the persisted one.
    ///
    /// Leaves the index untouched if the metadata or table is missing,
    /// unreadable, inconsistent, or was built with a different embedding
    /// identity.
    pub async fn load(&mut self) -> AppResult<()> {
        if !self.artifacts_exist() {
            return Err(AppError::Index(format!(
                "Index '{}' not found in {:?}",
                self.name, self.dir
            )));
        }

        let meta = self.read_meta()?;
        self.embedder.config().ensure_compatible(&meta.embedding)?;

        let vectors = LanceDbIndex::open(&self.dir, &meta.table, meta.embedding.dimensions).await?;
        let entries = vectors.entries().await?;

        let mut ids = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !ids.insert(entry.dashboard_id.clone()) {
                return Err(AppError::Index(format!(
                    "Index '{}' lists dashboard '{}' twice",
                    self.name, entry.dashboard_id
                )));
            }
        }

        self.table = Some(meta.table);
        self.vectors = Some(Arc::new(vectors));
        self.entries = entries;
        self.ids = ids;

        tracing::info!(index = %self.name, vectors = self.len(), "Loaded vector index");
        Ok(())
    }
}
