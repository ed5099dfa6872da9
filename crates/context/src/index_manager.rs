//! Lifecycle of the persisted vector index.
//!
//! The manager owns the live [`EmbeddingIndex`] behind a `tokio` read/write
//! lock. Rebuilds embed into a staging index with no lock on the live one,
//! persist it, and only then swap it in under a short write lock; a separate
//! build mutex keeps at most one rebuild running. Searches never wait: if the
//! index is being swapped they return nothing and the caller falls back to
//! ranking.

use crate::clock::Clock;
use crate::embedding_index::{EmbeddingIndex, IndexEntry};
use crate::embeddings::Embedder;
use crate::store::ContextStore;
use crate::types::{format_timestamp, DashboardContext, IndexStatus, ScoredContext};
use chrono::{Duration, NaiveDateTime};
use dashlens_core::AppResult;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

/// Builds, persists, restores and searches the vector index over the store.
#[derive(Debug)]
pub struct IndexManager {
    store: Arc<ContextStore>,
    embedder: Embedder,
    clock: Arc<dyn Clock>,
    name: String,
    dir: PathBuf,
    update_interval_hours: u64,
    index: RwLock<EmbeddingIndex>,
    build_lock: AsyncMutex<()>,
    last_build: Mutex<Option<NaiveDateTime>>,
}

impl IndexManager {
    pub fn new(
        store: Arc<ContextStore>,
        embedder: Embedder,
        clock: Arc<dyn Clock>,
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        update_interval_hours: u64,
    ) -> Self {
        let dir = dir.into();
        let name = name.into();
        let index = EmbeddingIndex::new(embedder.clone(), dir.clone(), name.clone());
        Self {
            store,
            embedder,
            clock,
            name,
            dir,
            update_interval_hours,
            index: RwLock::new(index),
            build_lock: AsyncMutex::new(()),
            last_build: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_build_time(&self) -> Option<NaiveDateTime> {
        *self.last_build.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_built(&self, at: NaiveDateTime) {
        *self.last_build.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    fn detached(&self) -> EmbeddingIndex {
        EmbeddingIndex::new(self.embedder.clone(), self.dir.clone(), self.name.clone())
    }

    /// Number of vectors in the live index.
    pub async fn vector_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// True if never built, the update interval has elapsed, or any context
    /// was updated after the last build.
    pub fn should_rebuild(&self) -> bool {
        let Some(last_build) = self.last_build_time() else {
            return true;
        };

        // Capped at a century so the conversion cannot overflow
        let hours = self.update_interval_hours.min(24 * 365 * 100) as i64;
        if self.clock.now() - last_build >= Duration::hours(hours) {
            return true;
        }

        self.store
            .get_all()
            .iter()
            .any(|context| context.is_newer_than(last_build))
    }

    /// Rebuild from every stored context when forced or stale.
    ///
    /// Returns `Ok(false)` when nothing needed doing or nothing could be indexed.
    pub async fn build(&self, force: bool) -> AppResult<bool> {
        let _guard = self.build_lock.lock().await;
        if !force && !self.should_rebuild() {
            tracing::debug!(index = %self.name, "Vector index is current, skipping build");
            return Ok(false);
        }
        self.rebuild_locked(None, false).await
    }

    /// Build into a staging index, persist it, then install it. Caller holds
    /// `build_lock`.
    ///
    /// The build is stamped with its start time, so contexts saved while it
    /// runs still count as newer than the index.
    async fn rebuild_locked(&self, exclude: Option<&str>, allow_empty: bool) -> AppResult<bool> {
        let started = self.clock.now();
        let entries: Vec<IndexEntry> = self
            .store
            .get_all()
            .iter()
            .filter(|context| Some(context.dashboard_id.as_str()) != exclude)
            .map(IndexEntry::from_context)
            .collect();
        let total = entries.len();

        tracing::info!(index = %self.name, contexts = total, "Building vector index");

        let mut staging = self.index.read().await.staging().await?;
        let added = staging.add_batch(entries).await?;

        if added == 0 && !allow_empty {
            tracing::warn!(
                index = %self.name,
                contexts = total,
                "No contexts could be indexed, keeping the current index"
            );
            return Ok(false);
        }

        staging.save()?;
        *self.index.write().await = staging;
        self.mark_built(started);

        tracing::info!(index = %self.name, vectors = added, "Vector index built");
        Ok(true)
    }

    /// Restore the persisted index, if one exists.
    ///
    /// `Ok(false)` when there is nothing on disk; an error when the artifacts
    /// are unreadable or were built by a different embedding provider.
    pub async fn load_existing(&self) -> AppResult<bool> {
        let _guard = self.build_lock.lock().await;

        let mut staging = self.detached();
        if !staging.artifacts_exist() {
            tracing::debug!(index = %self.name, "No persisted vector index");
            return Ok(false);
        }

        let started = self.clock.now();
        staging.load().await?;
        *self.index.write().await = staging;
        self.mark_built(started);
        Ok(true)
    }

    /// Contexts most similar to `question`, best first, at most `k`.
    ///
    /// An empty index gets one rebuild attempt. Returns nothing if the index
    /// is busy, the query cannot be embedded, or no hits map to stored contexts.
    pub async fn search(&self, question: &str, k: usize) -> Vec<ScoredContext> {
        if k == 0 {
            return Vec::new();
        }

        let is_empty = match self.index.try_read() {
            Ok(index) => index.is_empty(),
            Err(_) => {
                tracing::debug!("Vector index is being replaced, skipping vector search");
                return Vec::new();
            }
        };

        if is_empty {
            self.try_rebuild_stale().await;
            if self.index.try_read().map_or(true, |index| index.is_empty()) {
                return Vec::new();
            }
        }

        let query = match self.embedder.embed(question).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to embed question");
                return Vec::new();
            }
        };

        let hits = match self.index.try_read() {
            Ok(index) => index.search_vector(&query, k).await,
            Err(_) => {
                tracing::debug!("Vector index is being replaced, skipping vector search");
                return Vec::new();
            }
        };
        let hits = match hits {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "Vector search failed");
                return Vec::new();
            }
        };

        let results: Vec<ScoredContext> = hits
            .into_iter()
            .filter_map(|hit| {
                let context = self.store.get(&hit.dashboard_id);
                if context.is_none() {
                    tracing::debug!(dashboard_id = %hit.dashboard_id, "Indexed dashboard has no stored context");
                }
                context.map(|context| ScoredContext {
                    context,
                    score: hit.score,
                })
            })
            .take(k)
            .collect();

        tracing::debug!(hits = results.len(), "Vector search complete");
        results
    }

    /// One non-blocking rebuild attempt for an empty index.
    async fn try_rebuild_stale(&self) {
        let Ok(_guard) = self.build_lock.try_lock() else {
            tracing::debug!("Vector index build already running");
            return;
        };

        if self.store.is_empty() || !self.should_rebuild() {
            return;
        }

        if let Err(e) = self.rebuild_locked(None, false).await {
            tracing::warn!(error = %e, "Vector index rebuild failed");
        }
    }

    /// Add one context to the live index; the row is stored before the index
    /// records it.
    ///
    /// A context that is already indexed cannot be replaced in place, and an
    /// index that was never built or loaded has no table yet; both trigger a
    /// full rebuild (O(n) embeddings).
    pub async fn add_one(&self, context: &DashboardContext) -> AppResult<bool> {
        let _guard = self.build_lock.lock().await;

        let (indexed, attached) = {
            let index = self.index.read().await;
            (index.contains(&context.dashboard_id), index.is_attached())
        };
        if indexed || !attached {
            tracing::debug!(dashboard_id = %context.dashboard_id, indexed, "Rebuilding index for context");
            return self.rebuild_locked(None, false).await;
        }

        let entry = IndexEntry::from_context(context);
        let vector = self.embedder.embed(&entry.embedding_text()).await?;

        self.index.write().await.insert(entry, vector).await?;
        Ok(true)
    }

    /// Drop one dashboard from the index by rebuilding from every other
    /// context (O(n) embeddings). Persists even when the result is empty.
    ///
    /// Returns whether the dashboard was indexed.
    pub async fn remove(&self, dashboard_id: &str) -> AppResult<bool> {
        let _guard = self.build_lock.lock().await;

        let was_indexed = self.index.read().await.contains(dashboard_id);
        self.rebuild_locked(Some(dashboard_id), true).await?;
        Ok(was_indexed)
    }

    pub async fn status(&self) -> IndexStatus {
        let stats = self.index.read().await.stats();
        let last_build = self.last_build_time();
        IndexStatus {
            index_name: self.name.clone(),
            loaded: last_build.is_some(),
            stats,
            last_build_time: last_build.map(format_timestamp),
            update_interval_hours: self.update_interval_hours,
            should_rebuild: self.should_rebuild(),
        }
    }
}
