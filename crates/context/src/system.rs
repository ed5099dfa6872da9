//! Orchestration of refresh, selection and status.

use crate::clock::{Clock, SystemClock};
use crate::collaborators::{Capture, DashboardSource, Summarizer};
use crate::embeddings::{create_provider, Embedder};
use crate::index_manager::IndexManager;
use crate::selector::{RelevanceSelector, SelectorSettings};
use crate::store::ContextStore;
use crate::summarizer::{sanitize_summary, MetadataSummarizer};
use crate::types::{
    format_timestamp, DashboardContext, DashboardRef, FailedUpdate, RefreshReport, ScoredContext,
    Selection, SelectionMethod, SystemStatus, UpdatedContext,
};
use dashlens_core::{AppConfig, AppError, AppResult, RefreshSettings};
use dashlens_llm::create_client;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Number of dashboards `select` returns when the caller has no preference.
pub const DEFAULT_TOP_K: usize = 3;

/// Everything a [`ContextSystem`] is assembled from.
pub struct ContextSystemParts {
    pub store: Arc<ContextStore>,
    pub index_manager: Arc<IndexManager>,
    pub selector: RelevanceSelector,
    pub summarizer: Arc<dyn Summarizer>,
    pub source: Option<Arc<dyn DashboardSource>>,
    pub clock: Arc<dyn Clock>,
    pub refresh: RefreshSettings,
}

/// Keeps dashboard contexts fresh and picks the ones relevant to a question.
///
/// One instance per process, shared by `Arc`.
pub struct ContextSystem {
    store: Arc<ContextStore>,
    index_manager: Arc<IndexManager>,
    selector: RelevanceSelector,
    summarizer: Arc<dyn Summarizer>,
    source: Option<Arc<dyn DashboardSource>>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
    dashboard_timeout: Duration,
    last_method: Mutex<Option<SelectionMethod>>,
}

impl ContextSystem {
    pub fn new(parts: ContextSystemParts) -> Self {
        Self {
            store: parts.store,
            index_manager: parts.index_manager,
            selector: parts.selector,
            summarizer: parts.summarizer,
            source: parts.source,
            clock: parts.clock,
            concurrency: parts.refresh.concurrency.max(1),
            dashboard_timeout: Duration::from_secs(parts.refresh.dashboard_timeout_secs.max(1)),
            last_method: Mutex::new(None),
        }
    }

    /// Build the system described by `config` and restore any persisted index.
    ///
    /// Contexts are summarized from listing metadata until a richer
    /// [`Summarizer`] is supplied with [`ContextSystem::with_summarizer`].
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store = Arc::new(ContextStore::open(
            config.context_dir(),
            config.context.ttl_days,
            clock.clone(),
        )?);

        let embedding_key = config.resolve_api_key(config.embedding.api_key_env.as_deref());
        let provider = create_provider(&config.embedding, embedding_key.as_deref())?;
        let embedder = Embedder::new(
            provider,
            Duration::from_secs(config.embedding.timeout_secs.max(1)),
        );

        let index_manager = Arc::new(IndexManager::new(
            store.clone(),
            embedder,
            clock.clone(),
            config.index.name.clone(),
            config.index_dir(),
            config.index.update_interval_hours,
        ));

        let ranking_key = config.resolve_api_key(config.ranking.api_key_env.as_deref());
        let client = create_client(&config.ranking, ranking_key.as_deref())?;
        let selector = RelevanceSelector::new(client, SelectorSettings::from(&config.ranking))?;

        let system = Self::new(ContextSystemParts {
            store,
            index_manager,
            selector,
            summarizer: Arc::new(MetadataSummarizer),
            source: None,
            clock,
            refresh: config.refresh.clone(),
        });

        system.restore_index().await;
        Ok(system)
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn DashboardSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index_manager
    }

    /// Load the persisted index; an unusable one is logged and ignored.
    pub async fn restore_index(&self) -> bool {
        match self.index_manager.load_existing().await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring persisted vector index");
                false
            }
        }
    }

    /// Refresh from the configured dashboard source.
    pub async fn refresh_from_source(&self, force: bool) -> AppResult<RefreshReport> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| AppError::Config("No dashboard source configured".to_string()))?;
        let available = source.list_available_dashboards().await?;
        Ok(self.refresh(&available, force).await)
    }

    /// Bring contexts for `available` up to date.
    ///
    /// Expired or missing contexts are regenerated; with `force` every listed
    /// dashboard is. Contexts for dashboards no longer listed are removed when
    /// more than one dashboard is listed. Per-dashboard failures are reported,
    /// never raised.
    pub async fn refresh(&self, available: &[DashboardRef], force: bool) -> RefreshReport {
        let mut report = RefreshReport {
            total_dashboards: available.len(),
            ..RefreshReport::default()
        };

        let mut seen = HashSet::new();
        let mut valid: Vec<&DashboardRef> = Vec::new();
        for dashboard in available {
            if dashboard.id.trim().is_empty() {
                report.failed.push(FailedUpdate {
                    id: dashboard.id.clone(),
                    error: "Dashboard id must not be empty".to_string(),
                });
            } else if seen.insert(dashboard.id.as_str()) {
                valid.push(dashboard);
            }
        }
        let valid_ids: Vec<String> = valid.iter().map(|d| d.id.clone()).collect();

        if force {
            tracing::info!(count = valid_ids.len(), "Forcing refresh of listed dashboards");
            for id in &valid_ids {
                if let Err(e) = self.store.delete(id) {
                    tracing::warn!(dashboard_id = %id, error = %e, "Failed to delete context");
                }
            }
        }

        if available.len() > 1 {
            report.removed_count = self.store.cleanup(&valid_ids);
        }

        let expired: HashSet<String> = self.store.expired_ids(&valid_ids).into_iter().collect();
        report.expired_count = expired.len();

        tracing::info!(
            total = report.total_dashboards,
            expired = report.expired_count,
            removed = report.removed_count,
            "Refreshing dashboard contexts"
        );

        let outcomes: Vec<(String, AppResult<UpdatedContext>)> = stream::iter(
            valid
                .into_iter()
                .filter(|dashboard| expired.contains(&dashboard.id)),
        )
        .map(|dashboard| async move { (dashboard.id.clone(), self.refresh_one(dashboard).await) })
        .buffered(self.concurrency)
        .collect()
        .await;

        for (id, outcome) in outcomes {
            match outcome {
                Ok(updated) => {
                    tracing::info!(dashboard_id = %updated.id, name = %updated.name, "Updated context");
                    report.updated.push(updated);
                }
                Err(e) => {
                    tracing::warn!(dashboard_id = %id, error = %e, "Failed to update context");
                    report.failed.push(FailedUpdate {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.updated.is_empty() {
            match self.index_manager.build(true).await {
                Ok(rebuilt) => report.index_rebuilt = rebuilt,
                Err(e) => tracing::warn!(error = %e, "Vector index rebuild failed after refresh"),
            }
        }

        tracing::info!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            index_rebuilt = report.index_rebuilt,
            "Refresh complete"
        );
        report
    }

    async fn refresh_one(&self, dashboard: &DashboardRef) -> AppResult<UpdatedContext> {
        tokio::time::timeout(self.dashboard_timeout, self.summarize_and_save(dashboard))
            .await
            .map_err(|_| {
                AppError::timeout(
                    format!("refreshing dashboard {}", dashboard.id),
                    self.dashboard_timeout.as_secs(),
                )
            })?
    }

    async fn summarize_and_save(&self, dashboard: &DashboardRef) -> AppResult<UpdatedContext> {
        let capture = self.capture(dashboard).await;
        let summary = self
            .summarizer
            .summarize(dashboard, capture.as_ref())
            .await?;

        let name = if dashboard.title.trim().is_empty() {
            dashboard.id.clone()
        } else {
            dashboard.title.clone()
        };

        let context = DashboardContext {
            dashboard_id: dashboard.id.clone(),
            dashboard_name: name,
            last_update_time: format_timestamp(self.clock.now()),
            summary: sanitize_summary(&summary.summary),
            charts: summary
                .charts
                .into_iter()
                .map(|mut chart| {
                    chart.summary = sanitize_summary(&chart.summary);
                    chart
                })
                .collect(),
            screenshot: capture.and_then(|c| c.dashboard_screenshot),
            persisted_location: self.store.location_for(&dashboard.id),
        };

        let updated = UpdatedContext {
            id: context.dashboard_id.clone(),
            name: context.dashboard_name.clone(),
            update_time: context.last_update_time.clone(),
        };
        self.store.save(context)?;
        Ok(updated)
    }

    /// Screenshots, when a source is configured. Capture failures only cost
    /// the screenshots.
    async fn capture(&self, dashboard: &DashboardRef) -> Option<Capture> {
        let source = self.source.as_ref()?;
        match source.capture(dashboard).await {
            Ok(capture) => Some(capture),
            Err(e) => {
                tracing::warn!(dashboard_id = %dashboard.id, error = %e, "Screenshot capture failed");
                None
            }
        }
    }

    /// The `k` contexts most relevant to `question`.
    ///
    /// Tries vector search first and falls back to LLM ranking. Empty only
    /// when there are no contexts at all.
    pub async fn select(&self, question: &str, k: usize) -> Selection {
        if self.store.is_empty() || k == 0 {
            tracing::info!("No dashboard contexts to select from");
            return Selection::empty();
        }

        let results = self.index_manager.search(question, k).await;
        if !results.is_empty() {
            return self.record(SelectionMethod::VectorSearch, results);
        }

        tracing::info!("Vector search found nothing, ranking with the model");
        let contexts = self.store.get_all();
        let results = self.selector.select(question, &contexts, k).await;
        self.record(SelectionMethod::RankingFallback, results)
    }

    fn record(&self, method: SelectionMethod, results: Vec<ScoredContext>) -> Selection {
        tracing::info!(method = %method, count = results.len(), "Selected dashboards");
        *self.last_method.lock().unwrap_or_else(|e| e.into_inner()) = Some(method);
        Selection {
            method: Some(method),
            results,
        }
    }

    pub fn last_method(&self) -> Option<SelectionMethod> {
        *self.last_method.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn status(&self) -> SystemStatus {
        let (fresh, expired) = self.store.freshness_counts();
        let index = self.index_manager.status().await;
        let active_method = if index.stats.vector_count > 0 {
            SelectionMethod::VectorSearch
        } else {
            SelectionMethod::RankingFallback
        };

        SystemStatus {
            total_contexts: fresh + expired,
            fresh_contexts: fresh,
            expired_contexts: expired,
            ttl_days: self.store.ttl_days(),
            context_dir: self.store.dir().to_path_buf(),
            active_method,
            last_method: self.last_method(),
            index,
        }
    }
}
