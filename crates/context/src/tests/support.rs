//! Scripted collaborators and fixtures shared by the scenario tests.

use crate::clock::ManualClock;
use crate::collaborators::{Capture, DashboardSummary, Summarizer};
use crate::embeddings::providers::mock::MockProvider;
use crate::embeddings::{Embedder, EmbeddingProvider};
use crate::index_manager::IndexManager;
use crate::selector::{RelevanceSelector, SelectorSettings};
use crate::store::ContextStore;
use crate::system::{ContextSystem, ContextSystemParts};
use crate::types::{parse_timestamp, ChartInfo, DashboardContext, DashboardRef};
use async_trait::async_trait;
use dashlens_core::{AppError, AppResult, RefreshSettings};
use dashlens_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const START: &str = "2024-03-01 12:00:00";
pub const DIMENSIONS: usize = 128;

/// Words every indexed entry carries as field labels.
pub const ENTRY_LABELS: &[&str] = &["dashboard", "name", "summary", "charts", "last", "updated"];

/// Hashing embedder that ignores the entry field labels, so similarity comes
/// from dashboard content alone.
pub fn content_embeddings() -> MockProvider {
    MockProvider::new(DIMENSIONS).ignoring(ENTRY_LABELS)
}

/// LLM client that plays back canned responses in order.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<AppResult<String>>>,
    requests: Mutex<Vec<LlmRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<AppResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Llm("script exhausted".to_string())));

        next.map(|content| LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(0, 0),
            truncated: false,
        })
    }
}

/// Embedding provider that is always down.
#[derive(Debug)]
pub struct UnavailableEmbeddings;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbeddings {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Embedding("connection refused".to_string()))
    }
}

/// Content embedder that takes `delay` per call.
#[derive(Debug)]
pub struct SlowEmbeddings {
    inner: MockProvider,
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowEmbeddings {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: content_embeddings(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbeddings {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }
}

/// Summarizer with per-dashboard canned text and failures.
#[derive(Default)]
pub struct FixtureSummarizer {
    summaries: HashMap<String, String>,
    failing: HashSet<String>,
    slow: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl FixtureSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, id: &str, summary: &str) -> Self {
        self.summaries.insert(id.to_string(), summary.to_string());
        self
    }

    pub fn failing_for(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn slow_for(mut self, id: &str, delay: Duration) -> Self {
        self.slow.insert(id.to_string(), delay);
        self
    }

    /// Ids summarized so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for FixtureSummarizer {
    async fn summarize(
        &self,
        dashboard: &DashboardRef,
        _capture: Option<&Capture>,
    ) -> AppResult<DashboardSummary> {
        self.calls.lock().unwrap().push(dashboard.id.clone());

        if let Some(delay) = self.slow.get(&dashboard.id) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(&dashboard.id) {
            return Err(AppError::Summarize(format!(
                "vision model rejected dashboard {}",
                dashboard.id
            )));
        }

        let summary = self
            .summaries
            .get(&dashboard.id)
            .cloned()
            .unwrap_or_else(|| format!("{} dashboard", dashboard.title));

        Ok(DashboardSummary {
            summary,
            charts: dashboard
                .charts
                .iter()
                .map(|chart| ChartInfo {
                    title: chart.title.clone(),
                    chart_type: chart.chart_type.clone(),
                    summary: format!("{} shown as a {} chart", chart.title, chart.chart_type),
                    screenshot: None,
                })
                .collect(),
        })
    }
}

/// `n` contexts with ids `d0..`, not persisted anywhere.
pub fn contexts(n: usize) -> Vec<DashboardContext> {
    (0..n)
        .map(|i| DashboardContext {
            dashboard_id: format!("d{}", i),
            dashboard_name: format!("Dashboard {}", i),
            last_update_time: START.to_string(),
            summary: format!("Summary of dashboard {}", i),
            charts: Vec::new(),
            screenshot: None,
            persisted_location: PathBuf::from(format!("d{}.md", i)),
        })
        .collect()
}

/// Sales, infrastructure and marketing dashboards with distinct vocabulary.
pub fn abc_dashboards() -> Vec<DashboardRef> {
    vec![
        DashboardRef::new("a", "Sales Performance")
            .with_chart("Revenue by Region", "bar")
            .with_chart("Quarterly Bookings", "line"),
        DashboardRef::new("b", "Infrastructure Health").with_chart("Server Latency", "line"),
        DashboardRef::new("c", "Marketing Funnel").with_chart("Campaign Conversion", "funnel"),
    ]
}

pub fn abc_summarizer() -> FixtureSummarizer {
    FixtureSummarizer::new()
        .with_summary("a", "Revenue and bookings split by region and quarter.")
        .with_summary("b", "Server latency, error rates and uptime for production hosts.")
        .with_summary("c", "Campaign conversion funnel from visit to signup.")
}

/// A fully wired system on a temp workspace with a manual clock.
pub struct Harness {
    pub temp: TempDir,
    pub clock: Arc<ManualClock>,
    pub llm: Arc<ScriptedLlm>,
    pub summarizer: Arc<FixtureSummarizer>,
    pub system: ContextSystem,
}

pub struct HarnessBuilder {
    temp: Option<TempDir>,
    embeddings: Arc<dyn EmbeddingProvider>,
    responses: Vec<AppResult<String>>,
    summarizer: FixtureSummarizer,
    refresh: RefreshSettings,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            temp: None,
            embeddings: Arc::new(content_embeddings()),
            responses: Vec::new(),
            summarizer: abc_summarizer(),
            refresh: RefreshSettings::default(),
        }
    }

    /// Reuse a workspace from an earlier harness.
    pub fn workspace(mut self, temp: TempDir) -> Self {
        self.temp = Some(temp);
        self
    }

    pub fn embeddings(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = provider;
        self
    }

    pub fn responses(mut self, responses: Vec<AppResult<String>>) -> Self {
        self.responses = responses;
        self
    }

    pub fn summarizer(mut self, summarizer: FixtureSummarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn dashboard_timeout_secs(mut self, secs: u64) -> Self {
        self.refresh.dashboard_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Harness {
        let temp = self.temp.unwrap_or_else(|| TempDir::new().unwrap());
        let clock = Arc::new(ManualClock::new(parse_timestamp(START).unwrap()));
        let llm = Arc::new(ScriptedLlm::new(self.responses));
        let summarizer = Arc::new(self.summarizer);

        let store = Arc::new(
            ContextStore::open(contexts_dir(temp.path()), 7, clock.clone()).unwrap(),
        );
        let index_manager = Arc::new(IndexManager::new(
            store.clone(),
            Embedder::new(self.embeddings, Duration::from_secs(5)),
            clock.clone(),
            "dashboard_index",
            index_dir(temp.path()),
            24,
        ));
        let selector = RelevanceSelector::new(
            llm.clone(),
            SelectorSettings {
                model: "test-model".to_string(),
                max_tokens: 1500,
                temperature: 0.3,
                timeout: Duration::from_secs(5),
                max_attempts: 2,
                retry_backoff: Duration::from_millis(1),
            },
        )
        .unwrap();

        let system = ContextSystem::new(ContextSystemParts {
            store,
            index_manager,
            selector,
            summarizer: summarizer.clone(),
            source: None,
            clock: clock.clone(),
            refresh: self.refresh,
        });

        Harness {
            temp,
            clock,
            llm,
            summarizer,
            system,
        }
    }
}

pub fn contexts_dir(workspace: &Path) -> PathBuf {
    workspace.join(".dashlens").join("contexts")
}

pub fn index_dir(workspace: &Path) -> PathBuf {
    workspace.join(".dashlens").join("index")
}

pub fn selection_ids(selection: &crate::types::Selection) -> Vec<&str> {
    selection
        .results
        .iter()
        .map(|r| r.context.dashboard_id.as_str())
        .collect()
}
