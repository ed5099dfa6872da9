//! Seams to the BI platform and the summarizing model.
//!
//! The engine never talks to a dashboard platform or a vision model
//! directly; it goes through these traits so deployments can plug in their
//! own browser automation and prompting.

use crate::types::{ChartInfo, DashboardRef};
use async_trait::async_trait;
use dashlens_core::AppResult;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Screenshots captured for one dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capture {
    pub dashboard_screenshot: Option<PathBuf>,

    /// Keyed by chart title
    pub chart_screenshots: BTreeMap<String, PathBuf>,
}

impl Capture {
    pub fn is_empty(&self) -> bool {
        self.dashboard_screenshot.is_none() && self.chart_screenshots.is_empty()
    }
}

/// Lists dashboards and captures their screenshots.
#[async_trait]
pub trait DashboardSource: Send + Sync {
    async fn list_available_dashboards(&self) -> AppResult<Vec<DashboardRef>>;

    async fn capture(&self, dashboard: &DashboardRef) -> AppResult<Capture>;
}

/// What a summarizer says about one dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub summary: String,
    pub charts: Vec<ChartInfo>,
}

/// Produces the natural-language description of a dashboard.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        dashboard: &DashboardRef,
        capture: Option<&Capture>,
    ) -> AppResult<DashboardSummary>;
}
