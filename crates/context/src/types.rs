//! Context cache type definitions.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Format of every timestamp stored in a context record (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Score given to a dashboard when no model judged its relevance.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Format a timestamp the way context records store it.
pub fn format_timestamp(instant: NaiveDateTime) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

/// One chart within a dashboard context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInfo {
    pub title: String,
    pub chart_type: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

/// Cached natural-language summary of one dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardContext {
    pub dashboard_id: String,
    pub dashboard_name: String,

    /// `%Y-%m-%d %H:%M:%S`, local time
    pub last_update_time: String,

    pub summary: String,
    pub charts: Vec<ChartInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,

    /// Where the durable record lives
    pub persisted_location: PathBuf,
}

impl DashboardContext {
    /// Parsed `last_update_time`, if well-formed.
    pub fn updated_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.last_update_time)
    }

    /// True once more than `ttl_days` have passed since the last update.
    ///
    /// An unparsable timestamp counts as expired.
    pub fn is_expired(&self, ttl_days: u32, now: NaiveDateTime) -> bool {
        match self.updated_at() {
            Some(updated) => now - updated > Duration::days(i64::from(ttl_days)),
            None => true,
        }
    }

    /// True if the context was updated strictly after `instant`.
    ///
    /// An unparsable timestamp never counts as newer.
    pub fn is_newer_than(&self, instant: NaiveDateTime) -> bool {
        self.updated_at().is_some_and(|updated| updated > instant)
    }
}

/// Chart metadata as listed by a dashboard source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRef {
    pub title: String,
    #[serde(default)]
    pub chart_type: String,

    /// Free-text description, when the source has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A dashboard currently available on the source platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_on: Option<String>,
    #[serde(default)]
    pub charts: Vec<ChartRef>,
}

impl DashboardRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            published: true,
            changed_on: None,
            charts: Vec::new(),
        }
    }

    pub fn with_chart(mut self, title: impl Into<String>, chart_type: impl Into<String>) -> Self {
        self.charts.push(ChartRef {
            title: title.into(),
            chart_type: chart_type.into(),
            description: None,
        });
        self
    }
}

/// BI platforms hand out numeric ids; contexts key on strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// A context written during a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedContext {
    pub id: String,
    pub name: String,
    pub update_time: String,
}

/// A dashboard whose refresh failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUpdate {
    pub id: String,
    pub error: String,
}

/// Outcome of one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub total_dashboards: usize,
    pub expired_count: usize,
    pub removed_count: usize,
    pub updated: Vec<UpdatedContext>,
    pub failed: Vec<FailedUpdate>,

    /// Whether the vector index was rebuilt afterwards
    pub index_rebuilt: bool,
}

/// Which strategy produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    VectorSearch,
    RankingFallback,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VectorSearch => "vector_search",
            Self::RankingFallback => "ranking_fallback",
        }
    }
}

impl std::fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A context paired with its relevance score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredContext {
    pub context: DashboardContext,
    pub score: f32,
}

/// Result of a selection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// `None` when there were no contexts to choose from
    pub method: Option<SelectionMethod>,
    pub results: Vec<ScoredContext>,
}

impl Selection {
    pub fn empty() -> Self {
        Self {
            method: None,
            results: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Vector index statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: usize,
    pub provider: String,
    pub model: String,
    pub index_dir: PathBuf,
}

/// Health of the vector index as seen by the index manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub index_name: String,
    pub loaded: bool,
    pub stats: IndexStats,
    pub last_build_time: Option<String>,
    pub update_interval_hours: u64,
    pub should_rebuild: bool,
}

/// Snapshot of the whole system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub total_contexts: usize,
    pub fresh_contexts: usize,
    pub expired_contexts: usize,
    pub ttl_days: u32,
    pub context_dir: PathBuf,

    /// Strategy the next selection will try first
    pub active_method: SelectionMethod,

    /// Strategy that served the most recent selection
    pub last_method: Option<SelectionMethod>,

    pub index: IndexStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_at(timestamp: &str) -> DashboardContext {
        DashboardContext {
            dashboard_id: "7".to_string(),
            dashboard_name: "Revenue".to_string(),
            last_update_time: timestamp.to_string(),
            summary: String::new(),
            charts: Vec::new(),
            screenshot: None,
            persisted_location: PathBuf::from("7.md"),
        }
    }

    fn at(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    #[test]
    fn test_expiry_boundary() {
        let context = context_at("2024-03-01 12:00:00");
        assert!(!context.is_expired(7, at("2024-03-08 12:00:00")));
        assert!(context.is_expired(7, at("2024-03-08 12:00:01")));
    }

    #[test]
    fn test_unparsable_timestamp_is_expired() {
        let context = context_at("last tuesday");
        assert!(context.is_expired(7, at("2024-03-01 00:00:00")));
        assert!(!context.is_newer_than(at("2000-01-01 00:00:00")));
    }

    #[test]
    fn test_is_newer_than() {
        let context = context_at("2024-03-01 12:00:00");
        assert!(context.is_newer_than(at("2024-03-01 11:59:59")));
        assert!(!context.is_newer_than(at("2024-03-01 12:00:00")));
    }

    #[test]
    fn test_dashboard_ref_numeric_id() {
        let dashboard: DashboardRef =
            serde_json::from_str(r#"{"id": 42, "title": "Ops"}"#).unwrap();
        assert_eq!(dashboard.id, "42");
        assert!(dashboard.charts.is_empty());

        let dashboard: DashboardRef =
            serde_json::from_str(r#"{"id": "sales-eu", "title": "Sales"}"#).unwrap();
        assert_eq!(dashboard.id, "sales-eu");
    }

    #[test]
    fn test_selection_method_serializes_snake_case() {
        let json = serde_json::to_string(&SelectionMethod::RankingFallback).unwrap();
        assert_eq!(json, "\"ranking_fallback\"");
    }
}
