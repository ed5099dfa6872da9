//! Built-in summarizer and summary cleanup.

use crate::collaborators::{Capture, DashboardSummary, Summarizer};
use crate::types::{ChartInfo, DashboardRef};
use async_trait::async_trait;
use dashlens_core::AppResult;
use once_cell::sync::Lazy;
use regex::Regex;

static STYLE_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bstyle\s*=\s*("[^"]*"|'[^']*')"#).expect("valid regex"));

static HTML_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:class|id|align|width|height|color)\s*=\s*("[^"]*"|'[^']*')"#)
        .expect("valid regex")
});

static CSS_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:color|margin(?:-\w+)?|padding(?:-\w+)?|font-size|font-weight|font-family|background(?:-color)?|border(?:-\w+)?|text-align|line-height|display|width|height|list-style-type)\s*:\s*[^;\n]*;",
    )
    .expect("valid regex")
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").expect("valid regex"));

static CSS_LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?(?:px|em|rem)\b").expect("valid regex"));

static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Strip HTML and inline CSS that models sometimes emit into summaries.
///
/// Line structure is kept; blank lines and runs of spaces collapse.
pub fn sanitize_summary(text: &str) -> String {
    let text = STYLE_ATTRIBUTE.replace_all(text, "");
    let text = CSS_PROPERTY.replace_all(&text, "");
    let text = HTML_TAG.replace_all(&text, "");
    let text = HTML_ATTRIBUTE.replace_all(&text, "");
    let text = HEX_COLOR.replace_all(&text, "");
    let text = CSS_LENGTH.replace_all(&text, "");

    text.lines()
        .map(|line| {
            let line = SPACES.replace_all(line.trim(), " ");
            line.trim_matches(|c: char| c == '"' || c == '\'' || c == '>' || c.is_whitespace())
                .replace(" .", ".")
                .replace(" ,", ",")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Describes a dashboard from its listing metadata alone.
///
/// Used when no screenshots or vision model are available.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataSummarizer;

impl MetadataSummarizer {
    pub fn basic_summary(dashboard: &DashboardRef) -> DashboardSummary {
        let title = if dashboard.title.trim().is_empty() {
            dashboard.id.as_str()
        } else {
            dashboard.title.trim()
        };

        let charts = dashboard
            .charts
            .iter()
            .enumerate()
            .map(|(i, chart)| {
                let chart_title = if chart.title.trim().is_empty() {
                    format!("Chart {}", i + 1)
                } else {
                    chart.title.trim().to_string()
                };
                let chart_type = if chart.chart_type.trim().is_empty() {
                    "unknown".to_string()
                } else {
                    chart.chart_type.trim().to_string()
                };
                let summary = chart
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} - {}", chart_title, chart_type));

                ChartInfo {
                    title: chart_title,
                    chart_type,
                    summary,
                    screenshot: None,
                }
            })
            .collect();

        DashboardSummary {
            summary: format!(
                "{} is a data dashboard containing {} charts.",
                title,
                dashboard.charts.len()
            ),
            charts,
        }
    }
}

#[async_trait]
impl Summarizer for MetadataSummarizer {
    async fn summarize(
        &self,
        dashboard: &DashboardRef,
        capture: Option<&Capture>,
    ) -> AppResult<DashboardSummary> {
        let mut summary = Self::basic_summary(dashboard);

        if let Some(capture) = capture {
            for chart in &mut summary.charts {
                chart.screenshot = capture.chart_screenshots.get(&chart.title).cloned();
            }
        }

        tracing::debug!(dashboard_id = %dashboard.id, "Built metadata summary");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChartRef;
    use std::path::PathBuf;

    #[test]
    fn test_sanitize_strips_markup() {
        let raw = r#"<h2 style="color: #2c3e50; margin: 20px 0 10px 0;">Sales Overview</h2>
<p class="lead">Revenue grew <b>12%</b> in EMEA .</p>

color: #333; font-size: 14px;
Top region: EMEA"#;

        assert_eq!(
            sanitize_summary(raw),
            "Sales Overview\nRevenue grew 12% in EMEA.\nTop region: EMEA"
        );
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        let text = "Orders by week\nCancellations: 3 < 5 > 1";
        assert_eq!(sanitize_summary(text), text);
    }

    #[tokio::test]
    async fn test_metadata_summary() {
        let mut dashboard = DashboardRef::new("7", "Revenue")
            .with_chart("By Region", "bar")
            .with_chart("", "");
        dashboard.charts.push(ChartRef {
            title: "Churn".to_string(),
            chart_type: "line".to_string(),
            description: Some("Monthly churn rate".to_string()),
        });

        let summary = MetadataSummarizer.summarize(&dashboard, None).await.unwrap();
        assert_eq!(
            summary.summary,
            "Revenue is a data dashboard containing 3 charts."
        );
        assert_eq!(summary.charts[0].summary, "By Region - bar");
        assert_eq!(summary.charts[1].title, "Chart 2");
        assert_eq!(summary.charts[1].chart_type, "unknown");
        assert_eq!(summary.charts[2].summary, "Monthly churn rate");
    }

    #[tokio::test]
    async fn test_metadata_summary_attaches_chart_screenshots() {
        let dashboard = DashboardRef::new("7", "Revenue").with_chart("By Region", "bar");
        let mut capture = Capture::default();
        capture
            .chart_screenshots
            .insert("By Region".to_string(), PathBuf::from("shots/by_region.png"));

        let summary = MetadataSummarizer
            .summarize(&dashboard, Some(&capture))
            .await
            .unwrap();
        assert_eq!(
            summary.charts[0].screenshot,
            Some(PathBuf::from("shots/by_region.png"))
        );
    }
}
