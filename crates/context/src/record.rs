//! Markdown representation of a dashboard context.
//!
//! ```text
//! # Sales Overview
//!
//! - **Dashboard ID**: 12
//! - **Dashboard Name**: Sales Overview
//! - **Last Updated**: 2024-03-01 12:00:00
//!
//! ## Summary
//!
//! Weekly revenue by region...
//!
//! ## Charts
//!
//! ### Chart 1: Revenue by Region
//!
//! - **Type**: bar
//!
//! Shows revenue split across regions...
//! ```
//!
//! Body lines that start with `#`, `- **` or `\` are escaped with a leading
//! `\` so free text can never be mistaken for a heading or a field.

use crate::types::{ChartInfo, DashboardContext};
use dashlens_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

const FIELD_ID: &str = "Dashboard ID";
const FIELD_NAME: &str = "Dashboard Name";
const FIELD_UPDATED: &str = "Last Updated";
const FIELD_SCREENSHOT: &str = "Screenshot";
const FIELD_TYPE: &str = "Type";

const HEADING_SUMMARY: &str = "## Summary";
const HEADING_CHARTS: &str = "## Charts";
const CHART_PREFIX: &str = "### Chart ";

/// Render a context as a Markdown record.
pub fn render(context: &DashboardContext) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", single_line(&context.dashboard_name)));
    push_field(&mut out, FIELD_ID, &context.dashboard_id);
    push_field(&mut out, FIELD_NAME, &context.dashboard_name);
    push_field(&mut out, FIELD_UPDATED, &context.last_update_time);
    if let Some(ref screenshot) = context.screenshot {
        push_field(&mut out, FIELD_SCREENSHOT, &screenshot.to_string_lossy());
    }

    out.push('\n');
    out.push_str(HEADING_SUMMARY);
    out.push_str("\n\n");
    push_body(&mut out, &context.summary);

    if !context.charts.is_empty() {
        out.push_str(HEADING_CHARTS);
        out.push_str("\n\n");

        for (i, chart) in context.charts.iter().enumerate() {
            out.push_str(&format!(
                "{}{}: {}\n\n",
                CHART_PREFIX,
                i + 1,
                single_line(&chart.title)
            ));
            push_field(&mut out, FIELD_TYPE, &chart.chart_type);
            if let Some(ref screenshot) = chart.screenshot {
                push_field(&mut out, FIELD_SCREENSHOT, &screenshot.to_string_lossy());
            }
            out.push('\n');
            push_body(&mut out, &chart.summary);
        }
    }

    out
}

fn push_field(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("- **{}**: {}\n", name, single_line(value)));
}

fn push_body(out: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    for line in text.lines() {
        if line.starts_with('#') || line.starts_with('\\') || line.starts_with("- **") {
            out.push('\\');
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Header,
    Summary,
    Charts,
}

#[derive(Default)]
struct ChartDraft {
    title: String,
    chart_type: String,
    screenshot: Option<PathBuf>,
    body: Vec<String>,
    in_body: bool,
}

impl ChartDraft {
    fn finish(self) -> ChartInfo {
        ChartInfo {
            title: self.title,
            chart_type: self.chart_type,
            summary: join_body(&self.body),
            screenshot: self.screenshot,
        }
    }
}

/// Parse a Markdown record stored at `location`.
///
/// Fails when the record lacks a dashboard id or a last-updated timestamp.
pub fn parse(content: &str, location: &Path) -> AppResult<DashboardContext> {
    let mut section = Section::Header;
    let mut title: Option<String> = None;
    let mut id: Option<String> = None;
    let mut name: Option<String> = None;
    let mut updated: Option<String> = None;
    let mut screenshot: Option<PathBuf> = None;
    let mut summary: Vec<String> = Vec::new();
    let mut charts: Vec<ChartInfo> = Vec::new();
    let mut chart: Option<ChartDraft> = None;

    for line in content.lines() {
        if line == HEADING_SUMMARY {
            section = Section::Summary;
            continue;
        }
        if line == HEADING_CHARTS {
            section = Section::Charts;
            continue;
        }

        match section {
            Section::Header => {
                if let Some(heading) = line.strip_prefix("# ") {
                    title.get_or_insert_with(|| heading.trim().to_string());
                } else if let Some((field, value)) = parse_field(line) {
                    match field {
                        FIELD_ID => id = Some(value),
                        FIELD_NAME => name = Some(value),
                        FIELD_UPDATED => updated = Some(value),
                        FIELD_SCREENSHOT => screenshot = Some(PathBuf::from(value)),
                        _ => {}
                    }
                }
            }
            Section::Summary => summary.push(unescape(line)),
            Section::Charts => {
                if let Some(rest) = line.strip_prefix(CHART_PREFIX) {
                    if let Some(done) = chart.take() {
                        charts.push(done.finish());
                    }
                    let chart_title = rest
                        .split_once(": ")
                        .map(|(_, t)| t)
                        .unwrap_or(rest)
                        .trim();
                    chart = Some(ChartDraft {
                        title: chart_title.to_string(),
                        ..ChartDraft::default()
                    });
                    continue;
                }

                let Some(draft) = chart.as_mut() else {
                    continue;
                };

                if !draft.in_body {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some((field, value)) = parse_field(line) {
                        match field {
                            FIELD_TYPE => draft.chart_type = value,
                            FIELD_SCREENSHOT => draft.screenshot = Some(PathBuf::from(value)),
                            _ => {}
                        }
                        continue;
                    }
                    draft.in_body = true;
                }
                draft.body.push(unescape(line));
            }
        }
    }

    if let Some(done) = chart.take() {
        charts.push(done.finish());
    }

    let dashboard_id = id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Store(format!("Record {:?} has no {}", location, FIELD_ID)))?;
    let last_update_time = updated.filter(|v| !v.is_empty()).ok_or_else(|| {
        AppError::Store(format!("Record {:?} has no {}", location, FIELD_UPDATED))
    })?;
    let dashboard_name = name
        .or(title)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| dashboard_id.clone());

    Ok(DashboardContext {
        dashboard_id,
        dashboard_name,
        last_update_time,
        summary: join_body(&summary),
        charts,
        screenshot,
        persisted_location: location.to_path_buf(),
    })
}

/// `- **Name**: value` → `(Name, value)`
fn parse_field(line: &str) -> Option<(&str, String)> {
    let rest = line.trim_start().strip_prefix("- **")?;
    let (field, value) = rest.split_once("**:")?;
    Some((field, value.trim().to_string()))
}

fn unescape(line: &str) -> String {
    line.strip_prefix('\\').unwrap_or(line).to_string()
}

fn join_body(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}
