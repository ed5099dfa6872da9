//! Ranking prompt rendering.

use crate::types::DashboardContext;
use dashlens_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde::Serialize;

const TEMPLATE_NAME: &str = "ranking";

/// Longest dashboard description sent to the model, in characters.
const MAX_DESCRIPTION_CHARS: usize = 800;

/// Longest chart summary sent to the model, in characters.
const MAX_CHART_SUMMARY_CHARS: usize = 200;

const MAX_CHARTS_PER_DASHBOARD: usize = 5;

pub const SYSTEM_PROMPT: &str = "You are a data analyst who picks the dashboards best suited \
to answer a user's question. Reply with JSON only.";

const USER_TEMPLATE: &str = r#"User question: {{question}}

Available dashboards:
{{#each dashboards}}
[{{index}}] {{name}} (id: {{id}})
Description: {{description}}
Charts: {{chart_count}}
Last updated: {{updated}}
{{#each charts}}
- {{title}} ({{chart_type}}): {{summary}}
{{/each}}
---
{{/each}}

Select the {{count}} dashboards most relevant to the question. Consider:
1. Whether the dashboard holds the data and metrics the question asks about
2. How well its business area matches the question
3. Whether its data can answer the question completely
4. Whether its update frequency and time range fit

Return exactly {{count}} selections as JSON, using the bracketed index of each dashboard:
{"selections": [{"index": 0, "relevance_score": 0.95, "reason": "why it fits"}]}

relevance_score must be a number between 0 and 1. Return the JSON object and nothing else."#;

#[derive(Debug, Serialize)]
struct PromptChart {
    title: String,
    chart_type: String,
    summary: String,
}

#[derive(Debug, Serialize)]
struct PromptDashboard {
    index: usize,
    id: String,
    name: String,
    description: String,
    chart_count: usize,
    updated: String,
    charts: Vec<PromptChart>,
}

#[derive(Debug, Serialize)]
struct PromptData<'a> {
    question: &'a str,
    count: usize,
    dashboards: Vec<PromptDashboard>,
}

/// Renders the user message for a ranking request.
#[derive(Debug)]
pub struct RankingPrompt {
    registry: Handlebars<'static>,
}

impl RankingPrompt {
    pub fn new() -> AppResult<Self> {
        let mut registry = Handlebars::new();

        // Plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string(TEMPLATE_NAME, USER_TEMPLATE)
            .map_err(|e| {
                AppError::Selection(format!("Failed to register ranking template: {}", e))
            })?;

        Ok(Self { registry })
    }

    /// Render the prompt asking for `count` of `contexts`, indexed by position.
    pub fn render(
        &self,
        question: &str,
        contexts: &[DashboardContext],
        count: usize,
    ) -> AppResult<String> {
        let data = PromptData {
            question,
            count,
            dashboards: contexts
                .iter()
                .enumerate()
                .map(|(index, context)| PromptDashboard {
                    index,
                    id: context.dashboard_id.clone(),
                    name: context.dashboard_name.clone(),
                    description: truncate_chars(&context.summary, MAX_DESCRIPTION_CHARS),
                    chart_count: context.charts.len(),
                    updated: context.last_update_time.clone(),
                    charts: context
                        .charts
                        .iter()
                        .take(MAX_CHARTS_PER_DASHBOARD)
                        .map(|chart| PromptChart {
                            title: chart.title.clone(),
                            chart_type: chart.chart_type.clone(),
                            summary: truncate_chars(&chart.summary, MAX_CHART_SUMMARY_CHARS),
                        })
                        .collect(),
                })
                .collect(),
        };

        self.registry
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| AppError::Selection(format!("Failed to render ranking prompt: {}", e)))
    }
}

/// Cut `text` to at most `max` characters, marking the cut with "...".
fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
