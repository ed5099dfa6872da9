//! LLM ranking fallback for dashboard selection.
//!
//! Used when vector search has nothing to offer. The model sees a bounded
//! description of every candidate and returns indexes with scores; anything
//! it gets wrong (bad indexes, too few picks, unparsable output, timeouts)
//! degrades toward a first-K neutral answer instead of an error.

pub mod parse;
pub mod prompt;

pub use parse::{parse_selections, RankedSelection};
pub use prompt::RankingPrompt;

use crate::types::{DashboardContext, ScoredContext, NEUTRAL_SCORE};
use dashlens_core::{AppError, AppResult, ProviderSettings};
use dashlens_llm::{LlmClient, LlmRequest};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Request and retry parameters for ranking calls.
#[derive(Debug, Clone)]
pub struct SelectorSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl From<&ProviderSettings> for SelectorSettings {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
            max_attempts: settings.max_attempts,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Picks the most relevant dashboards for a question with one LLM call.
pub struct RelevanceSelector {
    client: Arc<dyn LlmClient>,
    settings: SelectorSettings,
    prompt: RankingPrompt,
}

impl std::fmt::Debug for RelevanceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelevanceSelector")
            .field("provider", &self.client.provider_name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl RelevanceSelector {
    pub fn new(client: Arc<dyn LlmClient>, settings: SelectorSettings) -> AppResult<Self> {
        Ok(Self {
            client,
            settings,
            prompt: RankingPrompt::new()?,
        })
    }

    /// Up to `k` of `contexts` ranked for `question`, best first.
    ///
    /// Returns exactly `min(k, contexts.len())` distinct contexts with scores
    /// in [0, 1]. Never fails: when every attempt fails the first `k`
    /// candidates come back with the neutral score.
    pub async fn select(
        &self,
        question: &str,
        contexts: &[DashboardContext],
        k: usize,
    ) -> Vec<ScoredContext> {
        let want = k.min(contexts.len());
        if want == 0 {
            return Vec::new();
        }

        let request = match self.request(question, contexts, want) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Could not build ranking request");
                return first_k(contexts, want);
            }
        };

        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.attempt(&request).await {
                Ok(selections) => {
                    let results = assemble(contexts, selections, want);
                    for (rank, scored) in results.iter().enumerate() {
                        tracing::info!(
                            rank = rank + 1,
                            dashboard_id = %scored.context.dashboard_id,
                            name = %scored.context.dashboard_name,
                            score = scored.score,
                            "Selected dashboard"
                        );
                    }
                    return results;
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts, error = %e, "Ranking attempt failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }

        tracing::warn!(count = want, "Ranking failed, using the first dashboards");
        first_k(contexts, want)
    }

    fn request(
        &self,
        question: &str,
        contexts: &[DashboardContext],
        count: usize,
    ) -> AppResult<LlmRequest> {
        let user = self.prompt.render(question, contexts, count)?;
        Ok(LlmRequest::new(user, &self.settings.model)
            .with_system(prompt::SYSTEM_PROMPT)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
            .with_json_output())
    }

    async fn attempt(&self, request: &LlmRequest) -> AppResult<Vec<RankedSelection>> {
        let response = tokio::time::timeout(self.settings.timeout, self.client.complete(request))
            .await
            .map_err(|_| AppError::timeout("ranking request", self.settings.timeout.as_secs()))??;

        if response.content.trim().is_empty() {
            return Err(AppError::Selection("Ranking response was empty".to_string()));
        }

        tracing::debug!(response = %response.content, "Ranking response");
        if response.truncated {
            tracing::warn!(
                max_tokens = self.settings.max_tokens,
                "Ranking response hit the token limit"
            );
        }

        parse_selections(&response.content).ok_or_else(|| {
            AppError::Selection("Ranking response contained no selections".to_string())
        })
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Turn model picks into exactly `want` distinct results.
///
/// Bad and repeated indexes are dropped. Shortfalls are filled from the
/// unpicked candidates in order, scored no higher than the neutral score or
/// the weakest pick.
fn assemble(
    contexts: &[DashboardContext],
    selections: Vec<RankedSelection>,
    want: usize,
) -> Vec<ScoredContext> {
    let mut seen = HashSet::new();
    let mut picked: Vec<(usize, f32)> = selections
        .into_iter()
        .filter(|s| s.index < contexts.len() && seen.insert(s.index))
        .map(|s| {
            if let Some(reason) = &s.reason {
                tracing::debug!(index = s.index, reason = %reason, "Ranking reason");
            }
            (s.index, clamp_score(s.score))
        })
        .collect();

    picked.sort_by(|a, b| b.1.total_cmp(&a.1));
    picked.truncate(want);

    if picked.len() < want {
        let floor = picked
            .iter()
            .map(|(_, score)| *score)
            .fold(NEUTRAL_SCORE, f32::min);
        let taken: HashSet<usize> = picked.iter().map(|(index, _)| *index).collect();
        let missing = want - picked.len();

        tracing::debug!(missing, "Padding ranking result with unselected dashboards");
        picked.extend(
            (0..contexts.len())
                .filter(|index| !taken.contains(index))
                .take(missing)
                .map(|index| (index, floor)),
        );
    }

    picked
        .into_iter()
        .map(|(index, score)| ScoredContext {
            context: contexts[index].clone(),
            score,
        })
        .collect()
}

fn first_k(contexts: &[DashboardContext], k: usize) -> Vec<ScoredContext> {
    contexts
        .iter()
        .take(k)
        .map(|context| ScoredContext {
            context: context.clone(),
            score: NEUTRAL_SCORE,
        })
        .collect()
}
