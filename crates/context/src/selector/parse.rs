//! Lenient parsing of ranking responses.
//!
//! Models wrap JSON in code fences, prepend prose, or trail explanations.
//! Each strategy below gets a turn; the first that yields a selection list wins.

use crate::types::NEUTRAL_SCORE;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex"));

static OUTER_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// One dashboard picked by the ranking model.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSelection {
    /// Position in the candidate list
    pub index: usize,
    pub score: f32,
    pub reason: Option<String>,
}

type Attempt = fn(&str) -> Option<Value>;

const ATTEMPTS: &[(&str, Attempt)] = &[
    ("direct", parse_direct),
    ("fenced", parse_fenced),
    ("first_brace", parse_from_first_brace),
    ("outer_object", parse_outer_object),
];

/// Extract the selection list from a raw model response.
///
/// Returns `None` when no strategy finds a usable JSON payload.
pub fn parse_selections(raw: &str) -> Option<Vec<RankedSelection>> {
    for (name, attempt) in ATTEMPTS {
        if let Some(selections) = attempt(raw).as_ref().and_then(selections_from_value) {
            tracing::debug!(strategy = *name, count = selections.len(), "Parsed ranking response");
            return Some(selections);
        }
    }
    None
}

fn parse_direct(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

fn parse_fenced(raw: &str) -> Option<Value> {
    let body = FENCED_BLOCK.captures(raw)?.get(1)?.as_str();
    serde_json::from_str(body.trim()).ok()
}

/// First complete JSON value starting at the first `{`; trailing text is ignored.
fn parse_from_first_brace(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn parse_outer_object(raw: &str) -> Option<Value> {
    let matched = OUTER_OBJECT.find(raw)?;
    serde_json::from_str(matched.as_str()).ok()
}

fn selections_from_value(value: &Value) -> Option<Vec<RankedSelection>> {
    let items = match value {
        Value::Object(map) => map.get("selections")?.as_array()?,
        Value::Array(items) => items,
        _ => return None,
    };

    Some(items.iter().filter_map(selection_from_item).collect())
}

fn selection_from_item(item: &Value) -> Option<RankedSelection> {
    let index = match item.get("index")? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };

    let score = item
        .get("relevance_score")
        .or_else(|| item.get("score"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .map(|s| s as f32)
        .unwrap_or(NEUTRAL_SCORE);

    let reason = item
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(RankedSelection {
        index: usize::try_from(index).ok()?,
        score,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexes(raw: &str) -> Vec<usize> {
        parse_selections(raw)
            .unwrap()
            .into_iter()
            .map(|s| s.index)
            .collect()
    }

    #[test]
    fn test_direct() {
        let raw = r#"{"selections":[{"index":2,"relevance_score":0.9,"reason":"sales"},{"index":0,"relevance_score":0.4}]}"#;
        let parsed = parse_selections(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].index, 2);
        assert_eq!(parsed[0].reason.as_deref(), Some("sales"));
        assert!((parsed[1].score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_fenced() {
        let raw = "Here you go:\n```json\n{\"selections\":[{\"index\":1,\"relevance_score\":0.7}]}\n```\nHope that helps";
        assert_eq!(indexes(raw), vec![1]);
    }

    #[test]
    fn test_prose_then_json_then_prose() {
        let raw = r#"Sure! {"selections":[{"index":3,"relevance_score":0.8}]} Let me know {if} you need more."#;
        assert_eq!(indexes(raw), vec![3]);
    }

    #[test]
    fn test_bare_array_and_loose_fields() {
        let raw = r#"[{"index":"1","score":"0.6"},{"index":4.0},{"index":-1},{"reason":"no index"}]"#;
        let parsed = parse_selections(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].index, 1);
        assert!((parsed[0].score - 0.6).abs() < 1e-6);
        assert_eq!(parsed[1].index, 4);
        assert_eq!(parsed[1].score, NEUTRAL_SCORE);
    }

    #[test]
    fn test_unparsable() {
        assert!(parse_selections("I could not decide.").is_none());
        assert!(parse_selections(r#"{"answer": "dashboard 2"}"#).is_none());
        assert!(parse_selections("{ broken json").is_none());
    }
}
