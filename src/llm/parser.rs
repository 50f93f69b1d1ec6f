//! Turns free-form model output into trade decisions
//!
//! Reasoning models wrap their answer in `<think>` blocks, markdown fences or
//! surrounding prose, and do not always respect the requested field types.
//! Parsing is lenient per element: a malformed field falls back to its
//! default instead of discarding the whole answer. Array elements that are
//! not objects are dropped, and an array holding no objects at all is not an
//! answer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{TradeAction, TradeDecision};

const ERROR_SNIPPET_CHARS: usize = 200;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("Invalid think-block regex"));

#[derive(Debug, Clone, Error, PartialEq)]
#[error("failed to parse AI response as JSON: {snippet}")]
pub struct ParseError {
    /// Leading part of the cleaned response
    pub snippet: String,
}

/// Remove every `<think>...</think>` block and surrounding whitespace
pub fn strip_think_blocks(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

fn clean(text: &str) -> String {
    let stripped = strip_think_blocks(text);
    let s = stripped.strip_prefix("```json").unwrap_or(&stripped);
    let s = s.strip_prefix("```").unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

/// Parse a model response into an ordered list of decisions
///
/// Tried in order: the whole text as an array, as a single object, the span
/// from the first `[` to the last `]`, the span from the first `{` to the
/// last `}`.
pub fn parse_decisions(text: &str) -> Result<Vec<TradeDecision>, ParseError> {
    let cleaned = clean(text);
    if cleaned.is_empty() || cleaned == "[]" {
        return Ok(Vec::new());
    }

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        match value {
            Value::Array(ref items) => {
                if let Some(decisions) = decisions_from_array(items) {
                    return Ok(decisions);
                }
            }
            Value::Object(ref obj) => return Ok(vec![decision_from_object(obj)]),
            _ => {}
        }
    }

    if let Some(span) = span_between(&cleaned, '[', ']') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(span) {
            if let Some(decisions) = decisions_from_array(&items) {
                return Ok(decisions);
            }
        }
    }

    if let Some(span) = span_between(&cleaned, '{', '}') {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(span) {
            return Ok(vec![decision_from_object(&obj)]);
        }
    }

    Err(ParseError {
        snippet: cleaned.chars().take(ERROR_SNIPPET_CHARS).collect(),
    })
}

fn span_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// `None` when a non-empty array has no object elements
fn decisions_from_array(items: &[Value]) -> Option<Vec<TradeDecision>> {
    let decisions: Vec<TradeDecision> = items
        .iter()
        .filter_map(Value::as_object)
        .map(decision_from_object)
        .collect();

    if decisions.is_empty() && !items.is_empty() {
        None
    } else {
        Some(decisions)
    }
}

fn decision_from_object(obj: &Map<String, Value>) -> TradeDecision {
    TradeDecision {
        action: obj
            .get("action")
            .and_then(Value::as_str)
            .map(|s| TradeAction::from(s.to_string()))
            .unwrap_or_default(),
        ticker: string_field(obj, "ticker").trim().to_string(),
        stop_loss: number_field(obj, "stop_loss"),
        take_profit: number_field(obj, "take_profit"),
        confidence: number_field(obj, "confidence")
            .map(|c| c.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0),
        reasoning: string_field(obj, "reasoning"),
        current_price: number_field(obj, "current_price"),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Numbers and numeric strings; anything else counts as absent
fn number_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}
