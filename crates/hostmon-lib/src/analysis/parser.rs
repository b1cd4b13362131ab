//! Model response parsing
//!
//! Turns free-form model text into a `HealthRecord`. The text may carry
//! JSON inside a markdown fence, bare JSON, or nothing usable at all; every
//! case ends in a fully populated record.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::{
    AnalysisOutcome, HealthRecord, Severity, MAX_HEALTH_SCORE, NEUTRAL_HEALTH_SCORE,
};

/// Prefix of the summary written when a response could not be decoded
pub const UNPARSEABLE_MARKER: &str = "Model response could not be parsed";

/// Summary used when a decoded response carries none
const DEFAULT_SUMMARY: &str = "No analysis summary provided";

/// Recommendation attached to records built from undecodable responses
const UNPARSEABLE_RECOMMENDATION: &str = "Unable to parse structured analysis";

/// Maximum characters of raw response quoted in a degraded summary
const MAX_EXCERPT_CHARS: usize = 500;

const FENCE: &str = "```";

/// Where the JSON candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate<'a> {
    Fenced(&'a str),
    Raw(&'a str),
}

impl<'a> Candidate<'a> {
    fn text(&self) -> &'a str {
        match self {
            Candidate::Fenced(text) | Candidate::Raw(text) => text,
        }
    }
}

/// A markdown code block
struct Fence<'a> {
    tag: &'a str,
    body: &'a str,
}

/// Parser for model responses
pub struct ResponseParser;

impl ResponseParser {
    /// Parse raw model text into a health record. Never fails.
    pub fn parse(raw_text: &str) -> HealthRecord {
        let candidate = extract_candidate(raw_text);

        match serde_json::from_str::<Value>(candidate.text()) {
            Ok(Value::Object(fields)) => {
                debug!(fenced = matches!(candidate, Candidate::Fenced(_)), "Decoded model response");
                record_from_fields(&fields)
            }
            Ok(other) => {
                warn!(kind = json_kind(&other), "Model response is JSON but not an object");
                degraded_record(raw_text)
            }
            Err(e) => {
                warn!(error = %e, "Failed to decode model response as JSON");
                debug!(raw = %excerpt(raw_text), "Undecodable model response");
                degraded_record(raw_text)
            }
        }
    }
}

/// Pick the text that should hold the JSON payload.
///
/// A fence tagged `json` wins over an untagged fence, which wins over the
/// whole trimmed input.
fn extract_candidate(raw_text: &str) -> Candidate<'_> {
    let blocks = fenced_blocks(raw_text);

    if let Some(block) = blocks.iter().find(|b| b.tag.eq_ignore_ascii_case("json")) {
        return Candidate::Fenced(block.body);
    }
    if let Some(block) = blocks.first() {
        return Candidate::Fenced(block.body);
    }
    Candidate::Raw(raw_text.trim())
}

/// Collect markdown code blocks in order of appearance.
///
/// An unterminated block runs to the end of the text.
fn fenced_blocks(text: &str) -> Vec<Fence<'_>> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let tag_len = after_open
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(after_open.len());
        let tag = &after_open[..tag_len];
        let inner = &after_open[tag_len..];

        match inner.find(FENCE) {
            Some(close) => {
                blocks.push(Fence {
                    tag,
                    body: inner[..close].trim(),
                });
                rest = &inner[close + FENCE.len()..];
            }
            None => {
                blocks.push(Fence {
                    tag,
                    body: inner.trim(),
                });
                break;
            }
        }
    }

    blocks
}

fn record_from_fields(fields: &Map<String, Value>) -> HealthRecord {
    let health_score = fields
        .get("health_score")
        .and_then(score_from_value)
        .unwrap_or(NEUTRAL_HEALTH_SCORE);

    let severity = fields
        .get("severity")
        .and_then(Value::as_str)
        .map(Severity::from_label)
        .unwrap_or(Severity::Unknown);

    let anomalies = match fields.get("anomalies") {
        Some(Value::Array(items)) => items.iter().filter_map(anomaly_from_value).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };

    let summary = fields
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string();

    let recommendations = match fields.get("recommendations") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    };

    HealthRecord {
        health_score,
        severity,
        anomalies,
        summary,
        recommendations,
        outcome: AnalysisOutcome::Parsed,
    }
}

/// Read a score from an integer, float or numeric string, clamped to 0..=100
fn score_from_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, MAX_HEALTH_SCORE as f64) as u8)
}

/// Flatten an anomaly entry to a single line
fn anomaly_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Object(entry) => {
            let kind = entry.get("type").and_then(Value::as_str);
            let description = entry.get("description").and_then(Value::as_str);
            match (kind, description) {
                (Some(kind), Some(description)) => Some(format!("{}: {}", kind, description)),
                (None, Some(description)) => Some(description.to_string()),
                (Some(kind), None) => Some(kind.to_string()),
                (None, None) => Some(value.to_string()),
            }
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn degraded_record(raw_text: &str) -> HealthRecord {
    let quoted = excerpt(raw_text);
    let summary = if quoted.is_empty() {
        format!("{}: empty response", UNPARSEABLE_MARKER)
    } else {
        format!("{}: {}", UNPARSEABLE_MARKER, quoted)
    };

    HealthRecord {
        health_score: NEUTRAL_HEALTH_SCORE,
        severity: Severity::Unknown,
        anomalies: Vec::new(),
        summary,
        recommendations: Some(UNPARSEABLE_RECOMMENDATION.to_string()),
        outcome: AnalysisOutcome::ParseDegraded,
    }
}

fn excerpt(raw_text: &str) -> String {
    raw_text.trim().chars().take(MAX_EXCERPT_CHARS).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
