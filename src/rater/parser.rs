//! Parses the LLM's JSON rating response into an [`EffortRating`].

use serde::Deserialize;

use crate::models::{EffortLabel, EffortRating};
use crate::utils::extract_json_str;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJson,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("score out of range [1,10]: {0}")]
    ScoreOutOfRange(f64),
}

#[derive(Deserialize)]
struct RawRating {
    #[serde(rename = "effortScore")]
    effort_score: f64,
    complexity: f64,
    novelty: f64,
    #[serde(rename = "type")]
    label: String,
    confidence: f64,
    reasoning: String,
}

fn parse_label(raw: &str) -> EffortLabel {
    match raw.to_ascii_uppercase().as_str() {
        "FEATURE" => EffortLabel::Feature,
        "BUG_FIX" => EffortLabel::BugFix,
        "TEST" => EffortLabel::Test,
        "REFACTOR" => EffortLabel::Refactor,
        _ => EffortLabel::Trivial,
    }
}

pub fn parse_rating_response(response: &str) -> Result<EffortRating, ParseError> {
    let json_str = extract_json_str(response).ok_or(ParseError::NoJson)?;
    let raw: RawRating =
        serde_json::from_str(json_str).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    for score in [raw.effort_score, raw.complexity, raw.novelty] {
        if !(1.0..=10.0).contains(&score) {
            return Err(ParseError::ScoreOutOfRange(score));
        }
    }

    Ok(EffortRating {
        effort_score: raw.effort_score,
        complexity: raw.complexity,
        novelty: raw.novelty,
        label: parse_label(&raw.label),
        confidence: raw.confidence.clamp(0.0, 1.0),
        reasoning: raw.reasoning,
        is_error: false,
        error_message: None,
    })
}
