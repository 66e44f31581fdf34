//! Sends chunks to the LLM and turns the response into an [`EffortRating`]
//! plus [`TokenUsage`](crate::models::TokenUsage).

pub mod parser;
pub mod prompt;

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError};
use crate::models::{EffortRating, TokenUsage};

const CONFIDENCE_WARNING_THRESHOLD: f64 = 0.7;

pub struct EffortRater {
    client: Option<Arc<dyn LlmClient>>,
    model: String,
}

impl EffortRater {
    /// An enabled rater backed by a real client.
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            model: model.into(),
        }
    }

    /// A globally-disabled rater: never calls the model.
    pub fn disabled(model: impl Into<String>) -> Self {
        Self {
            client: None,
            model: model.into(),
        }
    }

    /// Ratings for distinct chunks are independent; callers may invoke this
    /// from multiple threads concurrently — the rater holds no mutable state.
    pub fn rate(&self, chunk: &crate::models::Chunk) -> (EffortRating, TokenUsage) {
        let Some(client) = &self.client else {
            return (EffortRating::disabled(), TokenUsage::unavailable(&self.model));
        };

        let prompt_text = prompt::build_prompt(chunk);
        match client.complete(&prompt_text) {
            Ok(completion) => {
                let usage = match (
                    completion.prompt_tokens,
                    completion.completion_tokens,
                    completion.total_tokens,
                ) {
                    (Some(p), Some(c), Some(t)) => TokenUsage {
                        model: self.model.clone(),
                        prompt_tokens: p,
                        completion_tokens: c,
                        total_tokens: t,
                        usage_available: true,
                    },
                    _ => TokenUsage::unavailable(&self.model),
                };

                match parser::parse_rating_response(&completion.text) {
                    Ok(rating) => {
                        if rating.confidence < CONFIDENCE_WARNING_THRESHOLD {
                            log::warn!(
                                "low-confidence rating ({:.2}) for chunk {} #{}",
                                rating.confidence,
                                chunk.sha,
                                chunk.chunk_index
                            );
                        }
                        (rating, usage)
                    }
                    Err(err) => {
                        log::warn!("failed to parse rating for chunk {}: {}", chunk.sha, err);
                        (
                            EffortRating::trivial("Truncated AI response"),
                            TokenUsage::unavailable(&self.model),
                        )
                    }
                }
            }
            Err(LlmError::Timeout(secs)) => {
                log::warn!("LLM call timed out after {}s for chunk {}", secs, chunk.sha);
                (
                    EffortRating::error(format!("LLM timeout after {}s", secs)),
                    TokenUsage::unavailable(&self.model),
                )
            }
            Err(err) => {
                log::warn!("LLM call failed for chunk {}: {}", chunk.sha, err);
                (EffortRating::error(err.to_string()), TokenUsage::unavailable(&self.model))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::{FailingLlmClient, FixedLlmClient};
    use crate::models::FileChange;
    use chrono::Utc;

    fn sample_chunk() -> crate::models::Chunk {
        crate::models::Chunk {
            sha: "a".into(),
            chunk_index: 0,
            total_chunks: 1,
            author_id: Some(1),
            author_email: "x@y.com".into(),
            message: "add feature".into(),
            timestamp: Utc::now(),
            files: vec![FileChange {
                path: "a.rs".into(),
                added_lines: 40,
                deleted_lines: 2,
                diff_text: "+fn x() {}".into(),
            }],
            diff_text: "+fn x() {}".into(),
            lines_added: 40,
            lines_deleted: 2,
            is_bundled: false,
            bundled_shas: vec![],
        }
    }

    #[test]
    fn disabled_rater_never_calls_model() {
        let rater = EffortRater::disabled("gpt-4o-mini");
        let (rating, usage) = rater.rate(&sample_chunk());
        assert_eq!(rating.confidence, 0.0);
        assert!(!usage.usage_available);
    }

    #[test]
    fn parse_failure_yields_trivial_rating() {
        let client = Arc::new(FixedLlmClient::new("not json"));
        let rater = EffortRater::new(client, "gpt-4o-mini");
        let (rating, _) = rater.rate(&sample_chunk());
        assert!(!rating.is_error);
        assert_eq!(rating.reasoning, "Truncated AI response");
    }

    #[test]
    fn transport_failure_yields_error_rating() {
        let client = Arc::new(FailingLlmClient);
        let rater = EffortRater::new(client, "gpt-4o-mini");
        let (rating, _) = rater.rate(&sample_chunk());
        assert!(rating.is_error);
        assert!(rating.error_message.is_some());
    }

    #[test]
    fn valid_response_is_parsed() {
        let response = r#"{"effortScore":8,"complexity":7,"novelty":6,"type":"FEATURE","confidence":0.9,"reasoning":"new endpoint"}"#;
        let client = Arc::new(FixedLlmClient::new(response));
        let rater = EffortRater::new(client, "gpt-4o-mini");
        let (rating, usage) = rater.rate(&sample_chunk());
        assert_eq!(rating.effort_score, 8.0);
        assert!(usage.usage_available);
    }
}
