use serde::Serialize;

use crate::chat::{embedder::EmbeddingError, matcher::FaqMatcher};

const DEFAULT_CATEGORY: &str = "general";
const UNKNOWN_CATEGORY: &str = "unknown";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    pub answer: String,
    /// Similarity as a percentage, two decimals.
    pub confidence: f64,
    pub category: String,
    pub matched: bool,
}

/// Turns matcher outcomes into user-facing replies.
pub struct Assistant {
    matcher: FaqMatcher,
    fallback_answer: String,
}

impl Assistant {
    pub fn new(matcher: FaqMatcher, fallback_answer: impl Into<String>) -> Self {
        Self {
            matcher,
            fallback_answer: fallback_answer.into(),
        }
    }

    pub fn get_response(&self, query: &str) -> Result<ChatReply, EmbeddingError> {
        let outcome = self.matcher.find_best_match(query)?;
        let confidence = to_percent(outcome.score);

        let reply = match outcome.entry.filter(|_| outcome.matched) {
            Some(entry) => ChatReply {
                answer: entry.answer.clone(),
                confidence,
                category: entry
                    .category
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                matched: true,
            },
            None => ChatReply {
                answer: self.fallback_answer.clone(),
                confidence,
                category: UNKNOWN_CATEGORY.to_string(),
                matched: false,
            },
        };
        Ok(reply)
    }
}

fn to_percent(score: f32) -> f64 {
    (f64::from(score) * 100.0 * 100.0).round() / 100.0
}
