//! Nearest-question retrieval over the knowledge base.
//!
//! Every stored question is embedded once when the matcher is built. A query
//! is normalised the same way, embedded, and scored against each question by
//! cosine similarity; the best score wins if it clears the threshold.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::chat::{
    embedder::{EmbeddingError, TextEmbedder},
    knowledge::{KnowledgeEntry, KnowledgeStore},
};

/// Lowercases, strips everything but ASCII letters, digits and whitespace, and
/// collapses runs of whitespace.
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cosine similarity. A zero-norm operand scores 0.0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// One vector per knowledge-base id, all of the embedder's dimension.
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    vectors: HashMap<u64, Vec<f32>>,
    dimensions: usize,
}

impl EmbeddingIndex {
    pub fn build(
        entries: &[KnowledgeEntry],
        embedder: &dyn TextEmbedder,
    ) -> Result<Self, EmbeddingError> {
        let dimensions = embedder.dimensions();
        let mut vectors = HashMap::with_capacity(entries.len());
        for entry in entries {
            // Stored questions get the same normalisation as queries, so scores
            // differ slightly from embedding the raw question text.
            let vector = embedder.embed(&normalize(&entry.question))?;
            if vector.len() != dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimensions,
                    got: vector.len(),
                });
            }
            vectors.insert(entry.id, vector);
        }
        Ok(Self {
            vectors,
            dimensions,
        })
    }

    pub fn get(&self, id: u64) -> Option<&[f32]> {
        self.vectors.get(&id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome<'a> {
    /// Present only when `matched`.
    pub entry: Option<&'a KnowledgeEntry>,
    /// Best similarity seen, whether or not it cleared the threshold.
    pub score: f32,
    pub matched: bool,
}

impl MatchOutcome<'_> {
    fn unmatched(score: f32) -> Self {
        Self {
            entry: None,
            score,
            matched: false,
        }
    }
}

pub struct FaqMatcher {
    store: Arc<KnowledgeStore>,
    index: EmbeddingIndex,
    embedder: Arc<dyn TextEmbedder>,
    threshold: f32,
}

impl FaqMatcher {
    pub fn build(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn TextEmbedder>,
        threshold: f32,
    ) -> Result<Self, EmbeddingError> {
        let index = EmbeddingIndex::build(store.all(), embedder.as_ref())?;
        info!(
            questions = index.len(),
            dimensions = index.dimensions(),
            threshold,
            "faq matcher ready"
        );
        Ok(Self {
            store,
            index,
            embedder,
            threshold,
        })
    }

    pub fn find_best_match(&self, query: &str) -> Result<MatchOutcome<'_>, EmbeddingError> {
        if self.store.is_empty() {
            return Ok(MatchOutcome::unmatched(0.0));
        }
        let cleaned = normalize(query);
        if cleaned.is_empty() {
            return Ok(MatchOutcome::unmatched(0.0));
        }

        let query_vec = self.embedder.embed(&cleaned)?;
        if query_vec.len() != self.index.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.index.dimensions(),
                got: query_vec.len(),
            });
        }

        let mut best: Option<&KnowledgeEntry> = None;
        let mut best_score = 0.0_f32;
        for entry in self.store.all() {
            let Some(stored) = self.index.get(entry.id) else {
                continue;
            };
            let score = cosine(&query_vec, stored);
            // strict: ties keep the earlier entry
            if score > best_score {
                best_score = score;
                best = Some(entry);
            }
        }

        debug!(query = %cleaned, score = best_score, id = best.map(|e| e.id), "faq scored");
        if best.is_some() && best_score >= self.threshold {
            Ok(MatchOutcome {
                entry: best,
                score: best_score,
                matched: true,
            })
        } else {
            Ok(MatchOutcome::unmatched(best_score))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{kb_entry, VocabEmbedder};

    fn matcher(entries: Vec<KnowledgeEntry>) -> FaqMatcher {
        FaqMatcher::build(
            Arc::new(KnowledgeStore::from_entries(entries)),
            Arc::new(VocabEmbedder::default()),
            0.5,
        )
        .expect("build matcher")
    }

    fn brain_kb() -> Vec<KnowledgeEntry> {
        vec![
            kb_entry(1, "What is a brain tumor?", Some("general")),
            kb_entry(2, "What are the common symptoms of a brain tumor?", Some("symptoms")),
            kb_entry(3, "What is a glioma?", Some("tumor_types")),
        ]
    }

    #[test]
    fn normalize_strips_punctuation_and_spacing() {
        assert_eq!(normalize("  What's   a Brain-Tumor?? "), "whats a braintumor");
        assert_eq!(normalize("¿Qué?"), "qu");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn identical_question_scores_one() {
        let m = matcher(brain_kb());
        let out = m.find_best_match("What is a glioma?").unwrap();
        assert!(out.matched);
        assert_eq!(out.entry.unwrap().id, 3);
        assert!((out.score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn paraphrase_matches_and_unrelated_does_not() {
        let m = matcher(brain_kb());

        let out = m.find_best_match("what's a brain tumor").unwrap();
        assert!(out.matched);
        assert_eq!(out.entry.unwrap().id, 1);
        assert!(out.score >= 0.5);

        let out = m.find_best_match("what is the weather today").unwrap();
        assert!(!out.matched);
        assert!(out.entry.is_none());
        assert!(out.score < 0.5);
        assert!(out.score > 0.0);
    }

    #[test]
    fn empty_knowledge_base_is_unmatched_without_embedding() {
        let embedder = Arc::new(VocabEmbedder::default());
        let m = FaqMatcher::build(Arc::new(KnowledgeStore::default()), embedder.clone(), 0.5)
            .unwrap();
        let out = m.find_best_match("what is a brain tumor").unwrap();
        assert!(!out.matched);
        assert_eq!(out.score, 0.0);
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn ties_go_to_first_entry() {
        let m = matcher(vec![
            kb_entry(10, "What is a glioma?", Some("a")),
            kb_entry(20, "what is a glioma", Some("b")),
        ]);
        let out = m.find_best_match("what is a glioma").unwrap();
        assert_eq!(out.entry.unwrap().id, 10);
    }

    #[test]
    fn punctuation_only_query_is_unmatched() {
        let m = matcher(brain_kb());
        let out = m.find_best_match("???").unwrap();
        assert!(!out.matched);
        assert_eq!(out.score, 0.0);
    }

    #[test]
    fn index_holds_one_vector_per_entry() {
        let embedder = VocabEmbedder::default();
        let index = EmbeddingIndex::build(&brain_kb(), &embedder).unwrap();
        assert_eq!(index.len(), 3);
        assert!(brain_kb()
            .iter()
            .all(|e| index.get(e.id).map(<[f32]>::len) == Some(index.dimensions())));
    }

    #[test]
    fn embedding_failure_is_an_error() {
        let embedder = Arc::new(VocabEmbedder::default());
        let m = FaqMatcher::build(
            Arc::new(KnowledgeStore::from_entries(brain_kb())),
            embedder.clone(),
            0.5,
        )
        .unwrap();
        embedder.fail_next();
        assert!(m.find_best_match("what is a glioma").is_err());
    }
}
