//! Sentence embeddings for the FAQ matcher.

use std::path::Path;
use std::sync::Mutex;

use fastembed::{InitOptions, TextEmbedding};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedding failed: {0}")]
    Failed(String),

    #[error("Embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Maps text to a fixed-length vector. Same input, same output.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimensions(&self) -> usize;
}

/// fastembed-backed embedder. `TextEmbedding::embed` takes `&mut self`, hence the mutex.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    dimensions: usize,
}

impl FastEmbedder {
    /// Loads (downloading on first use) the named model into `cache_dir`.
    pub fn load(model_name: &str, cache_dir: &Path) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;

        std::fs::create_dir_all(cache_dir).map_err(|e| {
            EmbeddingError::ModelUnavailable(format!("create cache dir {}: {e}", cache_dir.display()))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);
        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::ModelUnavailable(e.to_string()))?;

        let dimensions = model
            .embed(vec!["probe"], None)
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("probe dimensions: {e}")))?
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbeddingError::ModelUnavailable("model returned no embedding".into()))?;

        info!(model = model_name, dimensions, "embedding model loaded");
        Ok(Self {
            model: Mutex::new(model),
            dimensions,
        })
    }
}

impl TextEmbedder for FastEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::Failed(format!("model lock poisoned: {e}")))?;
        let vector = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Failed("no embedding returned".into()))?;

        if vector.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.trim().to_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
        }
        "all-minilm-l6-v2-q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        other => Err(EmbeddingError::ModelUnavailable(format!(
            "unknown model {other}; supported: all-MiniLM-L6-v2, all-MiniLM-L6-v2-q, \
             bge-small-en-v1.5, bge-base-en-v1.5"
        ))),
    }
}
