//! Local sentence embeddings through fastembed
//!
//! all-MiniLM-L6-v2 (384 dimensions), run on ONNX Runtime. Model files are
//! downloaded into the cache directory on first use.

use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::PathBuf;

use super::EmbeddingProvider;
use crate::error::{RetrievalError, Result};

const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// fastembed configuration
#[derive(Debug, Clone)]
pub struct FastEmbedConfig {
    /// Where model files are cached
    pub cache_dir: PathBuf,
    /// Batch size handed to the ONNX session (default: 256)
    pub batch_size: usize,
    /// Show download progress on first use (default: false)
    pub show_download_progress: bool,
}

impl Default for FastEmbedConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("models"),
            batch_size: 256,
            show_download_progress: false,
        }
    }
}

/// all-MiniLM-L6-v2 embedding provider
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    config: FastEmbedConfig,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Load the model, downloading it into the cache directory if needed
    pub fn new(config: FastEmbedConfig) -> Result<Self> {
        log::info!(
            "Loading {} (cache: {})",
            MODEL_ID,
            config.cache_dir.display()
        );

        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_cache_dir(config.cache_dir.clone())
                .with_show_download_progress(config.show_download_progress),
        )
        .map_err(|e| RetrievalError::provider(format!("Failed to load {MODEL_ID}: {e}")))?;

        // Get dimension by encoding test string
        let test_embed = model
            .embed(vec!["test"], None)
            .map_err(|e| RetrievalError::provider(format!("Failed to encode test string: {e}")))?;
        let dimension = test_embed.first().map(Vec::len).unwrap_or_default();

        log::info!("Loaded {} ({}d)", MODEL_ID, dimension);

        Ok(Self {
            model: Mutex::new(model),
            config,
            dimension,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &FastEmbedConfig {
        &self.config
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self
            .model
            .lock()
            .embed(vec![text], None)
            .map_err(|e| RetrievalError::provider(format!("Failed to encode text: {e}")))?;

        embeddings
            .pop()
            .ok_or_else(|| RetrievalError::provider("model returned no embedding"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        self.model
            .lock()
            .embed(texts.to_vec(), Some(self.config.batch_size))
            .map_err(|e| RetrievalError::provider(format!("Failed to encode texts: {e}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}
