//! Embedding providers
//!
//! The retrieval core only depends on [`EmbeddingProvider`]. A caching
//! wrapper ([`VectorEngine`]) and a local all-MiniLM-L6-v2 provider
//! (feature `fastembed`) are shipped.

mod discovery;
mod engine;
#[cfg(feature = "fastembed")]
mod fastembed;

pub use discovery::{default_model_cache_dir, find_model_cache_dir, install_dir};
pub use engine::VectorEngine;
#[cfg(feature = "fastembed")]
pub use self::fastembed::{FastEmbedConfig, FastEmbedProvider};

use crate::error::Result;

/// Maps free text to fixed-dimension dense vectors
///
/// Both methods are pure from the caller's point of view. Failures are
/// reported as [`crate::RetrievalError::Provider`] and never retried here.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one vector per input in input order
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Identifier recorded in build manifests
    fn model_id(&self) -> &str {
        "custom"
    }
}
