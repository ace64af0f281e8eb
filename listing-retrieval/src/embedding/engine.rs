//! Vector embedding engine
//!
//! Caching front for any [`EmbeddingProvider`].

use super::EmbeddingProvider;
use crate::error::{RetrievalError, Result};
use dashmap::DashMap;
use std::sync::Arc;

/// Vector embedding engine with caching
///
/// Wraps a provider with a DashMap cache for efficient repeated lookups,
/// and checks that every vector the provider returns has the advertised
/// dimension.
pub struct VectorEngine {
    provider: Arc<dyn EmbeddingProvider>,
    cache: DashMap<String, Vec<f32>>,
    dimension: usize,
}

impl VectorEngine {
    /// Create a VectorEngine around a provider
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dimension = provider.dimension();
        log::info!(
            "VectorEngine ready ({}d, model {})",
            dimension,
            provider.model_id()
        );

        Self {
            provider,
            cache: DashMap::new(),
            dimension,
        }
    }

    /// Create a VectorEngine backed by the local all-MiniLM-L6-v2 model
    #[cfg(feature = "fastembed")]
    pub fn local(cache_dir: Option<&std::path::Path>) -> Result<Self> {
        let cache_dir = match cache_dir {
            Some(dir) => dir.to_path_buf(),
            None => super::default_model_cache_dir(),
        };
        let provider = super::FastEmbedProvider::new(super::FastEmbedConfig {
            cache_dir,
            ..Default::default()
        })?;
        Ok(Self::new(Arc::new(provider)))
    }

    fn check(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RetrievalError::dimension_mismatch(self.dimension, vector.len()));
        }
        Ok(())
    }

    /// Get cache size
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl EmbeddingProvider for VectorEngine {
    /// Generate embedding with caching
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached.clone());
        }

        let embedding = self.provider.embed(text)?;
        self.check(&embedding)?;
        self.cache.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    /// Batch embed with caching
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| self.cache.get(*text).map(|v| v.clone()))
            .collect();

        let uncached: Vec<(usize, &str)> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(i, _)| (i, texts[i]))
            .collect();

        if uncached.is_empty() {
            return Ok(results.into_iter().flatten().collect());
        }

        let uncached_texts: Vec<&str> = uncached.iter().map(|(_, t)| *t).collect();
        let new_embeddings = self.provider.embed_batch(&uncached_texts)?;
        if new_embeddings.len() != uncached_texts.len() {
            return Err(RetrievalError::provider(format!(
                "provider returned {} embeddings for {} texts",
                new_embeddings.len(),
                uncached_texts.len()
            )));
        }

        for ((idx, text), emb) in uncached.iter().zip(new_embeddings) {
            self.check(&emb)?;
            self.cache.insert(text.to_string(), emb.clone());
            results[*idx] = Some(emb);
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        self.provider.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a text as [len, vowel count]
    struct CountingProvider {
        calls: AtomicUsize,
        dimension: usize,
    }

    impl CountingProvider {
        fn new(dimension: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                dimension,
            }
        }
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
            let mut v = vec![text.len() as f32, vowels as f32];
            v.resize(self.dimension, 0.0);
            Ok(v)
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_embed_is_cached() {
        let provider = Arc::new(CountingProvider::new(2));
        let engine = VectorEngine::new(provider.clone());

        let first = engine.embed("sunny loft").unwrap();
        let second = engine.embed("sunny loft").unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.cache_size(), 1);
    }

    #[test]
    fn test_embed_batch_only_embeds_uncached() {
        let provider = Arc::new(CountingProvider::new(2));
        let engine = VectorEngine::new(provider.clone());

        engine.embed("a").unwrap();
        let batch = engine.embed_batch(&["a", "bb", "ccc"]).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[2], vec![3.0, 0.0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        // advertises 2 dimensions but returns 3
        let provider = Arc::new(CountingProvider::new(3));
        let engine = VectorEngine::new(provider);

        assert!(matches!(
            engine.embed("oops"),
            Err(RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(engine.cache_size(), 0);
    }

    #[test]
    fn test_clear_cache() {
        let engine = VectorEngine::new(Arc::new(CountingProvider::new(2)));
        engine.embed("x").unwrap();
        engine.clear_cache();
        assert_eq!(engine.cache_size(), 0);
    }
}
