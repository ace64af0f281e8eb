//! Offline batch embedding builder
//!
//! Embeds every listing description in batches, accumulates the embedding
//! matrix and the global index, and writes the artifacts once all batches
//! have succeeded. A failed run writes nothing.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::artifacts::{ArtifactPaths, BuildManifest, MANIFEST_VERSION};
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, Result};
use crate::index::{EmbeddingMatrix, Metric, VectorIndex};
use crate::store::RecordStore;

/// Descriptions embedded per provider call
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// When existing artifacts are reused instead of rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Reuse only if the manifest matches the dataset, dimension, metric and model
    #[default]
    Fingerprint,
    /// Reuse whenever the index and embedding files exist
    Presence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    /// Descriptions per batch (>= 1)
    pub batch_size: usize,
    /// Metric of the built index
    pub metric: Metric,
    pub freshness: Freshness,
    /// Rebuild even when the artifacts are fresh
    pub force: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            metric: Metric::default(),
            freshness: Freshness::default(),
            force: false,
        }
    }
}

/// Summary of a completed build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub batches: usize,
    pub manifest: BuildManifest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// Existing artifacts were kept
    Skipped { reason: String },
    Built(BuildReport),
}

impl BuildOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, BuildOutcome::Skipped { .. })
    }
}

/// Builds the persisted artifacts for a record store
pub struct BatchEmbeddingBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    config: BuilderConfig,
}

impl BatchEmbeddingBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: BuilderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(RetrievalError::invalid_query("batch size must be at least 1"));
        }
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build the artifacts into `paths`, unless fresh ones already exist
    pub fn build(&self, store: &RecordStore, paths: &ArtifactPaths) -> Result<BuildOutcome> {
        if !self.config.force {
            if let Some(reason) = self.reusable(store, paths) {
                log::info!("Skipping build: {}", reason);
                return Ok(BuildOutcome::Skipped { reason });
            }
        }

        let (embeddings, index, batches) = self.embed_store(store)?;

        // Manifest last: its presence marks a complete build
        embeddings.save(&paths.embeddings)?;
        index.save(&paths.index)?;
        let manifest = BuildManifest {
            format_version: MANIFEST_VERSION,
            model_id: self.provider.model_id().to_string(),
            dimension: index.dimension(),
            records: store.len(),
            fingerprint: store.fingerprint(),
            metric: index.metric(),
            built_at: Utc::now(),
        };
        manifest.save(&paths.manifest)?;

        log::info!(
            "Built {} embeddings ({}d) in {} batches",
            manifest.records,
            manifest.dimension,
            batches
        );
        Ok(BuildOutcome::Built(BuildReport { batches, manifest }))
    }

    /// Embed every listing in memory, returning the matrix and index
    pub fn embed_all(&self, store: &RecordStore) -> Result<(EmbeddingMatrix, VectorIndex)> {
        let (embeddings, index, _) = self.embed_store(store)?;
        Ok((embeddings, index))
    }

    fn embed_store(&self, store: &RecordStore) -> Result<(EmbeddingMatrix, VectorIndex, usize)> {
        let dimension = self.provider.dimension();
        let mut embeddings = EmbeddingMatrix::with_dimension(dimension);
        let mut index = VectorIndex::with_dimension(dimension, self.config.metric);

        let listings = store.get_all();
        let total = listings.len().div_ceil(self.config.batch_size);

        for (i, batch) in listings.chunks(self.config.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|l| l.embedding_text()).collect();
            let vectors = self.provider.embed_batch(&texts)?;
            if vectors.len() != texts.len() {
                return Err(RetrievalError::provider(format!(
                    "provider returned {} embeddings for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }

            embeddings.push_batch(&vectors)?;
            index.add_batch(batch.iter().map(|l| l.id.clone()).zip(vectors))?;
            log::info!("Processed batch {} of {}", i + 1, total);
        }

        Ok((embeddings, index, total))
    }

    /// Why the existing artifacts can be reused, if they can
    fn reusable(&self, store: &RecordStore, paths: &ArtifactPaths) -> Option<String> {
        match self.config.freshness {
            Freshness::Presence => paths
                .binaries_exist()
                .then(|| "index and embedding files exist".to_string()),
            Freshness::Fingerprint => {
                if !paths.all_exist() {
                    return None;
                }
                let manifest = match BuildManifest::load(&paths.manifest) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        log::warn!("Unreadable manifest, rebuilding: {}", e);
                        return None;
                    }
                };
                if manifest.dimension != self.provider.dimension() {
                    log::info!(
                        "Artifacts are {}d, provider is {}d; rebuilding",
                        manifest.dimension,
                        self.provider.dimension()
                    );
                    return None;
                }
                if manifest.metric != self.config.metric {
                    log::info!(
                        "Artifacts use {}, configured {}; rebuilding",
                        manifest.metric,
                        self.config.metric
                    );
                    return None;
                }
                match manifest.staleness(
                    &store.fingerprint(),
                    store.len(),
                    self.provider.model_id(),
                ) {
                    Some(reason) => {
                        log::info!("Artifacts are stale ({}); rebuilding", reason);
                        None
                    }
                    None => Some(format!(
                        "artifacts are fresh (built {})",
                        manifest.built_at
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RetrievalContext;
    use crate::record::Listing;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a text as [len, word count], counting batches
    struct LengthProvider {
        batches: AtomicUsize,
        fail: bool,
    }

    impl LengthProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                batches: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    impl EmbeddingProvider for LengthProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![
                text.len() as f32,
                text.split_whitespace().count() as f32,
            ])
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let n = self.batches.fetch_add(1, Ordering::SeqCst);
            if self.fail && n > 0 {
                return Err(RetrievalError::provider("model crashed"));
            }
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "length"
        }
    }

    fn store(descriptions: &[&str]) -> RecordStore {
        RecordStore::new(
            descriptions
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    Listing::builder()
                        .id(format!("l{i}"))
                        .description(*d)
                        .price(50.0)
                        .capacity(2)
                        .build()
                        .unwrap()
                })
                .collect(),
        )
        .unwrap()
    }

    fn builder(provider: Arc<LengthProvider>, batch_size: usize) -> BatchEmbeddingBuilder {
        BatchEmbeddingBuilder::new(
            provider,
            BuilderConfig {
                batch_size,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = BatchEmbeddingBuilder::new(
            LengthProvider::new(),
            BuilderConfig {
                batch_size: 0,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(RetrievalError::InvalidQuery(_))));
    }

    #[test]
    fn test_build_writes_artifacts_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let provider = LengthProvider::new();
        let store = store(&["a", "bb", "ccc", "dddd", "eeeee"]);

        let outcome = builder(provider.clone(), 2).build(&store, &paths).unwrap();
        let report = match outcome {
            BuildOutcome::Built(report) => report,
            other => panic!("expected a build, got {other:?}"),
        };
        assert_eq!(report.batches, 3);
        assert_eq!(provider.batches.load(Ordering::SeqCst), 3);
        assert_eq!(report.manifest.records, 5);
        assert!(paths.all_exist());

        let embeddings = EmbeddingMatrix::load(&paths.embeddings).unwrap();
        assert_eq!(embeddings.rows(), 5);
        assert_eq!(embeddings.row(3), Some(&[4.0, 1.0][..]));

        let context = RetrievalContext::open(store, &paths, provider).unwrap();
        assert_eq!(context.index().len(), 5);
        assert_eq!(context.manifest().map(|m| m.model_id.as_str()), Some("length"));
    }

    #[test]
    fn test_fresh_artifacts_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let store = store(&["a", "bb"]);

        assert!(!builder(LengthProvider::new(), 500)
            .build(&store, &paths)
            .unwrap()
            .is_skipped());

        let provider = LengthProvider::new();
        let outcome = builder(provider.clone(), 500).build(&store, &paths).unwrap();
        assert!(outcome.is_skipped());
        assert_eq!(provider.batches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_changed_dataset_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        builder(LengthProvider::new(), 500)
            .build(&store(&["a", "bb"]), &paths)
            .unwrap();

        let changed = store(&["a", "changed"]);
        let outcome = builder(LengthProvider::new(), 500)
            .build(&changed, &paths)
            .unwrap();
        assert!(!outcome.is_skipped());
        assert!(RetrievalContext::open(changed, &paths, LengthProvider::new()).is_ok());
    }

    #[test]
    fn test_presence_policy_skips_stale_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        builder(LengthProvider::new(), 500)
            .build(&store(&["a", "bb"]), &paths)
            .unwrap();

        let presence = BatchEmbeddingBuilder::new(
            LengthProvider::new(),
            BuilderConfig {
                freshness: Freshness::Presence,
                ..Default::default()
            },
        )
        .unwrap();
        let changed = store(&["a", "changed"]);
        assert!(presence.build(&changed, &paths).unwrap().is_skipped());

        assert!(matches!(
            RetrievalContext::open(changed, &paths, LengthProvider::new()),
            Err(RetrievalError::StaleArtifacts(_))
        ));
    }

    #[test]
    fn test_force_rebuilds_fresh_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let store = store(&["a"]);
        builder(LengthProvider::new(), 500).build(&store, &paths).unwrap();

        let forced = BatchEmbeddingBuilder::new(
            LengthProvider::new(),
            BuilderConfig {
                force: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!forced.build(&store, &paths).unwrap().is_skipped());
    }

    #[test]
    fn test_changed_metric_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let store = store(&["a", "bb"]);
        builder(LengthProvider::new(), 500).build(&store, &paths).unwrap();

        let cosine = BatchEmbeddingBuilder::new(
            LengthProvider::new(),
            BuilderConfig {
                metric: Metric::Cosine,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!cosine.build(&store, &paths).unwrap().is_skipped());

        let context = RetrievalContext::open(store, &paths, LengthProvider::new()).unwrap();
        assert_eq!(context.index().metric(), Metric::Cosine);
        assert_eq!(context.manifest().map(|m| m.metric), Some(Metric::Cosine));
    }

    #[test]
    fn test_provider_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());

        let result = builder(LengthProvider::failing(), 1).build(&store(&["a", "bb"]), &paths);
        assert!(matches!(result, Err(RetrievalError::Provider(_))));
        assert!(!paths.index.exists());
        assert!(!paths.embeddings.exists());
        assert!(!paths.manifest.exists());
    }

    #[test]
    fn test_embed_all_in_memory() {
        let store = store(&["one two", "three"]);
        let (embeddings, index) = builder(LengthProvider::new(), 500).embed_all(&store).unwrap();
        assert_eq!(embeddings.row(0), Some(&[7.0, 2.0][..]));
        assert_eq!(index.ids()[1].as_str(), "l1");
    }
}
