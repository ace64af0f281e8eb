//! Loaded retrieval state
//!
//! A [`RetrievalContext`] bundles the record store, the embedding matrix,
//! the global index and the embedding provider. It is constructed once,
//! validated, and then shared read-only behind an `Arc`.

use std::path::Path;
use std::sync::Arc;

use crate::artifacts::{ArtifactPaths, BuildManifest};
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, Result};
use crate::index::{EmbeddingMatrix, VectorIndex};
use crate::store::RecordStore;

/// Immutable retrieval state
pub struct RetrievalContext {
    store: RecordStore,
    embeddings: EmbeddingMatrix,
    index: VectorIndex,
    provider: Arc<dyn EmbeddingProvider>,
    manifest: Option<BuildManifest>,
}

impl std::fmt::Debug for RetrievalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalContext")
            .field("records", &self.store.len())
            .field("dimension", &self.index.dimension())
            .field("metric", &self.index.metric())
            .field("model_id", &self.provider.model_id())
            .finish()
    }
}

impl RetrievalContext {
    /// Assemble a context from in-memory parts
    ///
    /// Rejects parts that disagree on record count or dimension, and a
    /// global index whose ids are not the store ids in store order.
    pub fn new(
        store: RecordStore,
        embeddings: EmbeddingMatrix,
        index: VectorIndex,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let dimension = provider.dimension();
        if embeddings.dimension() != dimension {
            return Err(RetrievalError::dimension_mismatch(
                dimension,
                embeddings.dimension(),
            ));
        }
        if index.dimension() != dimension {
            return Err(RetrievalError::dimension_mismatch(dimension, index.dimension()));
        }

        if embeddings.rows() != store.len() {
            return Err(RetrievalError::artifact_mismatch(format!(
                "embedding matrix has {} rows, store has {} listings",
                embeddings.rows(),
                store.len()
            )));
        }
        if index.len() != store.len() {
            return Err(RetrievalError::artifact_mismatch(format!(
                "index has {} vectors, store has {} listings",
                index.len(),
                store.len()
            )));
        }
        if let Some((pos, id)) = index
            .ids()
            .iter()
            .enumerate()
            .find(|(pos, id)| store.at(*pos).map(|l| &l.id) != Some(*id))
        {
            return Err(RetrievalError::artifact_mismatch(format!(
                "index id {} at position {} does not match the store",
                id, pos
            )));
        }

        Ok(Self {
            store,
            embeddings,
            index,
            provider,
            manifest: None,
        })
    }

    /// Load persisted artifacts for `store`
    ///
    /// Fails with `IndexNotFound` when an artifact is missing and with
    /// `StaleArtifacts` when the manifest was written for another dataset
    /// or model.
    pub fn open(
        store: RecordStore,
        paths: &ArtifactPaths,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let manifest = BuildManifest::load(&paths.manifest)?;
        if let Some(reason) =
            manifest.staleness(&store.fingerprint(), store.len(), provider.model_id())
        {
            return Err(RetrievalError::stale_artifacts(format!(
                "{}: {}",
                paths.manifest.display(),
                reason
            )));
        }

        let embeddings = EmbeddingMatrix::load(&paths.embeddings)?;
        let index = VectorIndex::load_with_dimension(&paths.index, provider.dimension())?;

        log::info!(
            "Loaded {} vectors ({}d, {}) built {}",
            index.len(),
            index.dimension(),
            index.metric(),
            manifest.built_at
        );

        let mut context = Self::new(store, embeddings, index, provider)?;
        context.manifest = Some(manifest);
        Ok(context)
    }

    /// Load artifacts from the standard layout inside `dir`
    pub fn open_dir(
        store: RecordStore,
        dir: impl AsRef<Path>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        Self::open(store, &ArtifactPaths::in_dir(dir), provider)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Manifest of the artifacts, when loaded from disk
    pub fn manifest(&self) -> Option<&BuildManifest> {
        self.manifest.as_ref()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::index::Metric;
    use crate::record::Listing;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text by looking it up in a fixed table, counting calls
    pub struct TableProvider {
        pub table: Vec<(String, Vec<f32>)>,
        pub calls: AtomicUsize,
        pub dimension: usize,
    }

    impl TableProvider {
        pub fn new(dimension: usize, table: &[(&str, &[f32])]) -> Self {
            Self {
                table: table
                    .iter()
                    .map(|(t, v)| (t.to_string(), v.to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
                dimension,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EmbeddingProvider for TableProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.table
                .iter()
                .find(|(t, _)| t == text)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| RetrievalError::provider(format!("no embedding for {text:?}")))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            "table"
        }
    }

    /// Listings A, B and C with 2-d embeddings; B sits closest to the
    /// "quiet place" query vector.
    pub fn abc() -> (RecordStore, Arc<TableProvider>) {
        let listing = |id: &str, desc: &str, price: f64, capacity: u32, amenities: &[&str]| {
            Listing::builder()
                .id(id)
                .name(format!("Listing {id}"))
                .description(desc)
                .listing_url(format!("https://example.com/{id}"))
                .price(price)
                .capacity(capacity)
                .amenities(amenities.iter().copied())
                .build()
                .unwrap()
        };

        let store = RecordStore::new(vec![
            listing("A", "cosy studio near the park", 100.0, 2, &["Elevator"]),
            listing("B", "quiet loft downtown", 300.0, 4, &[]),
            listing(
                "C",
                "quiet flat with a garden",
                150.0,
                2,
                &["Elevator", "Wheelchair accessible"],
            ),
        ])
        .unwrap();

        let provider = Arc::new(TableProvider::new(
            2,
            &[
                ("cosy studio near the park", &[0.0, 1.0]),
                ("quiet loft downtown", &[1.0, 0.0]),
                ("quiet flat with a garden", &[0.8, 0.4]),
                ("quiet place", &[1.0, 0.0]),
            ],
        ));
        (store, provider)
    }

    pub fn context_from(store: RecordStore, provider: Arc<TableProvider>) -> RetrievalContext {
        let rows: Vec<Vec<f32>> = store
            .get_all()
            .iter()
            .map(|l| provider.embed(l.embedding_text()).unwrap())
            .collect();
        let index = VectorIndex::build(
            Metric::SquaredEuclidean,
            store.get_all().iter().map(|l| l.id.clone()).zip(rows.clone()),
        )
        .unwrap();
        let embeddings = EmbeddingMatrix::from_rows(provider.dimension, rows).unwrap();
        provider.calls.store(0, Ordering::SeqCst);
        RetrievalContext::new(store, embeddings, index, provider).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::index::Metric;
    use crate::record::ListingId;

    #[test]
    fn test_new_validates_row_count() {
        let (store, provider) = abc();
        let embeddings = EmbeddingMatrix::from_rows(2, vec![vec![0.0, 0.0]]).unwrap();
        let index = VectorIndex::build(
            Metric::default(),
            store.get_all().iter().map(|l| (l.id.clone(), vec![0.0, 0.0])),
        )
        .unwrap();

        assert!(matches!(
            RetrievalContext::new(store, embeddings, index, provider),
            Err(RetrievalError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn test_new_validates_dimension() {
        let (store, provider) = abc();
        let embeddings = EmbeddingMatrix::from_rows(3, vec![vec![0.0; 3]; 3]).unwrap();
        let index = VectorIndex::with_dimension(2, Metric::default());

        assert!(matches!(
            RetrievalContext::new(store, embeddings, index, provider),
            Err(RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_new_rejects_reordered_index() {
        let (store, provider) = abc();
        let embeddings = EmbeddingMatrix::from_rows(2, vec![vec![0.0, 0.0]; 3]).unwrap();
        let index = VectorIndex::build(
            Metric::default(),
            ["C", "B", "A"]
                .iter()
                .map(|id| (ListingId::from(*id), vec![0.0, 0.0])),
        )
        .unwrap();

        assert!(matches!(
            RetrievalContext::new(store, embeddings, index, provider),
            Err(RetrievalError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn test_open_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (store, provider) = abc();
        assert!(matches!(
            RetrievalContext::open_dir(store, dir.path(), provider),
            Err(RetrievalError::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_context_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RetrievalContext>();
    }
}
