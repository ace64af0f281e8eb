//! Listing Retrieval
//!
//! Retrieval engine for question answering over property listings:
//! embeds listing descriptions, persists them as an exact vector index,
//! and answers queries under structured constraints.
//!
//! ## Features
//!
//! - **Filtered retrieval** - Price, guest count and amenity constraints are
//!   applied before the similarity search, never after
//! - **Exact search** - Brute-force k-NN under squared Euclidean, cosine or
//!   inner product
//! - **Self-describing artifacts** - Versioned binary index and embedding
//!   files plus a JSON manifest fingerprinting the dataset
//! - **Preference reranking** - Lexical reordering by user preference terms
//! - **Local embeddings** - all-MiniLM-L6-v2 through fastembed (feature
//!   `fastembed`)
//!
//! ## Example
//!
//! ```ignore
//! use listing_retrieval::{
//!     ArtifactPaths, BatchEmbeddingBuilder, BuilderConfig, Constraints, FilteredRetriever,
//!     Query, RecordStore, RetrievalContext, VectorEngine,
//! };
//! use std::sync::Arc;
//!
//! let store = RecordStore::from_jsonl("listings.jsonl")?;
//! let provider = Arc::new(VectorEngine::local(None)?);
//! let paths = ArtifactPaths::in_dir("artifacts");
//!
//! BatchEmbeddingBuilder::new(provider.clone(), BuilderConfig::default())?
//!     .build(&store, &paths)?;
//!
//! let context = Arc::new(RetrievalContext::open(store, &paths, provider)?);
//! let results = FilteredRetriever::new(context).retrieve(
//!     &Query::new("quiet place near the beach").with_constraints(
//!         Constraints::new()
//!             .with_max_price(200.0)
//!             .with_guests(2)
//!             .with_amenity("Elevator"),
//!     ),
//! )?;
//! ```

pub mod artifacts;
pub mod builder;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod qa;
pub mod record;
pub mod rerank;
pub mod retriever;
pub mod store;

// Re-exports for convenience
pub use artifacts::{ArtifactPaths, BuildManifest};
pub use builder::{BatchEmbeddingBuilder, BuildOutcome, BuildReport, BuilderConfig, Freshness};
pub use config::RetrievalConfig;
pub use context::RetrievalContext;
pub use embedding::{EmbeddingProvider, VectorEngine};
pub use error::{Result, RetrievalError};
pub use evaluate::{evaluate, EvalCase, RetrievalMetrics};
pub use index::{EmbeddingMatrix, Metric, SearchHit, VectorIndex};
pub use qa::{
    compose_prompt, parse_qa, synthesize_qa, Answer, Generator, QaExamples, QaPair, RagAnswerer,
    SyntheticQa,
};
pub use record::{Constraints, Listing, ListingBuilder, ListingBuilderError, ListingId, Query};
pub use rerank::{rerank, Reranker};
pub use retriever::{FilteredRetriever, ListingHit, RetrievedListing};
pub use store::RecordStore;
