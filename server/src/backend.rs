//! Retrieval backend shared by the CLI and the tool server
//!
//! Wraps the loaded [`RetrievalContext`] and the session's user profile.
//! Retrieval is CPU-bound and may block on the embedding model, so it runs
//! on tokio's blocking pool.

use listing_retrieval::{
    Constraints, EmbeddingProvider, FilteredRetriever, ListingHit, Metric, Query, RetrievalConfig,
    RetrievalContext,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ServerError, ServerResult};

/// A listing search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub num_guests: Option<u32>,
    #[serde(default)]
    pub accessibility_amenities: Option<Vec<String>>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub preferences: Vec<String>,
}

/// Ordered search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ListingHit>,
    pub total: usize,
}

/// Details collected from the user, used as default search constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub num_guests: Option<u32>,
    #[serde(default)]
    pub accessibility_amenities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub records: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

/// Backend over a loaded retrieval context
pub struct ListingBackend {
    retriever: FilteredRetriever,
    profile: RwLock<Option<UserProfile>>,
    default_k: usize,
    base_constraints: Constraints,
}

impl ListingBackend {
    pub fn new(context: Arc<RetrievalContext>) -> Self {
        Self::with_config(context, &RetrievalConfig::default())
    }

    pub fn with_config(context: Arc<RetrievalContext>, config: &RetrievalConfig) -> Self {
        Self {
            retriever: FilteredRetriever::new(context),
            profile: RwLock::new(None),
            default_k: config.default_k,
            base_constraints: config.base_constraints(),
        }
    }

    /// Build the retrieval query for a request
    ///
    /// Constraint fields missing from the request fall back to the
    /// collected user profile, then to no constraint.
    pub fn query_for(&self, request: &SearchRequest) -> ServerResult<Query> {
        if request.query.trim().is_empty() {
            return Err(ServerError::InvalidParams("'query' must not be empty".to_string()));
        }

        let profile = self.profile.read().clone().unwrap_or_default();
        let mut constraints = self.base_constraints.clone();

        if let Some(max_price) = request.max_price.or(profile.max_price) {
            constraints = constraints.with_max_price(max_price);
        }
        if let Some(num_guests) = request.num_guests.or(profile.num_guests) {
            constraints = constraints.with_guests(num_guests);
        }
        let amenities = request
            .accessibility_amenities
            .clone()
            .unwrap_or(profile.accessibility_amenities);
        constraints = constraints.with_amenities(amenities);

        Ok(Query::new(request.query.clone())
            .with_k(request.k.unwrap_or(self.default_k))
            .with_constraints(constraints)
            .with_preferences(request.preferences.iter().cloned()))
    }

    /// Run a search on the blocking pool
    pub async fn search(&self, request: SearchRequest) -> ServerResult<SearchResponse> {
        let query = self.query_for(&request)?;
        let retriever = self.retriever.clone();

        let results = tokio::task::spawn_blocking(move || retriever.retrieve(&query)).await??;
        tracing::debug!("Search {:?} returned {} listings", request.query, results.len());

        let results: Vec<ListingHit> = results.iter().map(ListingHit::from).collect();
        Ok(SearchResponse {
            total: results.len(),
            results,
        })
    }

    /// Store the session's user profile, replacing any previous one
    pub fn collect_user_info(&self, profile: UserProfile) -> UserProfile {
        tracing::info!(
            "Collected user profile (max_price: {:?}, guests: {:?}, {} amenities)",
            profile.max_price,
            profile.num_guests,
            profile.accessibility_amenities.len()
        );
        *self.profile.write() = Some(profile.clone());
        profile
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.read().clone()
    }

    pub fn stats(&self) -> IndexStats {
        let context = self.retriever.context();
        IndexStats {
            records: context.store().len(),
            dimension: context.dimension(),
            metric: context.index().metric(),
            model_id: context.provider().model_id().to_string(),
            built_at: context.manifest().map(|m| m.built_at.to_rfc3339()),
        }
    }
}
