//! Filtered retrieval
//!
//! Structured constraints narrow the store to a candidate set, a transient
//! index is built over exactly those candidates' embeddings, and the query
//! is searched against it. Exact search over the candidates means a listing
//! outside the constraints can never appear, however close it is.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::RetrievalContext;
use crate::error::{RetrievalError, Result};
use crate::index::VectorIndex;
use crate::record::{Listing, ListingId, Query};
use crate::rerank::{rerank, Described};

/// A listing returned by a search, with its distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedListing {
    pub listing: Listing,
    pub distance: f32,
}

impl Described for RetrievedListing {
    fn description(&self) -> &str {
        &self.listing.description
    }
}

/// Wire form of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingHit {
    pub id: ListingId,
    pub name: String,
    pub description: String,
    pub listing_url: String,
    pub distance: f32,
}

impl From<&RetrievedListing> for ListingHit {
    fn from(r: &RetrievedListing) -> Self {
        Self {
            id: r.listing.id.clone(),
            name: r.listing.name.clone(),
            description: r.listing.description.clone(),
            listing_url: r.listing.listing_url.clone(),
            distance: r.distance,
        }
    }
}

/// Retriever over a shared [`RetrievalContext`]
#[derive(Debug, Clone)]
pub struct FilteredRetriever {
    context: Arc<RetrievalContext>,
}

impl FilteredRetriever {
    pub fn new(context: Arc<RetrievalContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<RetrievalContext> {
        &self.context
    }

    /// Up to `query.k` listings satisfying the constraints, nearest first
    ///
    /// An empty candidate set returns an empty result without calling the
    /// embedding provider. With preference terms the result is reranked by
    /// preference score before it is returned.
    pub fn retrieve(&self, query: &Query) -> Result<Vec<RetrievedListing>> {
        if query.k == 0 {
            return Err(RetrievalError::invalid_query("k must be at least 1"));
        }

        let store = self.context.store();
        let candidates = store.candidates(&query.constraints);
        log::debug!(
            "{} of {} listings satisfy the constraints",
            candidates.len(),
            store.len()
        );
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.context.embeddings();
        let mut scoped =
            VectorIndex::with_dimension(embeddings.dimension(), self.context.index().metric());
        for &position in &candidates {
            let (listing, row) = match (store.at(position), embeddings.row(position)) {
                (Some(listing), Some(row)) => (listing, row),
                _ => {
                    return Err(RetrievalError::artifact_mismatch(format!(
                        "no embedding row for listing at position {position}"
                    )))
                }
            };
            scoped.push_row(listing.id.clone(), row)?;
        }

        let query_vector = self.context.provider().embed(&query.text)?;
        let k = query.k.min(candidates.len());
        let hits = scoped.search(&query_vector, k)?;

        let results = hits
            .into_iter()
            .filter_map(|hit| {
                store.at(candidates[hit.position]).map(|listing| RetrievedListing {
                    listing: listing.clone(),
                    distance: hit.distance,
                })
            })
            .collect();

        if query.preferences.is_empty() {
            Ok(results)
        } else {
            Ok(rerank(results, &query.preferences))
        }
    }

    /// Up to `k` nearest listings over the whole global index, no filtering
    pub fn search_unfiltered(&self, text: &str, k: usize) -> Result<Vec<RetrievedListing>> {
        if k == 0 {
            return Err(RetrievalError::invalid_query("k must be at least 1"));
        }

        let query_vector = self.context.provider().embed(text)?;
        let hits = self.context.index().search(&query_vector, k)?;

        let store = self.context.store();
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                store.get(&hit.id).map(|listing| RetrievedListing {
                    listing: listing.clone(),
                    distance: hit.distance,
                })
            })
            .collect())
    }
}
