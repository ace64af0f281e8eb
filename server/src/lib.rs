//! Listing Server Library
//!
//! Serves filtered listing retrieval to tool-using clients and backs the
//! `listing-server` command line.

pub mod backend;
pub mod error;
pub mod mcp;

pub use backend::{ListingBackend, SearchRequest, SearchResponse, UserProfile};
pub use error::{ServerError, ServerResult};
