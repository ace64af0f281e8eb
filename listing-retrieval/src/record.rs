//! Listing records, constraints and queries
//!
//! Core types for representing property listings and the structured
//! constraints a query applies to them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default number of results returned by a query
pub const DEFAULT_K: usize = 5;

/// Unique identifier for listings
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl ListingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ListingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ListingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for ListingId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// A property listing
///
/// Deserialization goes through the dataset field names (`_id`,
/// `accommodates`) and the same validation as [`ListingBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawListing")]
pub struct Listing {
    /// Unique identifier
    pub id: ListingId,
    /// Display name
    pub name: String,
    /// Free-text description, the text that gets embedded
    pub description: String,
    /// Link to the listing page
    pub listing_url: String,
    /// Nightly price (>= 0)
    pub price: f64,
    /// Number of guests the listing accommodates (>= 1)
    pub capacity: u32,
    /// Amenity names, exact strings as published
    pub amenities: BTreeSet<String>,
}

impl Listing {
    /// Create a new builder for Listing
    pub fn builder() -> ListingBuilder {
        ListingBuilder::new()
    }

    /// Text handed to the embedding provider
    pub fn embedding_text(&self) -> &str {
        &self.description
    }

    /// Check whether the listing carries an amenity
    pub fn has_amenity(&self, amenity: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            self.amenities.contains(amenity)
        } else {
            let wanted = amenity.to_lowercase();
            self.amenities.iter().any(|a| a.to_lowercase() == wanted)
        }
    }
}

/// Identifier as found in the dataset: either a string or an integer
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

/// Listing as it appears in the dataset, before validation
#[derive(Debug, Deserialize)]
struct RawListing {
    #[serde(rename = "_id", alias = "id")]
    id: RawId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    listing_url: Option<String>,
    price: f64,
    #[serde(alias = "accommodates")]
    capacity: u32,
    #[serde(default)]
    amenities: Vec<String>,
}

impl TryFrom<RawListing> for Listing {
    type Error = ListingBuilderError;

    fn try_from(raw: RawListing) -> Result<Self, Self::Error> {
        let id = match raw.id {
            RawId::Text(s) => ListingId(s),
            RawId::Number(n) => ListingId::from(n),
        };

        Listing::builder()
            .id(id)
            .name(raw.name.unwrap_or_default())
            .description(raw.description.unwrap_or_default())
            .listing_url(raw.listing_url.unwrap_or_default())
            .price(raw.price)
            .capacity(raw.capacity)
            .amenities(raw.amenities)
            .build()
    }
}

/// Builder for Listing with fluent API
#[derive(Debug, Default)]
pub struct ListingBuilder {
    id: Option<ListingId>,
    name: String,
    description: String,
    listing_url: String,
    price: Option<f64>,
    capacity: Option<u32>,
    amenities: BTreeSet<String>,
}

impl ListingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listing ID
    pub fn id(mut self, id: impl Into<ListingId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the listing URL
    pub fn listing_url(mut self, url: impl Into<String>) -> Self {
        self.listing_url = url.into();
        self
    }

    /// Set the nightly price
    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the guest capacity
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Add an amenity
    pub fn amenity(mut self, amenity: impl Into<String>) -> Self {
        self.amenities.insert(amenity.into());
        self
    }

    /// Set all amenities
    pub fn amenities<I, S>(mut self, amenities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.amenities = amenities.into_iter().map(Into::into).collect();
        self
    }

    /// Build the Listing
    pub fn build(self) -> Result<Listing, ListingBuilderError> {
        let id = self.id.ok_or(ListingBuilderError::MissingId)?;
        let price = self.price.ok_or(ListingBuilderError::MissingPrice)?;
        if !price.is_finite() || price < 0.0 {
            return Err(ListingBuilderError::InvalidPrice(price));
        }
        let capacity = self.capacity.ok_or(ListingBuilderError::MissingCapacity)?;
        if capacity == 0 {
            return Err(ListingBuilderError::InvalidCapacity);
        }

        Ok(Listing {
            id,
            name: self.name,
            description: self.description,
            listing_url: self.listing_url,
            price,
            capacity,
            amenities: self.amenities,
        })
    }
}

/// Errors that can occur when building a Listing
#[derive(Debug, thiserror::Error)]
pub enum ListingBuilderError {
    #[error("Missing required field: id")]
    MissingId,
    #[error("Missing required field: price")]
    MissingPrice,
    #[error("Missing required field: capacity")]
    MissingCapacity,
    #[error("Price must be a finite non-negative number, got {0}")]
    InvalidPrice(f64),
    #[error("Capacity must be at least 1")]
    InvalidCapacity,
}

/// Structured constraints a listing must satisfy to become a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    /// Highest acceptable nightly price
    pub max_price: f64,
    /// Number of guests the listing must accommodate
    pub num_guests: u32,
    /// Amenities the listing must all have
    pub amenities: Vec<String>,
    /// Exact amenity matching (default: true)
    pub case_sensitive: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_price: f64::INFINITY,
            num_guests: 0,
            amenities: vec![],
            case_sensitive: true,
        }
    }
}

impl Constraints {
    /// Constraints that every listing satisfies
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_price(mut self, max_price: f64) -> Self {
        self.max_price = max_price;
        self
    }

    pub fn with_guests(mut self, num_guests: u32) -> Self {
        self.num_guests = num_guests;
        self
    }

    pub fn with_amenity(mut self, amenity: impl Into<String>) -> Self {
        self.amenities.push(amenity.into());
        self
    }

    pub fn with_amenities<I, S>(mut self, amenities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.amenities.extend(amenities.into_iter().map(Into::into));
        self
    }

    /// Match amenities ignoring case
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Check a listing against every constraint
    pub fn matches(&self, listing: &Listing) -> bool {
        listing.price <= self.max_price
            && listing.capacity >= self.num_guests
            && self
                .amenities
                .iter()
                .all(|a| listing.has_amenity(a, self.case_sensitive))
    }
}

/// A retrieval query: free text plus structured constraints
#[derive(Debug, Clone)]
pub struct Query {
    /// Free-text query, embedded for the similarity search
    pub text: String,
    /// Maximum number of results
    pub k: usize,
    /// Structured constraints
    pub constraints: Constraints,
    /// Lowercase preference terms for reranking (empty: no rerank)
    pub preferences: Vec<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            k: DEFAULT_K,
            constraints: Constraints::default(),
            preferences: vec![],
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_preferences<I, S>(mut self, preferences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferences = preferences.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price: f64, capacity: u32, amenities: &[&str]) -> Listing {
        Listing::builder()
            .id("l1")
            .description("Bright flat")
            .price(price)
            .capacity(capacity)
            .amenities(amenities.iter().copied())
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_missing_required() {
        let result = Listing::builder().price(10.0).capacity(1).build();
        assert!(matches!(result, Err(ListingBuilderError::MissingId)));
    }

    #[test]
    fn test_builder_rejects_negative_price() {
        let result = Listing::builder().id("x").price(-1.0).capacity(2).build();
        assert!(matches!(result, Err(ListingBuilderError::InvalidPrice(_))));
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let result = Listing::builder().id("x").price(1.0).capacity(0).build();
        assert!(matches!(result, Err(ListingBuilderError::InvalidCapacity)));
    }

    #[test]
    fn test_deserialize_dataset_fields() {
        let json = r#"{
            "_id": "10006546",
            "name": "Ribeira Charming Duplex",
            "description": null,
            "listing_url": "https://www.airbnb.com/rooms/10006546",
            "price": 80,
            "accommodates": 8,
            "amenities": ["TV", "Elevator"],
            "bedrooms": 3
        }"#;

        let listing: Listing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.id.as_str(), "10006546");
        assert_eq!(listing.description, "");
        assert_eq!(listing.capacity, 8);
        assert!(listing.amenities.contains("Elevator"));
    }

    #[test]
    fn test_deserialize_numeric_id() {
        let json = r#"{"_id": 42, "price": 10.5, "accommodates": 2}"#;
        let listing: Listing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.id, ListingId::from(42u64));
    }

    #[test]
    fn test_deserialize_rejects_invalid_capacity() {
        let json = r#"{"_id": "a", "price": 10.0, "accommodates": 0}"#;
        assert!(serde_json::from_str::<Listing>(json).is_err());
    }

    #[test]
    fn test_constraints_default_matches_everything() {
        let c = Constraints::default();
        assert!(c.matches(&listing(10_000.0, 1, &[])));
    }

    #[test]
    fn test_constraints_bounds_are_inclusive() {
        let c = Constraints::new().with_max_price(100.0).with_guests(2);
        assert!(c.matches(&listing(100.0, 2, &[])));
        assert!(!c.matches(&listing(100.01, 2, &[])));
        assert!(!c.matches(&listing(50.0, 1, &[])));
    }

    #[test]
    fn test_constraints_amenities_subset() {
        let c = Constraints::new()
            .with_amenity("Elevator")
            .with_amenity("Wide doorway");
        assert!(c.matches(&listing(1.0, 1, &["Elevator", "Wide doorway", "TV"])));
        assert!(!c.matches(&listing(1.0, 1, &["Elevator"])));
    }

    #[test]
    fn test_constraints_case_sensitivity() {
        let strict = Constraints::new().with_amenity("elevator");
        assert!(!strict.matches(&listing(1.0, 1, &["Elevator"])));

        let relaxed = strict.clone().case_insensitive();
        assert!(relaxed.matches(&listing(1.0, 1, &["Elevator"])));
    }

    #[test]
    fn test_query_defaults() {
        let query = Query::new("quiet flat near the river");
        assert_eq!(query.k, DEFAULT_K);
        assert!(query.preferences.is_empty());
        assert_eq!(query.constraints, Constraints::default());
    }
}
