//! In-memory record store
//!
//! Holds every listing in a stable order. Positions in this order are the
//! row numbers of the embedding matrix, so the store never reorders.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{RetrievalError, Result};
use crate::record::{Constraints, Listing, ListingId};

/// Listing store keyed by [`ListingId`]
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    listings: Vec<Listing>,
    positions: HashMap<ListingId, usize>,
}

impl RecordStore {
    /// Create a store from listings, rejecting duplicate ids
    pub fn new(listings: Vec<Listing>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(listings.len());
        for (pos, listing) in listings.iter().enumerate() {
            if positions.insert(listing.id.clone(), pos).is_some() {
                return Err(RetrievalError::invalid_record(format!(
                    "duplicate listing id: {}",
                    listing.id
                )));
            }
        }

        Ok(Self {
            listings,
            positions,
        })
    }

    /// Load listings from a newline-delimited JSON file
    ///
    /// Blank lines are ignored. Lines that are not UTF-8 or fail to parse
    /// are skipped with a warning.
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(std::fs::File::open(path)?);

        let mut listings = Vec::new();
        let mut skipped = 0;

        for (line_no, bytes) in reader.split(b'\n').enumerate() {
            let line = match String::from_utf8(bytes?) {
                Ok(line) => line,
                Err(e) => {
                    log::warn!(
                        "Invalid UTF-8 at {}:{}: {}. Skipping.",
                        path.display(),
                        line_no + 1,
                        e
                    );
                    skipped += 1;
                    continue;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Listing>(line) {
                Ok(listing) => listings.push(listing),
                Err(e) => {
                    log::warn!(
                        "Failed to parse listing at {}:{}: {}. Skipping.",
                        path.display(),
                        line_no + 1,
                        e
                    );
                    skipped += 1;
                }
            }
        }

        log::info!("Loaded {} listings from {}", listings.len(), path.display());
        if skipped > 0 {
            log::warn!("Skipped {} listings due to parse errors", skipped);
        }

        Self::new(listings)
    }

    /// All listings in stable order
    pub fn get_all(&self) -> &[Listing] {
        &self.listings
    }

    /// Get a listing by ID
    pub fn get(&self, id: &ListingId) -> Option<&Listing> {
        self.positions.get(id).map(|&pos| &self.listings[pos])
    }

    /// Position of a listing in the stable order
    pub fn position(&self, id: &ListingId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Listing at a position
    pub fn at(&self, position: usize) -> Option<&Listing> {
        self.listings.get(position)
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Listings satisfying the constraints, in store order
    ///
    /// An empty result is a normal outcome.
    pub fn filter(&self, constraints: &Constraints) -> Vec<&Listing> {
        self.listings
            .iter()
            .filter(|listing| constraints.matches(listing))
            .collect()
    }

    /// Positions of the listings satisfying the constraints, in store order
    pub fn candidates(&self, constraints: &Constraints) -> Vec<usize> {
        self.listings
            .iter()
            .enumerate()
            .filter(|(_, listing)| constraints.matches(listing))
            .map(|(pos, _)| pos)
            .collect()
    }

    /// SHA-256 over ids and descriptions in store order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for listing in &self.listings {
            hasher.update(listing.id.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update(listing.description.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn listing(id: &str, price: f64, capacity: u32, amenities: &[&str]) -> Listing {
        Listing::builder()
            .id(id)
            .description(format!("Listing {id}"))
            .price(price)
            .capacity(capacity)
            .amenities(amenities.iter().copied())
            .build()
            .unwrap()
    }

    fn sample_store() -> RecordStore {
        RecordStore::new(vec![
            listing("A", 100.0, 2, &["Elevator"]),
            listing("B", 300.0, 4, &[]),
            listing("C", 150.0, 2, &["Elevator", "Wheelchair accessible"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = RecordStore::new(vec![
            listing("A", 1.0, 1, &[]),
            listing("A", 2.0, 1, &[]),
        ]);
        assert!(matches!(result, Err(RetrievalError::InvalidRecord(_))));
    }

    #[test]
    fn test_get_all_is_stable() {
        let store = sample_store();
        let first: Vec<_> = store.get_all().iter().map(|l| l.id.clone()).collect();
        let second: Vec<_> = store.get_all().iter().map(|l| l.id.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(store.position(&ListingId::from("C")), Some(2));
    }

    #[test]
    fn test_filter_example() {
        let store = sample_store();
        let constraints = Constraints::new()
            .with_max_price(200.0)
            .with_guests(2)
            .with_amenity("Elevator");

        let ids: Vec<_> = store
            .filter(&constraints)
            .iter()
            .map(|l| l.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(store.candidates(&constraints), vec![0, 2]);
    }

    #[test]
    fn test_filter_empty_result_is_not_an_error() {
        let store = sample_store();
        let constraints = Constraints::new().with_max_price(10.0);
        assert!(store.filter(&constraints).is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_descriptions() {
        let store = sample_store();
        let same = sample_store();
        assert_eq!(store.fingerprint(), same.fingerprint());

        let mut changed = sample_store().get_all().to_vec();
        changed[1].description = "Renovated".to_string();
        let changed = RecordStore::new(changed).unwrap();
        assert_ne!(store.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_from_jsonl_skips_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"_id": "1", "price": 50, "accommodates": 2}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"_id": "2", "price": 75.5, "accommodates": 3, "amenities": ["Elevator"]}}"#).unwrap();

        let store = RecordStore::from_jsonl(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get(&ListingId::from("2")).unwrap().has_amenity("Elevator", true));
    }

    #[test]
    fn test_from_jsonl_skips_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\xff\xfe{\"_id\": \"0\"}\n").unwrap();
        writeln!(file, r#"{{"_id": "1", "price": 50, "accommodates": 2}}"#).unwrap();
        file.write_all(b"{\"_id\": \"2\", \"name\": \"caf\xe9\"}").unwrap();

        let store = RecordStore::from_jsonl(file.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&ListingId::from("1")).is_some());
    }

    #[test]
    fn test_from_jsonl_missing_file() {
        let result = RecordStore::from_jsonl("/definitely/not/here.jsonl");
        assert!(matches!(result, Err(RetrievalError::Io(_))));
    }

    const AMENITY_POOL: [&str; 4] = ["Elevator", "Wide doorway", "Step-free access", "TV"];

    fn arb_listing() -> impl Strategy<Value = (f64, u32, Vec<bool>)> {
        (
            0.0f64..500.0,
            1u32..10,
            proptest::collection::vec(any::<bool>(), AMENITY_POOL.len()),
        )
    }

    proptest! {
        #[test]
        fn prop_filter_matches_definition(
            rows in proptest::collection::vec(arb_listing(), 0..30),
            max_price in 0.0f64..500.0,
            num_guests in 0u32..10,
            required in proptest::collection::vec(any::<bool>(), AMENITY_POOL.len()),
        ) {
            let listings: Vec<Listing> = rows
                .iter()
                .enumerate()
                .map(|(i, (price, capacity, has))| {
                    let amenities: Vec<&str> = AMENITY_POOL
                        .iter()
                        .zip(has)
                        .filter(|(_, h)| **h)
                        .map(|(a, _)| *a)
                        .collect();
                    listing(&i.to_string(), *price, *capacity, &amenities)
                })
                .collect();
            let store = RecordStore::new(listings).unwrap();

            let required: Vec<&str> = AMENITY_POOL
                .iter()
                .zip(&required)
                .filter(|(_, r)| **r)
                .map(|(a, _)| *a)
                .collect();
            let constraints = Constraints::new()
                .with_max_price(max_price)
                .with_guests(num_guests)
                .with_amenities(required.iter().copied());

            let kept: Vec<&ListingId> = store.filter(&constraints).iter().map(|l| &l.id).collect();
            for l in store.get_all() {
                let expected = l.price <= max_price
                    && l.capacity >= num_guests
                    && required.iter().all(|a| l.amenities.contains(*a));
                prop_assert_eq!(kept.contains(&&l.id), expected);
            }
        }
    }
}
