//! Preference reranking
//!
//! Reorders retrieved listings by how often the user's preference terms
//! appear in their descriptions.

use std::cmp::Reverse;

use crate::record::Listing;

/// Anything with a description that preferences can be counted in
pub trait Described {
    fn description(&self) -> &str;
}

impl Described for Listing {
    fn description(&self) -> &str {
        &self.description
    }
}

impl<T: Described + ?Sized> Described for &T {
    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Total occurrences of every preference term in `description`
///
/// Case-insensitive, non-overlapping substring counts. Empty terms count
/// nothing.
pub fn preference_score<S: AsRef<str>>(description: &str, preferences: &[S]) -> usize {
    let haystack = description.to_lowercase();
    preferences
        .iter()
        .map(|term| term.as_ref().trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .map(|term| haystack.matches(term.as_str()).count())
        .sum()
}

/// Stable sort, highest preference score first
///
/// Never adds or drops items. Equal scores keep their input order, so a
/// distance-ordered input stays distance-ordered within each score.
pub fn rerank<T, S>(mut items: Vec<T>, preferences: &[S]) -> Vec<T>
where
    T: Described,
    S: AsRef<str>,
{
    if preferences.iter().all(|p| p.as_ref().trim().is_empty()) {
        return items;
    }
    items.sort_by_cached_key(|item| Reverse(preference_score(item.description(), preferences)));
    items
}

/// Reranker holding a fixed set of preference terms
#[derive(Debug, Clone, Default)]
pub struct Reranker {
    preferences: Vec<String>,
}

impl Reranker {
    pub fn new<I, S>(preferences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            preferences: preferences.into_iter().map(Into::into).collect(),
        }
    }

    pub fn preferences(&self) -> &[String] {
        &self.preferences
    }

    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
    }

    pub fn rerank<T: Described>(&self, items: Vec<T>) -> Vec<T> {
        rerank(items, &self.preferences)
    }
}
