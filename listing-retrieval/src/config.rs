//! Retrieval configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::artifacts::ArtifactPaths;
use crate::builder::{BuilderConfig, Freshness, DEFAULT_BATCH_SIZE};
use crate::error::Result;
use crate::index::Metric;
use crate::record::{Constraints, DEFAULT_K};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Newline-delimited JSON listings
    pub dataset: PathBuf,
    /// Directory holding the index, embeddings and manifest
    pub artifacts_dir: PathBuf,
    /// Descriptions per embedding batch (default: 500)
    pub batch_size: usize,
    /// Index metric (default: squared_euclidean)
    pub metric: Metric,
    /// Results per query (default: 5)
    pub default_k: usize,
    pub freshness: Freshness,
    /// Exact amenity matching (default: true)
    pub case_sensitive_amenities: bool,
    /// Model cache directory; discovered when unset
    pub model_cache_dir: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("listings.jsonl"),
            artifacts_dir: PathBuf::from("artifacts"),
            batch_size: DEFAULT_BATCH_SIZE,
            metric: Metric::default(),
            default_k: DEFAULT_K,
            freshness: Freshness::default(),
            case_sensitive_amenities: true,
            model_cache_dir: None,
        }
    }
}

impl RetrievalConfig {
    /// Read a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.artifacts_dir)
    }

    pub fn builder_config(&self, force: bool) -> BuilderConfig {
        BuilderConfig {
            batch_size: self.batch_size,
            metric: self.metric,
            freshness: self.freshness,
            force,
        }
    }

    /// Empty constraints with the configured amenity matching
    pub fn base_constraints(&self) -> Constraints {
        let constraints = Constraints::new();
        if self.case_sensitive_amenities {
            constraints
        } else {
            constraints.case_insensitive()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"batch_size": 64, "metric": "cosine"}"#).unwrap();

        let config = RetrievalConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.default_k, DEFAULT_K);
        assert_eq!(config.freshness, Freshness::Fingerprint);
    }

    #[test]
    fn test_builder_config() {
        let config = RetrievalConfig {
            freshness: Freshness::Presence,
            ..Default::default()
        };
        let builder = config.builder_config(true);
        assert_eq!(builder.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(builder.freshness, Freshness::Presence);
        assert!(builder.force);
    }

    #[test]
    fn test_case_insensitive_constraints() {
        let config = RetrievalConfig {
            case_sensitive_amenities: false,
            ..Default::default()
        };
        assert!(!config.base_constraints().case_sensitive);
    }

    #[test]
    fn test_missing_file() {
        assert!(RetrievalConfig::load("/no/such/config.json").is_err());
    }
}
