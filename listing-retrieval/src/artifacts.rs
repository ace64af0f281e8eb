//! On-disk artifact layout and build manifest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RetrievalError, Result};
use crate::index::Metric;

/// Manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Paths of the persisted artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Global vector index
    pub index: PathBuf,
    /// Raw embedding matrix
    pub embeddings: PathBuf,
    /// Build manifest, written last
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    /// Standard layout inside a directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            index: dir.join("listings.index"),
            embeddings: dir.join("listings.embeddings"),
            manifest: dir.join("manifest.json"),
        }
    }

    /// Both binary artifacts are present
    pub fn binaries_exist(&self) -> bool {
        self.index.exists() && self.embeddings.exists()
    }

    /// Every artifact, manifest included, is present
    pub fn all_exist(&self) -> bool {
        self.binaries_exist() && self.manifest.exists()
    }
}

/// Describes the dataset and model a set of artifacts was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub format_version: u32,
    pub model_id: String,
    pub dimension: usize,
    pub records: usize,
    /// [`crate::RecordStore::fingerprint`] at build time
    pub fingerprint: String,
    pub metric: Metric,
    pub built_at: DateTime<Utc>,
}

impl BuildManifest {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RetrievalError::index_not_found(format!("{}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reason these artifacts cannot serve `fingerprint`/`model_id`, if any
    pub fn staleness(&self, fingerprint: &str, records: usize, model_id: &str) -> Option<String> {
        if self.format_version != MANIFEST_VERSION {
            return Some(format!(
                "manifest version {} (expected {})",
                self.format_version, MANIFEST_VERSION
            ));
        }
        if self.records != records {
            return Some(format!(
                "built from {} records, dataset has {}",
                self.records, records
            ));
        }
        if self.fingerprint != fingerprint {
            return Some("dataset fingerprint changed".to_string());
        }
        if self.model_id != model_id {
            return Some(format!(
                "built with model {}, provider is {}",
                self.model_id, model_id
            ));
        }
        None
    }
}
