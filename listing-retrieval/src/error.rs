//! Error types for listing-retrieval

use thiserror::Error;

/// Errors that can occur in the retrieval engine
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Vector length disagrees with the index or matrix dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted artifact missing, unreadable, or not an artifact at all
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Embedding or generation provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Generation output without the expected Q:/A: markers
    #[error("Malformed generation output: {raw:?}")]
    MalformedOutput { raw: String },

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid listing data
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Loaded artifacts disagree with each other or with the record store
    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// Artifacts were built from a different dataset
    #[error("Stale artifacts: {0}")]
    StaleArtifacts(String),

    /// Serialization error (bincode)
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Builder error
    #[error("Builder error: {0}")]
    Builder(#[from] crate::record::ListingBuilderError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Create a dimension mismatch error
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create an index not found error
    pub fn index_not_found(msg: impl Into<String>) -> Self {
        Self::IndexNotFound(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a malformed output error carrying the raw generation text
    pub fn malformed_output(raw: impl Into<String>) -> Self {
        Self::MalformedOutput { raw: raw.into() }
    }

    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create an artifact mismatch error
    pub fn artifact_mismatch(msg: impl Into<String>) -> Self {
        Self::ArtifactMismatch(msg.into())
    }

    /// Create a stale artifacts error
    pub fn stale_artifacts(msg: impl Into<String>) -> Self {
        Self::StaleArtifacts(msg.into())
    }

    /// Stable snake_case name of the error kind, used in error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::IndexNotFound(_) => "index_not_found",
            Self::Provider(_) => "provider_error",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::InvalidQuery(_) => "invalid_query",
            Self::InvalidRecord(_) => "invalid_record",
            Self::ArtifactMismatch(_) => "artifact_mismatch",
            Self::StaleArtifacts(_) => "stale_artifacts",
            Self::Bincode(_) => "serialization_error",
            Self::Json(_) => "json_error",
            Self::Builder(_) => "builder_error",
            Self::Io(_) => "io_error",
        }
    }
}

/// Result type for retrieval operations
pub type Result<T> = std::result::Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let err = RetrievalError::dimension_mismatch(384, 256);
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 256");
        assert_eq!(err.kind(), "dimension_mismatch");
    }

    #[test]
    fn test_malformed_output_keeps_raw_text() {
        let err = RetrievalError::malformed_output("no markers here");
        match &err {
            RetrievalError::MalformedOutput { raw } => assert_eq!(raw, "no markers here"),
            _ => panic!("Expected MalformedOutput"),
        }
        assert_eq!(err.kind(), "malformed_output");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RetrievalError = io_err.into();
        assert!(matches!(err, RetrievalError::Io(_)));
        assert_eq!(err.kind(), "io_error");
    }
}
