//! Error types for index construction, artifact I/O and recommendation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the search layer.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The index holds no elements and cannot answer a query.
    #[error("empty index")]
    EmptyIndex,

    /// A vector does not match the index dimension.
    #[error("schema mismatch: index has {expected} dimensions, vector has {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A caller-supplied parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A vector was rejected (non-finite values, zero magnitude, wrong length).
    #[error("invalid vector: {0}")]
    InvalidVector(#[from] cadence_core::FeatureError),

    /// No usable index generation is available.
    #[error("recommendations unavailable: {0}")]
    Unavailable(String),

    /// A persisted artifact exists but cannot be decoded.
    #[error("corrupted artifact {}: {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    /// The manifest could not be encoded.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// An error propagated from the feature store.
    #[error("feature store error: {0}")]
    Store(#[from] cadence_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    pub(crate) fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for operational failures where recommendations cannot
    /// be served until the next successful build.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Corrupted { .. } | Self::EmptyIndex
        )
    }

    /// Returns `true` when a vector did not match the index dimension.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
            || matches!(
                self,
                Self::InvalidVector(cadence_core::FeatureError::DimensionMismatch { .. })
            )
    }
}

/// Convenience alias for search results.
pub type SearchResult<T> = std::result::Result<T, SearchError>;
