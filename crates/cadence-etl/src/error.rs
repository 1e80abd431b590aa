//! Import error types.

use thiserror::Error;

/// Errors that stop an import. Problems confined to one input line are
/// reported in the summary instead.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The input could not be read.
    #[error("I/O error reading line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// The input file could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An error propagated from the feature store.
    #[error("database error: {0}")]
    Database(#[from] cadence_core::Error),
}

impl ImportError {
    /// Returns `true` when the failure came from the input rather than the
    /// store.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Open { .. })
    }
}

/// Convenience alias for import results.
pub type ImportResult<T> = std::result::Result<T, ImportError>;
