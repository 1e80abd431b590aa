use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid feature vector: {0}")]
    Feature(#[from] FeatureError),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a feature vector does not satisfy the schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("track {track_id}: expected {expected} dimensions, found {found}")]
    DimensionMismatch {
        track_id: String,
        expected: usize,
        found: usize,
    },

    #[error("track {track_id}: non-finite value at dimension {index}")]
    NonFinite { track_id: String, index: usize },

    #[error("track {track_id}: zero magnitude")]
    ZeroMagnitude { track_id: String },

    #[error("track {track_id}: missing feature field {field}")]
    MissingField { track_id: String, field: &'static str },
}

impl FeatureError {
    /// The track whose vector was rejected.
    pub fn track_id(&self) -> &str {
        match self {
            Self::DimensionMismatch { track_id, .. }
            | Self::NonFinite { track_id, .. }
            | Self::ZeroMagnitude { track_id }
            | Self::MissingField { track_id, .. } => track_id,
        }
    }
}
