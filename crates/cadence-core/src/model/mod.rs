pub mod feature;
pub mod ids;
pub mod playlist;

pub use feature::{
    magnitude, FeatureVector, FEATURE_DIMENSION, FEATURE_FIELDS, MIN_MAGNITUDE, SCHEMA_VERSION,
};
pub use ids::{GenerationId, PlaylistId, TrackId};
pub use playlist::Playlist;
