//! Vector search for cadence.
//!
//! Builds cosine-space nearest-neighbor indices over track feature vectors,
//! publishes them as immutable generations, and answers playlist
//! recommendation queries against the live generation.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod ann;
pub mod artifact;
pub mod builder;
pub mod distance;
pub mod error;
pub mod lookup;
pub mod recommend;
pub mod service;
pub mod snapshot;

pub use ann::{AnnIndex, FlatIndex, HnswIndex, IndexBackend, IndexParams, Neighbor};
pub use artifact::{ArtifactStore, IndexSnapshot, Manifest};
pub use builder::{BuildOutcome, BuildReport, IndexBuilder};
pub use error::{SearchError, SearchResult};
pub use lookup::IdLookup;
pub use recommend::{RecommendOptions, Recommendation, RecommendationEngine, Stage};
pub use service::Recommender;
pub use snapshot::{ArtifactHandle, GenerationState};
