//! Core domain model for cadence.
//!
//! This crate defines track and playlist identifiers, the pinned acoustic
//! feature schema, the narrow `FeatureStore` port the recommendation engine
//! reads from, and a SQLite adapter for that port.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;
pub mod store;

pub use error::{Error, FeatureError, Result};
pub use model::{
    magnitude, FeatureVector, PlaylistId, TrackId, FEATURE_DIMENSION, MIN_MAGNITUDE, SCHEMA_VERSION,
};
pub use store::{FeatureStore, MemoryFeatureStore};
