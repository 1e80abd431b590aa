//! Nearest-neighbor capability over cosine space.
//!
//! Backends store L2-normalized copies of what they are given and normalize
//! every query, so callers may pass raw feature vectors. Results are always
//! ordered by `(distance, id)` ascending.

mod codec;
mod flat;
mod hnsw;

use std::fmt;
use std::path::Path;

use cadence_core::{magnitude, MIN_MAGNITUDE};
use serde::{Deserialize, Serialize};

use crate::distance::normalize;
use crate::error::{SearchError, SearchResult};

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

/// One query hit: a dense id and its cosine distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: u32,
    pub distance: f32,
}

/// Nearest-neighbor structure over fixed-dimension vectors.
///
/// Query methods are object safe so the recommendation engine works with
/// `&dyn AnnIndex` and never learns which backend it is talking to.
pub trait AnnIndex: fmt::Debug + Send + Sync {
    /// Empty index for `capacity` vectors of `dimension` length.
    fn with_capacity(dimension: usize, capacity: usize, params: &IndexParams) -> SearchResult<Self>
    where
        Self: Sized;

    /// Bulk insert. `ids` are caller-assigned and must be unique.
    fn add(&mut self, vectors: &[Vec<f32>], ids: &[u32]) -> SearchResult<()>;

    /// Up to `k` nearest ids. `k` is clamped to [`len`](Self::len).
    fn query(&self, vector: &[f32], k: usize) -> SearchResult<Vec<Neighbor>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    fn backend(&self) -> IndexBackend;

    fn save(&self, path: &Path) -> SearchResult<()>;

    fn load(path: &Path) -> SearchResult<Self>
    where
        Self: Sized;
}

/// Which structure backs an index generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Hierarchical navigable small-world graph.
    #[default]
    Hnsw,
    /// Exact linear scan.
    Flat,
}

impl IndexBackend {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hnsw => "hnsw",
            Self::Flat => "flat",
        }
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction and search parameters.
///
/// They trade recall against speed and never change correctness. A
/// generation's manifest records the values it was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    pub backend: IndexBackend,
    /// Graph degree.
    pub m: usize,
    /// Beam width while inserting.
    pub ef_construction: usize,
    /// Beam width while querying, raised to `k` when smaller.
    pub ef_search: usize,
    /// Highest graph layer, at most 16.
    pub max_layer: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Hnsw,
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            max_layer: 16,
        }
    }
}

impl IndexParams {
    pub fn validate(&self) -> SearchResult<()> {
        if !(2..=256).contains(&self.m) {
            return Err(SearchError::InvalidParameter(format!(
                "m must be between 2 and 256, got {}",
                self.m
            )));
        }
        if !(1..=16).contains(&self.max_layer) {
            return Err(SearchError::InvalidParameter(format!(
                "max_layer must be between 1 and 16, got {}",
                self.max_layer
            )));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(SearchError::InvalidParameter(
                "ef_construction and ef_search must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Empty index of the configured backend.
pub fn new_index(
    dimension: usize,
    capacity: usize,
    params: &IndexParams,
) -> SearchResult<Box<dyn AnnIndex>> {
    Ok(match params.backend {
        IndexBackend::Hnsw => Box::new(HnswIndex::with_capacity(dimension, capacity, params)?),
        IndexBackend::Flat => Box::new(FlatIndex::with_capacity(dimension, capacity, params)?),
    })
}

/// Load a saved index of the given backend.
pub fn open_index(backend: IndexBackend, path: &Path) -> SearchResult<Box<dyn AnnIndex>> {
    Ok(match backend {
        IndexBackend::Hnsw => Box::new(HnswIndex::load(path)?),
        IndexBackend::Flat => Box::new(FlatIndex::load(path)?),
    })
}

/// Check a bulk insert and return normalized copies of the vectors.
pub(crate) fn prepare_insert(
    dimension: usize,
    vectors: &[Vec<f32>],
    ids: &[u32],
) -> SearchResult<Vec<Vec<f32>>> {
    if vectors.len() != ids.len() {
        return Err(SearchError::InvalidParameter(format!(
            "{} vectors but {} ids",
            vectors.len(),
            ids.len()
        )));
    }

    vectors
        .iter()
        .zip(ids)
        .map(|(vector, id)| {
            if vector.len() != dimension {
                return Err(SearchError::DimensionMismatch {
                    expected: dimension,
                    found: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(SearchError::InvalidParameter(format!(
                    "vector for id {id} has non-finite values"
                )));
            }
            if magnitude(vector) < MIN_MAGNITUDE {
                return Err(SearchError::InvalidParameter(format!(
                    "vector for id {id} has zero magnitude"
                )));
            }
            Ok(normalize(vector))
        })
        .collect()
}

/// Check a query against an index and return it normalized.
///
/// Dimension is checked before emptiness so a misconfigured caller learns
/// about the schema problem first.
pub(crate) fn prepare_query(dimension: usize, len: usize, vector: &[f32]) -> SearchResult<Vec<f32>> {
    if vector.len() != dimension {
        return Err(SearchError::DimensionMismatch {
            expected: dimension,
            found: vector.len(),
        });
    }
    if len == 0 {
        return Err(SearchError::EmptyIndex);
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(SearchError::InvalidParameter(
            "query vector has non-finite values".to_string(),
        ));
    }
    Ok(normalize(vector))
}

pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
}
