//! Approximate index backed by `hnsw_rs`.
//!
//! The graph itself is never written to disk. A saved index holds the
//! normalized vectors and their ids in a `CHNW` container, and loading
//! rebuilds the graph from them.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use hnsw_rs::prelude::{DistDot, Hnsw};

use super::codec::{check_unique_labels, Decoder, Encoder};
use super::{prepare_insert, prepare_query, sort_neighbors, AnnIndex, IndexBackend, IndexParams, Neighbor};
use crate::distance::cosine_distance_normalized;
use crate::error::{SearchError, SearchResult};

const MAGIC: &[u8; 4] = b"CHNW";
const VERSION: u32 = 2;

// `DistDot` computes `1 - dot` and rejects negative results, so unit
// vectors are pulled just inside the sphere before they reach the graph.
const DIST_DOT_SHRINK: f32 = 0.999_999;

/// Approximate index. Graph point ids are insertion positions; the
/// caller's ids are kept as labels.
pub struct HnswIndex {
    hnsw: Hnsw<'static, f32, DistDot>,
    dimension: usize,
    params: IndexParams,
    vectors: Vec<Vec<f32>>,
    labels: Vec<u32>,
    label_set: HashSet<u32>,
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("points", &self.hnsw.get_nb_point())
            .field("labels", &self.labels.len())
            .field("dimension", &self.dimension)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl HnswIndex {
    #[must_use]
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    fn graph(params: &IndexParams, capacity: usize) -> Hnsw<'static, f32, DistDot> {
        Hnsw::new(
            params.m,
            capacity.max(1),
            params.max_layer,
            params.ef_construction,
            DistDot,
        )
    }

    /// Insert already-normalized vectors under fresh positions.
    fn insert_normalized(&mut self, normalized: Vec<Vec<f32>>, ids: &[u32]) {
        let first = self.vectors.len();
        let shrunk: Vec<Vec<f32>> = normalized.iter().map(|v| shrink(v)).collect();
        let with_positions: Vec<(&Vec<f32>, usize)> = shrunk
            .iter()
            .enumerate()
            .map(|(offset, vector)| (vector, first + offset))
            .collect();
        if !with_positions.is_empty() {
            self.hnsw.parallel_insert(&with_positions);
        }

        self.vectors.extend(normalized);
        self.labels.extend_from_slice(ids);
        self.label_set.extend(ids.iter().copied());
    }
}

fn shrink(unit: &[f32]) -> Vec<f32> {
    unit.iter().map(|v| v * DIST_DOT_SHRINK).collect()
}

impl AnnIndex for HnswIndex {
    fn with_capacity(dimension: usize, capacity: usize, params: &IndexParams) -> SearchResult<Self> {
        if dimension == 0 {
            return Err(SearchError::InvalidParameter(
                "dimension must be positive".to_string(),
            ));
        }
        params.validate()?;
        Ok(Self {
            hnsw: Self::graph(params, capacity),
            dimension,
            params: params.clone(),
            vectors: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
            label_set: HashSet::with_capacity(capacity),
        })
    }

    fn add(&mut self, vectors: &[Vec<f32>], ids: &[u32]) -> SearchResult<()> {
        let normalized = prepare_insert(self.dimension, vectors, ids)?;
        if let Some(dup) = ids.iter().find(|id| self.label_set.contains(*id)) {
            return Err(SearchError::InvalidParameter(format!("duplicate id {dup}")));
        }
        check_unique_labels(ids)
            .map_err(|dup| SearchError::InvalidParameter(format!("duplicate id {dup}")))?;

        self.insert_normalized(normalized, ids);
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> SearchResult<Vec<Neighbor>> {
        let q = prepare_query(self.dimension, self.len(), vector)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let ef = self.params.ef_search.max(k);
        let found = self.hnsw.search(&shrink(&q), k, ef);

        // Distances are recomputed on the stored unit vectors so both
        // backends report the same value for the same pair.
        let mut hits = Vec::with_capacity(found.len());
        for neighbour in found {
            let (Some(label), Some(stored)) = (
                self.labels.get(neighbour.d_id),
                self.vectors.get(neighbour.d_id),
            ) else {
                return Err(SearchError::InvalidParameter(format!(
                    "graph returned unknown point {}",
                    neighbour.d_id
                )));
            };
            hits.push(Neighbor {
                id: *label,
                distance: cosine_distance_normalized(&q, stored),
            });
        }
        sort_neighbors(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend(&self) -> IndexBackend {
        IndexBackend::Hnsw
    }

    /// Layout: magic, version, dimension, count, m, ef_construction,
    /// ef_search, max_layer, vectors, labels.
    fn save(&self, path: &Path) -> SearchResult<()> {
        let mut enc = Encoder::with_magic(MAGIC, VERSION);
        enc.put_count(self.dimension);
        enc.put_count(self.labels.len());
        enc.put_count(self.params.m);
        enc.put_count(self.params.ef_construction);
        enc.put_count(self.params.ef_search);
        enc.put_count(self.params.max_layer);
        for vector in &self.vectors {
            enc.put_f32s(vector);
        }
        enc.put_u32s(&self.labels);
        enc.write_to(path)
    }

    fn load(path: &Path) -> SearchResult<Self> {
        let data = fs::read(path)?;
        let mut dec = Decoder::open(&data, path, MAGIC, VERSION)?;

        let dimension = dec.count()?;
        let count = dec.count()?;
        let params = IndexParams {
            backend: IndexBackend::Hnsw,
            m: dec.count()?,
            ef_construction: dec.count()?,
            ef_search: dec.count()?,
            max_layer: dec.count()?,
        };
        if dimension == 0 || params.validate().is_err() {
            return Err(dec.corrupted("invalid header"));
        }

        let mut vectors = Vec::with_capacity(count.min(data.len() / 4));
        for _ in 0..count {
            let vector = dec.f32s(dimension)?;
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(dec.corrupted("non-finite vector"));
            }
            vectors.push(vector);
        }
        let labels = dec.u32s(count)?;
        if check_unique_labels(&labels).is_err() {
            return Err(dec.corrupted("duplicate labels"));
        }
        dec.finish()?;

        let mut index = Self {
            hnsw: Self::graph(&params, count),
            dimension,
            params,
            vectors: Vec::with_capacity(count),
            labels: Vec::with_capacity(count),
            label_set: HashSet::with_capacity(count),
        };
        index.insert_normalized(vectors, &labels);
        Ok(index)
    }
}
