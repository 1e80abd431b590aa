//! Exact nearest-neighbor scan.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::codec::{check_unique_labels, Decoder, Encoder};
use super::{prepare_insert, prepare_query, sort_neighbors, AnnIndex, IndexBackend, IndexParams, Neighbor};
use crate::distance::cosine_distance_normalized;
use crate::error::{SearchError, SearchResult};

const MAGIC: &[u8; 4] = b"CFLT";
const VERSION: u32 = 1;

/// Brute-force index. Exact, `O(n)` per query.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
    labels: Vec<u32>,
    seen: HashSet<u32>,
}

impl FlatIndex {
    fn vector(&self, node: usize) -> &[f32] {
        &self.vectors[node * self.dimension..(node + 1) * self.dimension]
    }
}

impl AnnIndex for FlatIndex {
    fn with_capacity(dimension: usize, capacity: usize, params: &IndexParams) -> SearchResult<Self> {
        if dimension == 0 {
            return Err(SearchError::InvalidParameter(
                "dimension must be positive".to_string(),
            ));
        }
        params.validate()?;
        Ok(Self {
            dimension,
            vectors: Vec::with_capacity(dimension * capacity),
            labels: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        })
    }

    fn add(&mut self, vectors: &[Vec<f32>], ids: &[u32]) -> SearchResult<()> {
        let normalized = prepare_insert(self.dimension, vectors, ids)?;
        if let Some(dup) = ids.iter().find(|id| self.seen.contains(*id)) {
            return Err(SearchError::InvalidParameter(format!("duplicate id {dup}")));
        }
        check_unique_labels(ids)
            .map_err(|dup| SearchError::InvalidParameter(format!("duplicate id {dup}")))?;

        for (vector, id) in normalized.into_iter().zip(ids) {
            self.vectors.extend(vector);
            self.labels.push(*id);
            self.seen.insert(*id);
        }
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> SearchResult<Vec<Neighbor>> {
        let q = prepare_query(self.dimension, self.len(), vector)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = self
            .labels
            .iter()
            .enumerate()
            .map(|(node, id)| Neighbor {
                id: *id,
                distance: cosine_distance_normalized(&q, self.vector(node)),
            })
            .collect();
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
        IndexBackend::Flat
    }

    fn save(&self, path: &Path) -> SearchResult<()> {
        let mut enc = Encoder::with_magic(MAGIC, VERSION);
        enc.put_count(self.dimension);
        enc.put_count(self.labels.len());
        enc.put_f32s(&self.vectors);
        enc.put_u32s(&self.labels);
        enc.write_to(path)
    }

    fn load(path: &Path) -> SearchResult<Self> {
        let data = fs::read(path)?;
        let mut dec = Decoder::open(&data, path, MAGIC, VERSION)?;
        let dimension = dec.count()?;
        let count = dec.count()?;
        if dimension == 0 {
            return Err(dec.corrupted("zero dimension"));
        }
        let total = dimension
            .checked_mul(count)
            .ok_or_else(|| dec.corrupted("length overflow"))?;
        let vectors = dec.f32s(total)?;
        let labels = dec.u32s(count)?;
        if check_unique_labels(&labels).is_err() {
            return Err(dec.corrupted("duplicate labels"));
        }
        dec.finish()?;

        let seen = labels.iter().copied().collect();
        Ok(Self {
            dimension,
            vectors,
            labels,
            seen,
        })
    }
}
