//! Builds one index generation from the full feature corpus.

use std::time::{Duration, Instant};

use cadence_core::{FeatureError, FeatureStore, FeatureVector, TrackId, FEATURE_DIMENSION};

use crate::ann::{new_index, IndexParams};
use crate::artifact::{ArtifactStore, IndexSnapshot, Manifest};
use crate::distance::normalize;
use crate::error::{SearchError, SearchResult};
use crate::lookup::IdLookup;

/// What a build pass saw and did.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Vectors returned by the store.
    pub read: usize,
    /// Vectors in the new index.
    pub indexed: usize,
    /// Extra vectors for a track that already had one; the last wins.
    pub duplicates: usize,
    /// Malformed vectors that were skipped.
    pub quarantined: Vec<FeatureError>,
    pub elapsed: Duration,
}

/// Result of [`IndexBuilder::build`].
#[derive(Debug)]
pub enum BuildOutcome {
    /// Nothing indexable. Whatever generation was live stays live.
    Skipped(BuildReport),
    /// A fresh generation, not yet published.
    Built {
        snapshot: IndexSnapshot,
        report: BuildReport,
    },
}

impl BuildOutcome {
    #[must_use]
    pub fn report(&self) -> &BuildReport {
        match self {
            Self::Skipped(report) | Self::Built { report, .. } => report,
        }
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built { .. })
    }
}

/// Turns a feature corpus into an index plus id lookup.
///
/// Dense ids are assigned in ascending track-id order, so the same corpus
/// always yields the same lookup whatever order the store returns it in.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    dimension: usize,
    params: IndexParams,
    strict: bool,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(IndexParams::default())
    }
}

impl IndexBuilder {
    #[must_use]
    pub fn new(params: IndexParams) -> Self {
        Self {
            dimension: FEATURE_DIMENSION,
            params,
            strict: false,
        }
    }

    /// Override the schema dimension.
    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Abort on the first malformed vector instead of skipping it.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Read the whole corpus from `store` and build.
    pub fn build(&self, store: &dyn FeatureStore) -> SearchResult<BuildOutcome> {
        let vectors = store.all_feature_vectors()?;
        self.build_from(vectors)
    }

    /// Build and, when something was built, publish it.
    pub fn build_and_publish(
        &self,
        store: &dyn FeatureStore,
        artifacts: &ArtifactStore,
    ) -> SearchResult<BuildOutcome> {
        let outcome = self.build(store)?;
        if let BuildOutcome::Built { snapshot, .. } = &outcome {
            artifacts.publish(snapshot)?;
        }
        Ok(outcome)
    }

    pub fn build_from(&self, mut vectors: Vec<FeatureVector>) -> SearchResult<BuildOutcome> {
        self.params.validate()?;
        let started = Instant::now();
        let mut report = BuildReport {
            read: vectors.len(),
            ..BuildReport::default()
        };

        vectors.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        let mut accepted: Vec<FeatureVector> = Vec::with_capacity(vectors.len());
        for vector in vectors {
            if accepted.last().is_some_and(|prev| prev.track_id == vector.track_id) {
                report.duplicates += 1;
                accepted.pop();
            }
            accepted.push(vector);
        }

        let mut tracks: Vec<TrackId> = Vec::with_capacity(accepted.len());
        let mut normalized: Vec<Vec<f32>> = Vec::with_capacity(accepted.len());
        for vector in accepted {
            if let Err(err) = vector.validate(self.dimension) {
                if self.strict {
                    log::error!("Aborting build: {}", err);
                    return Err(SearchError::InvalidVector(err));
                }
                log::warn!("Quarantined vector: {}", err);
                report.quarantined.push(err);
                continue;
            }
            normalized.push(normalize(&vector.values));
            tracks.push(vector.track_id);
        }

        if tracks.is_empty() {
            report.elapsed = started.elapsed();
            log::info!(
                "Nothing to index ({} read, {} quarantined); keeping current generation",
                report.read,
                report.quarantined.len()
            );
            return Ok(BuildOutcome::Skipped(report));
        }

        let count = tracks.len();
        let ids: Vec<u32> = (0..count as u32).collect();
        let mut index = new_index(self.dimension, count, &self.params)?;
        index.add(&normalized, &ids)?;

        let manifest = Manifest::new(
            self.dimension,
            count,
            report.quarantined.len(),
            self.params.clone(),
        );
        let snapshot = IndexSnapshot::new(manifest, index, IdLookup::new(tracks))?;

        report.indexed = count;
        report.elapsed = started.elapsed();
        log::info!(
            "Built {} index: {} vectors, {} quarantined, {} duplicates in {:?}",
            self.params.backend,
            report.indexed,
            report.quarantined.len(),
            report.duplicates,
            report.elapsed
        );

        Ok(BuildOutcome::Built { snapshot, report })
    }
}
