//! Request-side entry point: playlist id in, recommendations out.

use std::sync::Arc;

use cadence_core::model::PlaylistId;
use cadence_core::{FeatureStore, FeatureVector};

use crate::artifact::ArtifactStore;
use crate::error::SearchResult;
use crate::recommend::{RecommendOptions, Recommendation, RecommendationEngine};
use crate::snapshot::ArtifactHandle;

/// Serves recommendations from whatever generation is live.
#[derive(Debug, Clone, Default)]
pub struct Recommender {
    handle: Arc<ArtifactHandle>,
}

impl Recommender {
    #[must_use]
    pub fn new(handle: Arc<ArtifactHandle>) -> Self {
        Self { handle }
    }

    /// Recommender over the live generation in `store`.
    pub fn open(store: &ArtifactStore) -> SearchResult<Self> {
        let recommender = Self::default();
        recommender.refresh(store)?;
        Ok(recommender)
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<ArtifactHandle> {
        &self.handle
    }

    /// Recommend for already-fetched playlist vectors.
    ///
    /// Fails with `Unavailable` when no generation is loaded, even for an
    /// empty playlist.
    pub fn recommend(
        &self,
        playlist: &[FeatureVector],
        options: &RecommendOptions,
    ) -> SearchResult<Vec<Recommendation>> {
        let snapshot = self.handle.require()?;
        RecommendationEngine::new(options.clone()).recommend(
            playlist,
            snapshot.index(),
            snapshot.lookup(),
        )
    }

    /// Fetch a playlist's vectors from `store` and recommend for it.
    pub fn recommend_for_playlist(
        &self,
        store: &dyn FeatureStore,
        playlist_id: &PlaylistId,
        options: &RecommendOptions,
    ) -> SearchResult<Vec<Recommendation>> {
        let snapshot = self.handle.require()?;
        let playlist = store.playlist_feature_vectors(playlist_id)?;
        log::debug!(
            "Playlist {} has {} vectors; generation {}",
            playlist_id,
            playlist.len(),
            snapshot.generation_id()
        );
        RecommendationEngine::new(options.clone()).recommend(
            &playlist,
            snapshot.index(),
            snapshot.lookup(),
        )
    }

    /// Load a newer on-disk generation if there is one.
    pub fn refresh(&self, store: &ArtifactStore) -> SearchResult<bool> {
        self.handle.reload_from(store)
    }
}
