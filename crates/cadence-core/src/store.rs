//! The read-only port the index builder and recommender consume.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{FeatureVector, Playlist, PlaylistId, TrackId};

/// Source of `(track_id, feature_vector)` pairs.
///
/// Implementations need only ordinary read consistency: a vector written
/// while a build is reading simply shows up in the next generation.
pub trait FeatureStore {
    /// Every active feature vector, one per track.
    fn all_feature_vectors(&self) -> Result<Vec<FeatureVector>>;

    /// Feature vectors of the tracks in a playlist.
    ///
    /// Tracks without a vector are left out. An unknown playlist is a
    /// `NotFound` error.
    fn playlist_feature_vectors(&self, playlist_id: &PlaylistId) -> Result<Vec<FeatureVector>>;
}

/// An in-memory store, mostly for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemoryFeatureStore {
    vectors: Vec<FeatureVector>,
    playlists: HashMap<PlaylistId, Playlist>,
}

impl MemoryFeatureStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vector for a track.
    pub fn upsert(&mut self, vector: FeatureVector) {
        match self
            .vectors
            .iter_mut()
            .find(|existing| existing.track_id == vector.track_id)
        {
            Some(existing) => *existing = vector,
            None => self.vectors.push(vector),
        }
    }

    pub fn add_playlist(&mut self, playlist: Playlist) {
        self.playlists.insert(playlist.id, playlist);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn vector_for(&self, track_id: &TrackId) -> Option<&FeatureVector> {
        self.vectors.iter().find(|v| &v.track_id == track_id)
    }
}

impl FromIterator<FeatureVector> for MemoryFeatureStore {
    fn from_iter<I: IntoIterator<Item = FeatureVector>>(iter: I) -> Self {
        let mut store = Self::new();
        for vector in iter {
            store.upsert(vector);
        }
        store
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn all_feature_vectors(&self) -> Result<Vec<FeatureVector>> {
        Ok(self.vectors.clone())
    }

    fn playlist_feature_vectors(&self, playlist_id: &PlaylistId) -> Result<Vec<FeatureVector>> {
        let playlist = self.playlists.get(playlist_id).ok_or_else(|| Error::NotFound {
            entity: "playlist",
            id: playlist_id.to_string(),
        })?;

        Ok(playlist
            .tracks
            .iter()
            .filter_map(|track_id| self.vector_for(track_id).cloned())
            .collect())
    }
}
