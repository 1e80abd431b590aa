use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{PlaylistId, TrackId};

/// An ordered list of tracks owned by some external user.
///
/// The recommendation engine only ever looks at the set of tracks; order is
/// kept so the store can round-trip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub tracks: Vec<TrackId>,
    pub created_at: DateTime<Utc>,
}

impl Playlist {
    #[must_use]
    pub fn new(id: PlaylistId, name: impl Into<String>, tracks: Vec<TrackId>) -> Self {
        Self {
            id,
            name: name.into(),
            tracks,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn contains(&self, track_id: &TrackId) -> bool {
        self.tracks.contains(track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_contains() {
        let playlist = Playlist::new(
            PlaylistId::new(),
            "Morning",
            vec![TrackId::from("a"), TrackId::from("b")],
        );
        assert!(playlist.contains(&TrackId::from("a")));
        assert!(!playlist.contains(&TrackId::from("c")));
    }
}
