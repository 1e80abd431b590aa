//! Dense id to track id table published with each index.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use cadence_core::TrackId;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};

/// Maps dense ids `0..N-1` to external track ids.
///
/// Serialized as a JSON object keyed by the decimal id:
/// `{"0": "abc", "1": "def"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdLookup {
    tracks: Vec<TrackId>,
}

impl IdLookup {
    /// Id `i` maps to `tracks[i]`.
    #[must_use]
    pub fn new(tracks: Vec<TrackId>) -> Self {
        Self { tracks }
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&TrackId> {
        self.tracks.get(id as usize)
    }

    /// Resolve an id or report the table as inconsistent with its index.
    pub fn resolve(&self, id: u32) -> SearchResult<&TrackId> {
        self.get(id).ok_or_else(|| {
            SearchError::Unavailable(format!(
                "index returned id {id} outside lookup of {} entries",
                self.len()
            ))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &TrackId)> {
        self.tracks.iter().enumerate().map(|(i, t)| (i as u32, t))
    }

    pub fn save(&self, path: &Path) -> SearchResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        crate::artifact::write_synced(path, &json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> SearchResult<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SearchError::corrupted(path, format!("invalid id lookup: {e}")))
    }
}

impl Serialize for IdLookup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tracks.len()))?;
        for (id, track) in self.iter() {
            map.serialize_entry(&id.to_string(), track.as_str())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IdLookup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LookupVisitor)
    }
}

struct LookupVisitor;

impl<'de> Visitor<'de> for LookupVisitor {
    type Value = IdLookup;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping decimal ids to track ids")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries: HashMap<u32, String> =
            HashMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, track)) = access.next_entry::<String, String>()? {
            let id: u32 = key
                .parse()
                .map_err(|_| de::Error::custom(format!("non-numeric id key {key:?}")))?;
            if entries.insert(id, track).is_some() {
                return Err(de::Error::custom(format!("duplicate id {id}")));
            }
        }

        let mut tracks = Vec::with_capacity(entries.len());
        for id in 0..entries.len() as u32 {
            let track = entries
                .remove(&id)
                .ok_or_else(|| de::Error::custom(format!("missing id {id}")))?;
            tracks.push(TrackId::new(track));
        }
        Ok(IdLookup { tracks })
    }
}
