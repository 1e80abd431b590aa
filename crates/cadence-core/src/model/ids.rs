use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

define_id!(PlaylistId, "Unique identifier for a playlist.");
define_id!(
    GenerationId,
    "Unique identifier for one published index generation."
);

/// External, stable identifier of a track (e.g. a video or catalog id).
///
/// Ordering is plain byte order of the underlying string; the diversity
/// stage relies on it as its tie-break key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TrackId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_id_generation() {
        let id1 = PlaylistId::new();
        let id2 = PlaylistId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_playlist_id_parse_round_trip() {
        let id = PlaylistId::new();
        let parsed: PlaylistId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<PlaylistId>().is_err());
    }

    #[test]
    fn test_track_id_ordering_is_byte_order() {
        let mut ids = vec![TrackId::from("b"), TrackId::from("B"), TrackId::from("a")];
        ids.sort();
        assert_eq!(ids, vec![TrackId::from("B"), TrackId::from("a"), TrackId::from("b")]);
    }

    #[test]
    fn test_track_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&TrackId::from("dQw4w9WgXcQ")).unwrap();
        assert_eq!(json, "\"dQw4w9WgXcQ\"");
    }
}
