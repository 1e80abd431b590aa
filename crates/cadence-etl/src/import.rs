//! JSON Lines import of feature vectors and playlists.
//!
//! Each non-blank line is one record tagged by `kind`:
//!
//! ```text
//! {"kind": "features", "track_id": "abc", "features": {"tempo": 120.0, ...}}
//! {"kind": "vector", "track_id": "abc", "values": [0.1, 0.2, ...]}
//! {"kind": "playlist", "name": "focus", "tracks": ["abc", "def"]}
//! ```
//!
//! Lines that fail to parse or validate are skipped and reported; store
//! failures abort the import.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use cadence_core::model::Playlist;
use cadence_core::schema::Database;
use cadence_core::{FeatureVector, PlaylistId, TrackId};
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, ImportResult};

/// One input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImportRecord {
    /// Named descriptors, reordered into schema order on import.
    Features {
        track_id: String,
        features: BTreeMap<String, f64>,
    },
    /// Values already in schema order.
    Vector { track_id: String, values: Vec<f32> },
    Playlist {
        /// Reuse an id to replace an existing playlist.
        #[serde(default)]
        id: Option<PlaylistId>,
        name: String,
        tracks: Vec<String>,
    },
}

/// A line that was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    /// 1-based.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub vectors: usize,
    pub playlists: Vec<(PlaylistId, String)>,
    pub skipped: Vec<SkippedLine>,
}

/// Import records from `reader` into `db`.
pub fn import_reader<R: BufRead>(db: &Database, reader: R) -> ImportResult<ImportSummary> {
    let mut summary = ImportSummary::default();

    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line.map_err(|source| ImportError::Io {
            line: number,
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let record: ImportRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(e) => {
                skip(&mut summary, number, format!("invalid record: {e}"));
                continue;
            }
        };

        match apply(db, record) {
            Ok(Applied::Vector) => summary.vectors += 1,
            Ok(Applied::Playlist(id, name)) => summary.playlists.push((id, name)),
            Err(cadence_core::Error::Feature(e)) => skip(&mut summary, number, e.to_string()),
            Err(e) => return Err(e.into()),
        }
    }

    log::info!(
        "Imported {} vectors and {} playlists ({} lines skipped)",
        summary.vectors,
        summary.playlists.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

/// Import a JSON Lines file.
pub fn import_file(db: &Database, path: &Path) -> ImportResult<ImportSummary> {
    let file = File::open(path).map_err(|source| ImportError::Open {
        path: path.display().to_string(),
        source,
    })?;
    import_reader(db, BufReader::new(file))
}

enum Applied {
    Vector,
    Playlist(PlaylistId, String),
}

fn apply(db: &Database, record: ImportRecord) -> cadence_core::Result<Applied> {
    match record {
        ImportRecord::Features { track_id, features } => {
            let vector = FeatureVector::from_named(track_id, &features)?;
            db.upsert_feature_vector(&vector)?;
            Ok(Applied::Vector)
        }
        ImportRecord::Vector { track_id, values } => {
            db.upsert_feature_vector(&FeatureVector::new(track_id, values))?;
            Ok(Applied::Vector)
        }
        ImportRecord::Playlist { id, name, tracks } => {
            let id = id.unwrap_or_default();
            let tracks = tracks.into_iter().map(TrackId::from).collect();
            db.upsert_playlist(&Playlist::new(id, name.clone(), tracks))?;
            Ok(Applied::Playlist(id, name))
        }
    }
}

fn skip(summary: &mut ImportSummary, line: usize, reason: String) {
    log::warn!("Skipping line {}: {}", line, reason);
    summary.skipped.push(SkippedLine { line, reason });
}
