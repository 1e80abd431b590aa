use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{FeatureVector, Playlist, PlaylistId, TrackId, SCHEMA_VERSION};
use crate::store::FeatureStore;

use super::migrations::MIGRATIONS;

/// A SQLite-backed feature store.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }
}

// Feature vectors
impl Database {
    /// Insert or replace the active feature vector of a track.
    ///
    /// The vector must match the pinned schema; nothing is reshaped.
    pub fn upsert_feature_vector(&self, vector: &FeatureVector) -> Result<()> {
        vector.validate_schema()?;

        self.conn.execute(
            "INSERT INTO track_features (track_id, schema_version, vector, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(track_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                vector = excluded.vector,
                updated_at = excluded.updated_at",
            rusqlite::params![
                vector.track_id.as_str(),
                SCHEMA_VERSION,
                serde_json::to_string(&vector.values)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Number of tracks with an active feature vector.
    pub fn count_feature_vectors(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM track_features", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| Error::InvalidData(format!("negative count {count}")))
    }

    /// Delete the feature vector of a track, if any.
    pub fn delete_feature_vector(&self, track_id: &TrackId) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM track_features WHERE track_id = ?1",
            [track_id.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn rows_to_vectors(rows: Vec<(String, String)>) -> Result<Vec<FeatureVector>> {
        rows.into_iter()
            .map(|(track_id, json)| {
                let values: Vec<f32> = serde_json::from_str(&json)?;
                Ok(FeatureVector::new(track_id, values))
            })
            .collect()
    }
}

// Playlists
impl Database {
    /// Insert a playlist or replace its name and track list.
    pub fn upsert_playlist(&self, playlist: &Playlist) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let id = playlist.id.to_string();

        tx.execute(
            "INSERT INTO playlists (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            rusqlite::params![id, playlist.name, playlist.created_at.to_rfc3339()],
        )?;
        tx.execute("DELETE FROM playlist_tracks WHERE playlist_id = ?1", [&id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO playlist_tracks (playlist_id, track_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, track_id) in playlist.tracks.iter().enumerate() {
                stmt.execute(rusqlite::params![id, track_id.as_str(), position as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a playlist with its ordered tracks.
    pub fn get_playlist(&self, playlist_id: &PlaylistId) -> Result<Option<Playlist>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, created_at FROM playlists WHERE id = ?1",
                [playlist_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((name, created_at)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT track_id FROM playlist_tracks WHERE playlist_id = ?1 ORDER BY position",
        )?;
        let tracks = stmt
            .query_map([playlist_id.to_string()], |row| row.get::<_, String>(0))?
            .map(|r| r.map(TrackId::from))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Playlist {
            id: *playlist_id,
            name,
            tracks,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    /// List every playlist id with its name, ordered by creation time.
    pub fn list_playlists(&self) -> Result<Vec<(PlaylistId, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM playlists ORDER BY created_at, id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, name)| {
                let id = id
                    .parse::<PlaylistId>()
                    .map_err(|e| Error::InvalidData(format!("playlist id {id}: {e}")))?;
                Ok((id, name))
            })
            .collect()
    }

    fn playlist_exists(&self, playlist_id: &PlaylistId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM playlists WHERE id = ?1",
                [playlist_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl FeatureStore for Database {
    fn all_feature_vectors(&self) -> Result<Vec<FeatureVector>> {
        let mut stmt = self
            .conn
            .prepare("SELECT track_id, vector FROM track_features ORDER BY track_id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Self::rows_to_vectors(rows)
    }

    fn playlist_feature_vectors(&self, playlist_id: &PlaylistId) -> Result<Vec<FeatureVector>> {
        if !self.playlist_exists(playlist_id)? {
            return Err(Error::NotFound {
                entity: "playlist",
                id: playlist_id.to_string(),
            });
        }

        // A track listed twice contributes once.
        let mut stmt = self.conn.prepare(
            "SELECT tf.track_id, tf.vector
             FROM playlist_tracks pt
             JOIN track_features tf ON tf.track_id = pt.track_id
             WHERE pt.playlist_id = ?1
             GROUP BY tf.track_id
             ORDER BY MIN(pt.position)",
        )?;
        let rows = stmt
            .query_map([playlist_id.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Self::rows_to_vectors(rows)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(Into::into)
        .map_err(|e| Error::InvalidData(format!("timestamp {value}: {e}")))
}
