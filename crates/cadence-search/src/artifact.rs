//! Published index generations on disk.
//!
//! ```text
//! <root>/CURRENT                       name of the live generation
//! <root>/generations/<millis>-<uuid>/
//!     index.bin                        ANN blob
//!     id_lookup.json                   dense id -> track id
//!     manifest.toml                    build metadata
//! ```
//!
//! A generation is written into a staging directory and renamed into place
//! before `CURRENT` is switched, so a reader following `CURRENT` never sees
//! a partial pair. Generations are never modified after publish.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use cadence_core::model::GenerationId;
use cadence_core::SCHEMA_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ann::{open_index, AnnIndex, IndexParams};
use crate::error::{SearchError, SearchResult};
use crate::lookup::IdLookup;

pub const CURRENT_FILE: &str = "CURRENT";
pub const GENERATIONS_DIR: &str = "generations";
pub const INDEX_FILE: &str = "index.bin";
pub const LOOKUP_FILE: &str = "id_lookup.json";
pub const MANIFEST_FILE: &str = "manifest.toml";

const STAGING_PREFIX: &str = ".staging-";
const DEFAULT_RETAIN: usize = 3;
const DEFAULT_STAGING_GRACE: Duration = Duration::from_secs(3600);

/// Build metadata stored next to each index blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generation_id: GenerationId,
    pub created_at: DateTime<Utc>,
    pub schema_version: u32,
    pub dimension: usize,
    pub count: usize,
    /// Vectors skipped as malformed during the build.
    pub quarantined: usize,
    pub params: IndexParams,
}

impl Manifest {
    #[must_use]
    pub fn new(dimension: usize, count: usize, quarantined: usize, params: IndexParams) -> Self {
        Self {
            generation_id: GenerationId::new(),
            created_at: Utc::now(),
            schema_version: SCHEMA_VERSION,
            dimension,
            count,
            quarantined,
            params,
        }
    }

    /// Directory name; sorts chronologically.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!(
            "{:013}-{}",
            self.created_at.timestamp_millis().max(0),
            self.generation_id
        )
    }
}

/// A loaded generation: immutable, shared by every reader holding it.
#[derive(Debug)]
pub struct IndexSnapshot {
    manifest: Manifest,
    index: Box<dyn AnnIndex>,
    lookup: IdLookup,
}

impl IndexSnapshot {
    /// Pair an index with its lookup. Counts must agree.
    pub fn new(manifest: Manifest, index: Box<dyn AnnIndex>, lookup: IdLookup) -> SearchResult<Self> {
        if index.len() != lookup.len() || index.len() != manifest.count {
            return Err(SearchError::InvalidParameter(format!(
                "index has {} elements, lookup {}, manifest {}",
                index.len(),
                lookup.len(),
                manifest.count
            )));
        }
        if index.dimension() != manifest.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: manifest.dimension,
                found: index.dimension(),
            });
        }
        Ok(Self {
            manifest,
            index,
            lookup,
        })
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn generation_id(&self) -> GenerationId {
        self.manifest.generation_id
    }

    #[must_use]
    pub fn index(&self) -> &dyn AnnIndex {
        self.index.as_ref()
    }

    #[must_use]
    pub fn lookup(&self) -> &IdLookup {
        &self.lookup
    }
}

/// Root directory holding published generations.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    retain: usize,
    staging_grace: Duration,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retain: DEFAULT_RETAIN,
            staging_grace: DEFAULT_STAGING_GRACE,
        }
    }

    /// Keep at most `retain` generations (at least one).
    #[must_use]
    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    /// Minimum age before an unfinished staging directory counts as
    /// abandoned. Younger ones may belong to a publish in another process.
    #[must_use]
    pub fn with_staging_grace(mut self, grace: Duration) -> Self {
        self.staging_grace = grace;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    /// Write a snapshot as a new generation and make it current.
    ///
    /// Returns the generation directory.
    pub fn publish(&self, snapshot: &IndexSnapshot) -> SearchResult<PathBuf> {
        let generations = self.generations_dir();
        fs::create_dir_all(&generations)?;

        let staging = generations.join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()));
        fs::create_dir(&staging)?;
        if let Err(e) = write_generation(&staging, snapshot) {
            log::warn!("Discarding staging directory {}: {}", staging.display(), e);
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                log::warn!("Failed to remove {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        let name = snapshot.manifest().dir_name();
        let target = generations.join(&name);
        fs::rename(&staging, &target)?;
        sync_dir(&generations)?;

        // Per-publish temp name: two processes may publish at once.
        let tmp = self
            .root
            .join(format!("{CURRENT_FILE}.{}.tmp", uuid::Uuid::new_v4().simple()));
        write_synced(&tmp, format!("{name}\n").as_bytes())?;
        fs::rename(&tmp, self.root.join(CURRENT_FILE))?;
        sync_dir(&self.root)?;

        log::info!(
            "Published generation {} ({} vectors, {} dimensions)",
            name,
            snapshot.manifest().count,
            snapshot.manifest().dimension
        );

        match self.collect_garbage() {
            Ok(0) => {}
            Ok(n) => log::debug!("Removed {} old generation(s)", n),
            Err(e) => log::warn!("Generation cleanup failed: {}", e),
        }

        Ok(target)
    }

    /// Name of the live generation, if any has been published.
    pub fn current(&self) -> SearchResult<Option<String>> {
        match fs::read_to_string(self.root.join(CURRENT_FILE)) {
            Ok(content) => {
                let name = content.trim();
                if name.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(name.to_string()))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the live generation.
    pub fn load_current(&self) -> SearchResult<IndexSnapshot> {
        let name = self.current()?.ok_or_else(|| {
            SearchError::Unavailable(format!(
                "no index generation published under {}",
                self.root.display()
            ))
        })?;
        self.load_generation(&name)
    }

    /// Load the live generation only if it differs from `known`.
    pub fn load_if_changed(&self, known: Option<&str>) -> SearchResult<Option<IndexSnapshot>> {
        match self.current()? {
            Some(name) if Some(name.as_str()) != known => self.load_generation(&name).map(Some),
            _ => Ok(None),
        }
    }

    /// Load a generation by directory name, cross-checking its parts.
    pub fn load_generation(&self, name: &str) -> SearchResult<IndexSnapshot> {
        let dir = self.generations_dir().join(name);
        if !dir.is_dir() {
            return Err(SearchError::Unavailable(format!(
                "generation {name} is missing"
            )));
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&manifest_path).map_err(|e| missing(e, &manifest_path))?;
        let manifest: Manifest = toml::from_str(&text)
            .map_err(|e| SearchError::corrupted(&manifest_path, e.to_string()))?;
        if manifest.schema_version != SCHEMA_VERSION {
            return Err(SearchError::Unavailable(format!(
                "generation {name} uses feature schema v{}, expected v{SCHEMA_VERSION}",
                manifest.schema_version
            )));
        }

        let lookup_path = dir.join(LOOKUP_FILE);
        let lookup = IdLookup::load(&lookup_path).map_err(|e| missing_search(e, &lookup_path))?;

        let index_path = dir.join(INDEX_FILE);
        let index = open_index(manifest.params.backend, &index_path)
            .map_err(|e| missing_search(e, &index_path))?;

        if index.len() != manifest.count
            || lookup.len() != manifest.count
            || index.dimension() != manifest.dimension
        {
            return Err(SearchError::corrupted(
                &dir,
                format!(
                    "manifest says {} x {}, index has {} x {}, lookup has {}",
                    manifest.count,
                    manifest.dimension,
                    index.len(),
                    index.dimension(),
                    lookup.len()
                ),
            ));
        }

        log::debug!("Loaded generation {} from {}", name, dir.display());
        Ok(IndexSnapshot {
            manifest,
            index,
            lookup,
        })
    }

    /// Published generation names, oldest first.
    pub fn list_generations(&self) -> SearchResult<Vec<String>> {
        let dir = self.generations_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove generations beyond the retention count, plus staging
    /// directories older than the staging grace period. The live generation
    /// is always kept.
    pub fn collect_garbage(&self) -> SearchResult<usize> {
        let live = self.current()?;
        let names = self.list_generations()?;
        let excess = names.len().saturating_sub(self.retain);

        let mut removed = 0;
        for name in names.iter().take(excess) {
            if live.as_deref() == Some(name.as_str()) {
                continue;
            }
            match fs::remove_dir_all(self.generations_dir().join(name)) {
                Ok(()) => removed += 1,
                // Another process collected it first.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let now = SystemTime::now();
        for entry in fs::read_dir(self.generations_dir())? {
            let entry = entry?;
            let staging = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if !staging {
                continue;
            }
            let age = entry
                .metadata()?
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            if age < self.staging_grace {
                log::debug!("Leaving {} alone; it may still be in use", entry.path().display());
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => log::debug!("Removed abandoned {}", entry.path().display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }
}

fn write_generation(dir: &Path, snapshot: &IndexSnapshot) -> SearchResult<()> {
    snapshot.index().save(&dir.join(INDEX_FILE))?;
    snapshot.lookup().save(&dir.join(LOOKUP_FILE))?;
    let manifest = toml::to_string_pretty(snapshot.manifest())
        .map_err(|e| SearchError::Manifest(e.to_string()))?;
    write_synced(&dir.join(MANIFEST_FILE), manifest.as_bytes())?;
    sync_dir(dir)?;
    Ok(())
}

pub(crate) fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    fs::File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn missing(err: io::Error, path: &Path) -> SearchError {
    if err.kind() == io::ErrorKind::NotFound {
        SearchError::Unavailable(format!("{} is missing", path.display()))
    } else {
        err.into()
    }
}

fn missing_search(err: SearchError, path: &Path) -> SearchError {
    match err {
        SearchError::Io(e) => missing(e, path),
        other => other,
    }
}
