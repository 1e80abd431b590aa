use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use cadence_search::{ArtifactHandle, ArtifactStore, IndexBuilder};
use treadle::{SqliteStateStore, WorkItem, Workflow};

use crate::{Config, IndexStage, RebuildJob};

/// State files older than this belong to a cycle that never finished.
const STALE_STATE_AGE: Duration = Duration::from_secs(3600);

/// SQLite side files that live next to a state database.
const STATE_SUFFIXES: [&str; 4] = ["", "-wal", "-shm", "-journal"];

/// Index stage configured from `config`, publishing into `handle`.
#[must_use]
pub fn index_stage(config: &Config, handle: Arc<ArtifactHandle>) -> IndexStage {
    let artifacts =
        ArtifactStore::new(config.artifact_dir.clone()).with_retention(config.retain_generations);
    let builder = IndexBuilder::new(config.index.clone()).strict(config.strict_build);
    IndexStage::new(config.database_path.clone(), artifacts, builder, handle)
}

/// Build the index rebuild pipeline.
///
/// # Errors
/// Returns an error if the workflow cannot be built.
pub fn build_index_pipeline(
    config: &Config,
    handle: Arc<ArtifactHandle>,
) -> treadle::Result<Workflow> {
    Workflow::builder()
        .stage("index", index_stage(config, handle))
        .build()
}

/// Where treadle keeps pipeline state, next to the feature store.
#[must_use]
pub fn state_dir(config: &Config) -> PathBuf {
    config.database_path.with_file_name("pipeline")
}

/// Run `job` through `workflow` with a state store scoped to this cycle.
///
/// The store lives in its own file under `state_dir` and is removed when
/// the cycle ends, whether it succeeded or not, so finished cycles leave
/// no rows behind. Files left by cycles that died mid-run are swept once
/// they are an hour old.
///
/// # Errors
/// Returns an error if the state store cannot be opened or the workflow
/// fails.
pub async fn run_cycle(workflow: &Workflow, state_dir: &Path, job: &RebuildJob) -> Result<()> {
    std::fs::create_dir_all(state_dir).context("Failed to create state directory")?;
    prune_stale_state(state_dir, STALE_STATE_AGE);

    let path = state_dir.join(format!("{}.db", job.id()));
    let result = async {
        let mut store = SqliteStateStore::open(&path)
            .await
            .context("Failed to open pipeline state store")?;
        workflow.advance(job, &mut store).await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    remove_state(&path);
    result
}

fn remove_state(path: &Path) {
    for suffix in STATE_SUFFIXES {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        match std::fs::remove_file(&name) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", Path::new(&name).display(), e),
        }
    }
}

/// Remove state files whose last write is at least `max_age` old.
pub fn prune_stale_state(state_dir: &Path, max_age: Duration) {
    let entries = match std::fs::read_dir(state_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to read {}: {}", state_dir.display(), e);
            return;
        }
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age < max_age {
            continue;
        }
        let path = entry.path();
        log::info!("Removing stale pipeline state {}", path.display());
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}
