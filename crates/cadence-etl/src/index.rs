//! Index stage: rebuild the ANN index from the feature store.
//!
//! Reads every feature vector, builds a new generation, publishes it to
//! the artifact directory, and swaps it into the shared handle so
//! in-process readers see it on their next request.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use treadle::{Stage, StageContext, StageOutcome};

use cadence_core::schema::Database;
use cadence_search::{ArtifactHandle, ArtifactStore, BuildOutcome, IndexBuilder, SearchResult};

/// What one rebuild did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildSummary {
    /// Directory name of the published generation; `None` when skipped.
    pub generation: Option<String>,
    pub read: usize,
    pub indexed: usize,
    pub quarantined: usize,
    pub duplicates: usize,
    pub elapsed_ms: u128,
    /// Another rebuild held the handle, so this one did nothing.
    pub overlapped: bool,
}

/// The Index stage: build and publish one generation.
#[derive(Debug, Clone)]
pub struct IndexStage {
    db_path: PathBuf,
    artifacts: ArtifactStore,
    builder: IndexBuilder,
    handle: Arc<ArtifactHandle>,
}

impl IndexStage {
    #[must_use]
    pub fn new(
        db_path: PathBuf,
        artifacts: ArtifactStore,
        builder: IndexBuilder,
        handle: Arc<ArtifactHandle>,
    ) -> Self {
        Self {
            db_path,
            artifacts,
            builder,
            handle,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<ArtifactHandle> {
        &self.handle
    }

    /// Run one rebuild synchronously.
    ///
    /// A corpus with nothing indexable leaves the live generation alone.
    pub fn run_build(&self) -> SearchResult<RebuildSummary> {
        let Some(_guard) = self.handle.begin_build() else {
            log::warn!("A rebuild is already running; skipping this cycle");
            return Ok(RebuildSummary {
                overlapped: true,
                ..RebuildSummary::default()
            });
        };

        let db = Database::open(&self.db_path)?;
        let outcome = self.builder.build(&db)?;
        let report = outcome.report().clone();
        let mut summary = RebuildSummary {
            read: report.read,
            indexed: report.indexed,
            quarantined: report.quarantined.len(),
            duplicates: report.duplicates,
            elapsed_ms: report.elapsed.as_millis(),
            ..RebuildSummary::default()
        };

        if let BuildOutcome::Built { snapshot, .. } = outcome {
            self.artifacts.publish(&snapshot)?;
            summary.generation = Some(snapshot.manifest().dir_name());
            self.handle.publish(snapshot);
        }

        Ok(summary)
    }
}

#[async_trait::async_trait]
impl Stage for IndexStage {
    fn name(&self) -> &str {
        "index"
    }

    async fn execute(
        &self,
        item: &dyn treadle::WorkItem,
        ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        log::info!("Rebuilding index for {}", item.id());

        let stage = self.clone();
        let summary = tokio::task::spawn_blocking(move || stage.run_build())
            .await
            .map_err(|e| {
                treadle::TreadleError::StageExecution(format!("Index rebuild task failed: {e}"))
            })?
            .map_err(|e| {
                log::error!("Index rebuild failed: {}", e);
                treadle::TreadleError::StageExecution(format!("Index rebuild failed: {e}"))
            })?;

        match &summary.generation {
            Some(generation) => log::info!(
                "Index rebuild complete: generation {} with {} vectors ({} quarantined)",
                generation,
                summary.indexed,
                summary.quarantined
            ),
            None => log::info!("Index rebuild skipped; live generation unchanged"),
        }

        let summary_json = serde_json::to_value(&summary).map_err(|e| {
            treadle::TreadleError::StageExecution(format!("Failed to serialize summary: {e}"))
        })?;
        ctx.metadata.insert("rebuild".to_string(), summary_json);

        Ok(StageOutcome::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::FeatureVector;
    use cadence_search::GenerationState;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn stage(dir: &TempDir) -> IndexStage {
        IndexStage::new(
            dir.path().join("cadence.db"),
            ArtifactStore::new(dir.path().join("index")),
            IndexBuilder::default(),
            Arc::new(ArtifactHandle::new()),
        )
    }

    fn seed(dir: &TempDir, n: usize) {
        let db = Database::open(dir.path().join("cadence.db")).unwrap();
        for i in 0..n {
            let values = (0..cadence_core::FEATURE_DIMENSION)
                .map(|d| ((i * 7 + d) % 11) as f32 + 0.5)
                .collect();
            db.upsert_feature_vector(&FeatureVector::new(format!("t{i}"), values))
                .unwrap();
        }
    }

    #[test]
    fn test_run_build_empty_store() {
        let dir = TempDir::new().unwrap();
        let stage = stage(&dir);
        let summary = stage.run_build().unwrap();
        assert!(summary.generation.is_none());
        assert_eq!(stage.handle().state(), GenerationState::Absent);
    }

    #[test]
    fn test_run_build_publishes_and_swaps() {
        let dir = TempDir::new().unwrap();
        seed(&dir, 12);
        let stage = stage(&dir);

        let summary = stage.run_build().unwrap();
        assert_eq!(summary.indexed, 12);
        let generation = summary.generation.unwrap();

        let store = ArtifactStore::new(dir.path().join("index"));
        assert_eq!(store.current().unwrap(), Some(generation));
        assert!(matches!(stage.handle().state(), GenerationState::Ready(_)));
    }

    #[test]
    fn test_overlapping_build_is_skipped() {
        let dir = TempDir::new().unwrap();
        seed(&dir, 3);
        let stage = stage(&dir);
        let _guard = stage.handle().begin_build().unwrap();

        let summary = stage.run_build().unwrap();
        assert!(summary.overlapped);
        assert!(summary.generation.is_none());
    }

    #[tokio::test]
    async fn test_execute_records_summary() {
        let dir = TempDir::new().unwrap();
        seed(&dir, 4);
        let stage = stage(&dir);
        let job = crate::RebuildJob::new("test");
        let mut ctx = StageContext::new("index".to_string());

        let outcome = stage.execute(&job, &mut ctx).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Complete));
        let summary = ctx.metadata.get("rebuild").unwrap();
        assert_eq!(summary["indexed"], 4);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_execute_leaves_runtime_responsive() {
        let dir = TempDir::new().unwrap();
        seed(&dir, 40);
        let stage = stage(&dir);
        let handle = Arc::clone(stage.handle());
        let job = crate::RebuildJob::new("test");

        // On a single-threaded runtime the spawned task can only start
        // while execute is suspended on work running elsewhere.
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let bystander = tokio::spawn(async move {
            flag.store(true, Ordering::SeqCst);
        });
        let mut ctx = StageContext::new("index".to_string());
        let outcome = stage.execute(&job, &mut ctx).await.unwrap();

        assert!(started.load(Ordering::SeqCst));
        assert!(matches!(outcome, StageOutcome::Complete));
        assert!(matches!(handle.state(), GenerationState::Ready(_)));
        bystander.await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_failure_is_stage_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("cadence.db")).unwrap();
        let stage = stage(&dir);
        let job = crate::RebuildJob::new("test");
        let mut ctx = StageContext::new("index".to_string());

        let err = stage.execute(&job, &mut ctx).await.unwrap_err();
        assert!(matches!(err, treadle::TreadleError::StageExecution(_)));
        assert!(ctx.metadata.get("rebuild").is_none());
    }
}
