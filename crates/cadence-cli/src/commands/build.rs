use anyhow::Result;
use std::sync::Arc;

use cadence_etl::pipeline::{build_index_pipeline, run_cycle, state_dir};
use cadence_etl::{Config, RebuildJob};
use cadence_search::ArtifactHandle;

pub async fn run_build(mut config: Config, strict: bool) -> Result<()> {
    config.strict_build |= strict;
    log::info!(
        "Building index from {} into {}",
        config.database_path.display(),
        config.artifact_dir.display()
    );

    let handle = Arc::new(ArtifactHandle::new());
    let workflow = build_index_pipeline(&config, Arc::clone(&handle))?;

    let job = RebuildJob::new("cli");

    let mut events = workflow.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                treadle::WorkflowEvent::StageStarted { stage, .. } => {
                    println!("  ⏳ [{stage}] Starting...");
                }
                treadle::WorkflowEvent::StageCompleted { stage, .. } => {
                    println!("  ✓ [{stage}] Complete");
                }
                treadle::WorkflowEvent::StageFailed { stage, error, .. } => {
                    eprintln!("  ✗ [{stage}] FAILED: {error}");
                }
                _ => {}
            }
        }
    });

    run_cycle(&workflow, &state_dir(&config), &job).await?;

    match handle.current() {
        Some(snapshot) => {
            let manifest = snapshot.manifest();
            println!("\n✓ Published generation {}", manifest.generation_id);
            println!("  Indexed:     {}", manifest.count);
            println!("  Quarantined: {}", manifest.quarantined);
            println!("  Backend:     {}", manifest.params.backend);
        }
        None => {
            println!("\n⚠ Nothing published; the current generation is unchanged");
            println!("  Run `cadence import <file>` to add feature vectors");
        }
    }

    Ok(())
}
