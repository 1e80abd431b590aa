use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use cadence_etl::pipeline::{build_index_pipeline, state_dir};
use cadence_etl::{Config, RebuildScheduler};
use cadence_search::ArtifactHandle;
use tokio::sync::watch;

pub async fn run_watch(config: Config, interval: Option<u64>) -> Result<()> {
    let interval = match interval {
        Some(0) => anyhow::bail!("--interval must be positive"),
        Some(secs) => Duration::from_secs(secs),
        None => config.rebuild_interval(),
    };

    let handle = Arc::new(ArtifactHandle::new());
    let workflow = build_index_pipeline(&config, handle)?;
    let scheduler = RebuildScheduler::new(workflow, state_dir(&config), interval);

    let (stop, stopped) = watch::channel(false);
    let runner = tokio::spawn(scheduler.run(stopped));

    println!("Rebuilding every {}s; press Ctrl-C to stop", interval.as_secs());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    log::info!("Interrupted, waiting for the current cycle");
    stop.send(true).ok();
    runner.await.context("Rebuild scheduler panicked")??;

    println!("\n✓ Stopped");
    Ok(())
}
