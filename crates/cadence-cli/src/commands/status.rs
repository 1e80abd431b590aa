use anyhow::{Context, Result};

use cadence_core::schema::Database;
use cadence_etl::Config;
use cadence_search::ArtifactStore;

pub fn show_status(config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path).context("Failed to open database")?;

    let vectors = db.count_feature_vectors()?;
    let playlists = db.list_playlists()?;

    println!("\n📊 Cadence Status\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Feature vectors: {vectors}");
    println!("  Playlists: {}", playlists.len());
    for (id, name) in &playlists {
        println!("    {id}  {name}");
    }

    let artifacts = ArtifactStore::new(config.artifact_dir.clone());
    println!("\n  Artifacts: {}", artifacts.root().display());

    let Some(current) = artifacts.current()? else {
        println!("  Current generation: none");
        println!("\n  Run `cadence build` to create an index");
        return Ok(());
    };

    match artifacts.load_generation(&current) {
        Ok(snapshot) => {
            let manifest = snapshot.manifest();
            println!("  Current generation: {}", manifest.generation_id);
            println!("    Created:     {}", manifest.created_at.to_rfc3339());
            println!("    Backend:     {}", manifest.params.backend);
            println!("    Vectors:     {}", manifest.count);
            println!("    Quarantined: {}", manifest.quarantined);
            if manifest.count + manifest.quarantined != vectors {
                println!("\n  ⚠ The store has changed since this build; run `cadence build`");
            }
        }
        Err(e) => println!("  Current generation: {current} (unreadable: {e})"),
    }

    let generations = artifacts.list_generations()?;
    println!("\n  Retained generations: {}", generations.len());
    for name in &generations {
        let marker = if *name == current { "*" } else { " " };
        println!("   {marker} {name}");
    }

    Ok(())
}
