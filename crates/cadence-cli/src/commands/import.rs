use anyhow::{Context, Result};
use std::path::Path;

use cadence_core::schema::Database;
use cadence_etl::{import_file, Config};

pub fn run_import(config: &Config, path: &Path) -> Result<()> {
    log::info!("Importing {}", path.display());

    let db = Database::open(&config.database_path).context("Failed to open database")?;
    let summary = import_file(&db, path)?;

    println!("\n✓ Imported {} feature vectors", summary.vectors);

    if !summary.playlists.is_empty() {
        println!("\n  Playlists:");
        for (id, name) in &summary.playlists {
            println!("    {id}  {name}");
        }
    }

    if !summary.skipped.is_empty() {
        println!("\n  ⚠ Skipped {} lines:", summary.skipped.len());
        for skipped in &summary.skipped {
            println!("    line {}: {}", skipped.line, skipped.reason);
        }
    }

    println!("\n  Run `cadence build` to index the new vectors");
    Ok(())
}
