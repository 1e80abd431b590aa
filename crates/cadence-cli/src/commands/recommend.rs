use anyhow::{Context, Result};

use cadence_core::model::PlaylistId;
use cadence_core::schema::Database;
use cadence_etl::Config;
use cadence_search::{ArtifactStore, RecommendOptions, Recommender};

pub fn run_recommend(
    config: &Config,
    playlist: &str,
    options: &RecommendOptions,
    json: bool,
) -> Result<()> {
    let playlist_id: PlaylistId = playlist
        .parse()
        .with_context(|| format!("Invalid playlist id: {playlist}"))?;

    let db = Database::open(&config.database_path).context("Failed to open database")?;
    let artifacts = ArtifactStore::new(config.artifact_dir.clone());

    let recommender = match Recommender::open(&artifacts) {
        Ok(recommender) => recommender,
        Err(e) if e.is_unavailable() => {
            anyhow::bail!("{e}\n\nRun `cadence build` to create an index.");
        }
        Err(e) => return Err(e.into()),
    };

    let recommendations = match recommender.recommend_for_playlist(&db, &playlist_id, options) {
        Ok(recommendations) => recommendations,
        Err(e) if e.is_schema_mismatch() => {
            anyhow::bail!("{e}\n\nThe index is out of date; run `cadence build`.");
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
        return Ok(());
    }

    if recommendations.is_empty() {
        println!("No recommendations for playlist {playlist_id}");
        return Ok(());
    }

    println!("\n🎵 Recommendations for {playlist_id}\n");
    for (rank, rec) in recommendations.iter().enumerate() {
        match rec.score {
            Some(score) => println!(
                "  {:>3}. {:<40} {:>6.2}  {:?}",
                rank + 1,
                rec.track_id,
                score,
                rec.stage
            ),
            None => println!("  {:>3}. {:<40} {:?}", rank + 1, rec.track_id, rec.stage),
        }
    }

    Ok(())
}
