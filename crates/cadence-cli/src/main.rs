use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use cadence_etl::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/cadence/cadence.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for index generations (default: ~/.local/share/cadence/index)
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Import feature vectors and playlists from a JSON Lines file
    ///
    /// Each line is one record tagged by "kind":
    ///
    /// - features: {"kind": "features", "track_id": "...", "features": {"tempo": 120.0, ...}}
    /// - vector:   {"kind": "vector", "track_id": "...", "values": [...]}
    /// - playlist: {"kind": "playlist", "name": "...", "tracks": ["...", ...]}
    ///
    /// Vectors must match the pinned 60-field feature schema. Re-importing a
    /// track replaces its vector. Malformed lines are skipped and reported
    /// with their line number.
    Import {
        /// Path to the JSON Lines file
        path: PathBuf,
    },
    /// Build a new index generation from the feature store
    ///
    /// Reads every feature vector, skips malformed ones (unless --strict),
    /// builds the nearest-neighbor index and publishes it atomically. With
    /// no vectors the current generation is left untouched.
    Build {
        /// Abort on the first malformed vector
        #[arg(long)]
        strict: bool,
    },
    /// Rebuild the index on a fixed interval until interrupted
    Watch {
        /// Seconds between rebuilds (default: rebuild_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Recommend tracks for a playlist
    Recommend {
        /// Playlist id
        playlist: String,

        /// Maximum number of recommendations
        #[arg(long)]
        top_n: Option<usize>,

        /// Slots reserved for diversity voting
        #[arg(long)]
        diversity_k: Option<usize>,

        /// Neighbors each playlist track votes for
        #[arg(long)]
        neighbors: Option<usize>,

        /// Include relevance scores
        #[arg(long)]
        scores: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show store and index status
    Status,
    /// Inspect or edit configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print one value, or the whole config file
    Get { key: Option<String> },
    /// Set a value in the config file
    Set { key: String, value: String },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands must work even when the config itself is broken.
    if let Commands::Config { action } = cli.command {
        return match action {
            ConfigAction::Show => commands::config::show_config(),
            ConfigAction::Get { key } => commands::config::get_config(key),
            ConfigAction::Set { key, value } => commands::config::set_config(&key, &value),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Example => commands::config::show_example(),
            ConfigAction::Init => commands::config::init_config(),
        };
    }

    let config = Config::load_with_overrides(cli.db, cli.artifacts)?;

    twyg::setup(config.logging.clone())
        .map_err(|e| anyhow::anyhow!("Failed to set up logging: {e}"))?;

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    match cli.command {
        Commands::Import { path } => commands::run_import(&config, &path)?,
        Commands::Build { strict } => commands::run_build(config, strict).await?,
        Commands::Watch { interval } => commands::run_watch(config, interval).await?,
        Commands::Recommend {
            playlist,
            top_n,
            diversity_k,
            neighbors,
            scores,
            json,
        } => {
            let mut options = config.recommend.clone();
            options.top_n = top_n.unwrap_or(options.top_n);
            options.diversity_k = diversity_k.unwrap_or(options.diversity_k);
            options.neighbors_per_track = neighbors.unwrap_or(options.neighbors_per_track);
            options.with_scores |= scores;
            commands::run_recommend(&config, &playlist, &options, json)?;
        }
        Commands::Status => commands::show_status(&config)?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
