use anyhow::{Context, Result};
use cadence_search::{IndexParams, RecommendOptions};
use confyg::{env, Confygery};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for cadence.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (CADENCE_* prefix)
/// 3. Config file (~/.config/cadence/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the SQLite feature store.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: CADENCE_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/cadence/cadence.db
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    /// Directory holding published index generations.
    ///
    /// Can be set via:
    /// - CLI: --artifacts /path/to/dir
    /// - ENV: CADENCE_ARTIFACT_DIR
    /// - Default: ~/.local/share/cadence/index
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Seconds between scheduled rebuilds.
    #[serde(default = "default_rebuild_interval_secs")]
    pub rebuild_interval_secs: u64,

    /// Abort a build on the first malformed vector instead of skipping it.
    #[serde(default)]
    pub strict_build: bool,

    /// Published generations kept on disk.
    #[serde(default = "default_retain_generations")]
    pub retain_generations: usize,

    /// Index construction parameters.
    #[serde(default)]
    pub index: IndexParams,

    /// Default recommendation options.
    #[serde(default)]
    pub recommend: RecommendOptions,

    /// Logging setup for the binary.
    #[serde(default)]
    pub logging: twyg::Opts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            artifact_dir: default_artifact_dir(),
            rebuild_interval_secs: default_rebuild_interval_secs(),
            strict_build: false,
            retain_generations: default_retain_generations(),
            index: IndexParams::default(),
            recommend: RecommendOptions::default(),
            logging: twyg::Opts::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/cadence/config.toml
    /// Reads environment variables with CADENCE_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("cadence");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration, then apply CLI overrides.
    pub fn load_with_overrides(
        db_path: Option<PathBuf>,
        artifact_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let mut config = Self::load()?;
        if let Some(db_path) = db_path {
            config.database_path = db_path;
        }
        if let Some(artifact_dir) = artifact_dir {
            config.artifact_dir = artifact_dir;
        }
        Ok(config)
    }

    /// Reject settings no component could work with.
    pub fn validate(&self) -> Result<()> {
        if self.rebuild_interval_secs == 0 {
            anyhow::bail!("rebuild_interval_secs must be positive");
        }
        self.index
            .validate()
            .context("Invalid [index] configuration")?;
        self.recommend
            .validate()
            .context("Invalid [recommend] configuration")?;
        Ok(())
    }

    #[must_use]
    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.rebuild_interval_secs)
    }
}

/// Get the default database path.
///
/// Returns: ~/.local/share/cadence/cadence.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    data_dir().join("cadence.db")
}

fn default_artifact_dir() -> PathBuf {
    data_dir().join("index")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
}

const fn default_rebuild_interval_secs() -> u64 {
    300
}

const fn default_retain_generations() -> usize {
    3
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/cadence/config.toml
/// - macOS: ~/Library/Application Support/cadence/config.toml
/// - Windows: %APPDATA%\cadence\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Cadence Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (CADENCE_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Path to the SQLite feature store
#
# Can also be set via:
# - CLI: cadence --db /custom/path.db build
# - Environment: CADENCE_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/cadence.db"

# Directory for published index generations
#
# Each rebuild writes a new generation here and switches CURRENT to it.
#artifact_dir = "/path/to/index"

# Seconds between scheduled rebuilds in `cadence watch`
rebuild_interval_secs = 300

# Abort a build on the first malformed vector instead of skipping it
strict_build = false

# Published generations kept on disk (the live one is always kept)
retain_generations = 3

[index]
# "hnsw" (approximate graph) or "flat" (exact scan)
backend = "hnsw"
m = 16
ef_construction = 200
ef_search = 100
max_layer = 16

[recommend]
top_n = 10
diversity_k = 2
neighbors_per_track = 5
with_scores = false
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
