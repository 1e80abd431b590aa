use anyhow::{Context, Result};
use cadence_etl::{config, Config};
use toml_edit::{DocumentMut, Item, Value};

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "artifact_dir",
    "rebuild_interval_secs",
    "strict_build",
    "retain_generations",
    "index.backend",
    "index.m",
    "index.ef_construction",
    "index.ef_search",
    "index.max_layer",
    "recommend.top_n",
    "recommend.diversity_k",
    "recommend.neighbors_per_track",
    "recommend.with_scores",
    "logging.level",
    "logging.coloured",
    "logging.output",
];

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  database_path: {}", config.database_path.display());
    println!("  artifact_dir: {}", config.artifact_dir.display());
    println!("  rebuild_interval_secs: {}", config.rebuild_interval_secs);
    println!("  strict_build: {}", config.strict_build);
    println!("  retain_generations: {}", config.retain_generations);
    println!("  index.backend: {}", config.index.backend);
    println!("  index.m: {}", config.index.m);
    println!("  index.ef_construction: {}", config.index.ef_construction);
    println!("  index.ef_search: {}", config.index.ef_search);
    println!("  index.max_layer: {}", config.index.max_layer);
    println!("  recommend.top_n: {}", config.recommend.top_n);
    println!("  recommend.diversity_k: {}", config.recommend.diversity_k);
    println!("  recommend.neighbors_per_track: {}", config.recommend.neighbors_per_track);
    println!("  recommend.with_scores: {}", config.recommend.with_scores);
    println!("  logging.level: {:?}", config.logging.level());
    println!("  logging.coloured: {}", config.logging.coloured());
    println!("  logging.output: {:?}", config.logging.output());

    println!("\nPriority: CLI args > ENV vars (CADENCE_*) > Config file > Defaults");

    Ok(())
}

/// Get a specific config value.
pub fn get_config(key: Option<String>) -> Result<()> {
    let Some(key) = key else {
        // No key provided, show entire config file contents
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{}", contents);
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'cadence config init' to create it.");
        }
        return Ok(());
    };

    let config = Config::load()?;
    let value = match key.as_str() {
        "database_path" => config.database_path.display().to_string(),
        "artifact_dir" => config.artifact_dir.display().to_string(),
        "rebuild_interval_secs" => config.rebuild_interval_secs.to_string(),
        "strict_build" => config.strict_build.to_string(),
        "retain_generations" => config.retain_generations.to_string(),
        "index.backend" => config.index.backend.to_string(),
        "index.m" => config.index.m.to_string(),
        "index.ef_construction" => config.index.ef_construction.to_string(),
        "index.ef_search" => config.index.ef_search.to_string(),
        "index.max_layer" => config.index.max_layer.to_string(),
        "recommend.top_n" => config.recommend.top_n.to_string(),
        "recommend.diversity_k" => config.recommend.diversity_k.to_string(),
        "recommend.neighbors_per_track" => config.recommend.neighbors_per_track.to_string(),
        "recommend.with_scores" => config.recommend.with_scores.to_string(),
        "logging.level" => format!("{:?}", config.logging.level()),
        "logging.coloured" => config.logging.coloured().to_string(),
        "logging.output" => format!("{:?}", config.logging.output()),
        _ => anyhow::bail!(
            "Unknown config key: {}\n\nValid keys: {}",
            key,
            KNOWN_KEYS.join(", ")
        ),
    };
    println!("{value}");

    Ok(())
}

/// Set a config value.
///
/// Dotted keys address tables (`index.ef_search`). Comments and layout of
/// the rest of the file are preserved.
pub fn set_config(key: &str, value: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        anyhow::bail!(
            "Unknown config key: {}\n\nValid keys: {}",
            key,
            KNOWN_KEYS.join(", ")
        );
    }

    let config_path = config::config_file_path();
    config::ensure_config_file()?;

    let original = std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    let mut doc: DocumentMut = original
        .parse()
        .context("Config file is not valid TOML")?;

    set_dotted(&mut doc, key, parse_value(value))?;

    std::fs::write(&config_path, doc.to_string()).context("Failed to write config file")?;

    // Keep the old file if the new value makes the config unloadable.
    if let Err(e) = Config::load() {
        std::fs::write(&config_path, original).context("Failed to restore config file")?;
        return Err(e.context(format!("Rejected {key} = {value}")));
    }

    println!("✓ Updated {} = {}", key, value);
    println!("  in {}", config_path.display());

    Ok(())
}

/// Numbers and booleans keep their type; anything else is a string.
fn parse_value(raw: &str) -> Value {
    match raw.parse::<Value>() {
        Ok(value) if !value.is_str() || raw.trim_start().starts_with('"') => value,
        _ => Value::from(raw),
    }
}

fn set_dotted(doc: &mut DocumentMut, key: &str, value: Value) -> Result<()> {
    let mut parts: Vec<&str> = key.split('.').collect();
    let Some(last) = parts.pop() else {
        anyhow::bail!("Empty config key");
    };

    let mut table = doc.as_table_mut();
    for part in parts {
        table = table
            .entry(part)
            .or_insert(toml_edit::table())
            .as_table_mut()
            .with_context(|| format!("{part} is not a table"))?;
    }
    table.insert(last, Item::Value(value));
    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure cadence.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
