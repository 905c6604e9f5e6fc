use super::models::Config;
use config::{Environment, File, FileFormat};
use std::env;
use std::io;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "REENCODER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "reencoder.toml";
const ENV_PREFIX: &str = "REENCODER";
const ENV_SEPARATOR: &str = "__";

/// Config file location: explicit path, then `REENCODER_CONFIG`, then
/// `reencoder.toml` in the working directory
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file, written from defaults first if it does not exist
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(config_path: &Path) -> Result<Config, super::ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    if !config_path.exists() {
        tracing::info!(
            "Configuration file not found at {}, writing defaults",
            config_path.display()
        );
        write_defaults(config_path)?;
    }

    Ok(load_from_sources(config_path)?)
}

/// Writes the default configuration to `path`, refusing to replace an
/// existing file.
pub fn write_defaults(path: &Path) -> Result<(), super::ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(&Config::default())?;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    io::Write::write_all(&mut file, text.as_bytes())?;
    Ok(())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: &Path) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        );
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // REENCODER__SERVER__LISTEN_PORT -> server.listen_port
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
