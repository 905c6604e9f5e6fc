//! Configuration management for the re-encoding gateway
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file, created from the defaults on first run
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use reencoder::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Listening on: {}", config.server.bind_addr());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `REENCODER__<section>__<key>`
//!
//! Examples:
//! - `REENCODER__SERVER__LISTEN_PORT=9300`
//! - `REENCODER__SERVER__MAX_BODY_BYTES=500MB`
//! - `REENCODER__PIPELINE__MAX_CONCURRENT_ENCODERS=2`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `reencoder.toml`.
//! This can be overridden with `--config` or the `REENCODER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::ByteSize;
pub use models::{ArchiveConfig, Config, PipelineConfig, ServerConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// The file is `path` if given, else `REENCODER_CONFIG`, else
    /// `reencoder.toml`. A missing file is created with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed or cannot be created
    /// - Validation fails (incomplete profiles, archive flags without directory)
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = sources::config_path(path);
        let config = sources::load(&path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path without creating it
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(&path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Write the default configuration, refusing to overwrite an existing file
    pub fn write_defaults(path: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        let path = sources::config_path(path);
        sources::write_defaults(&path)?;
        Ok(path)
    }
}
