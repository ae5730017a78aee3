//! Configuration loading and typed config structures for Causim.
//!
//! The canonical configuration lives in `causim-config.yaml` next to the
//! engine binary. Every field has a default, so an empty or missing file
//! yields a working configuration.

use std::path::Path;

use causim_types::RunConfig;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CausimConfig {
    /// Defaults for `dt`, step budget and tick interval.
    #[serde(default)]
    pub run: RunConfig,

    /// Session actor settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CausimConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// The `CAUSIM_SEED` environment variable overrides `session.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse_yaml(&contents)?;
        config.session.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_yaml(yaml)?;
        config.session.apply_env_overrides();
        Ok(config)
    }

    fn parse_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml rejects a document with no content.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Session actor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Capacity of the inbound and outbound message channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seed for randomized event schedules; seeded from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            seed: None,
        }
    }
}

impl SessionConfig {
    /// A configuration with a fixed RNG seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(seed) = std::env::var("CAUSIM_SEED")
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
        {
            self.seed = Some(seed);
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}
