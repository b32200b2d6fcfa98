use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::exchange::DEFAULT_TOPIC;
use crate::transport::SurfaceOptions;

use super::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Exchange topic inbound client traffic is republished on
    pub topic: String,
    /// Start renderers with debug capture enabled
    pub debug_capture: bool,
    /// Default tracing filter directive (RUST_LOG wins when set)
    pub log_filter: String,
    /// Geometry hints for newly created client surfaces
    pub surface: SurfaceOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            debug_capture: false,
            log_filter: "info".to_string(),
            surface: SurfaceOptions::default(),
        }
    }
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub topic: Option<String>,
    pub debug_capture: Option<bool>,
    pub log_filter: Option<String>,
    pub surface: Option<TomlSurfaceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlSurfaceConfig {
    pub initial_width: Option<String>,
    pub initial_height: Option<String>,
}

impl Config {
    /// Load configuration from the default location, merging with defaults.
    ///
    /// A missing file gets the example written in its place; an unreadable or
    /// invalid one is logged and ignored.
    pub fn load() -> Self {
        let config_file = config_path();

        if !config_file.exists() {
            Self::create_default_config(&config_file);
            return Config::default();
        }

        match Self::load_from(&config_file) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %config_file.display(), error = %e, "Ignoring config file");
                Config::default()
            }
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let toml_config = toml::from_str::<TomlConfig>(contents)?;
        let mut config = Config::default();
        config.merge(toml_config);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(topic) = toml_config.topic {
            self.topic = topic;
        }
        if let Some(debug_capture) = toml_config.debug_capture {
            self.debug_capture = debug_capture;
        }
        if let Some(log_filter) = toml_config.log_filter {
            self.log_filter = log_filter;
        }
        if let Some(surface) = toml_config.surface {
            if let Some(width) = surface.initial_width {
                self.surface.initial_width = width;
            }
            if let Some(height) = surface.initial_height {
                self.surface.initial_height = height;
            }
        }
    }

    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::debug!(path = %parent.display(), error = %e, "Failed to create config directory");
                return;
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::debug!(path = %path.display(), error = %e, "Failed to write example config");
        }
    }
}
