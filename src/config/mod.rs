mod settings;

use std::path::PathBuf;

pub use settings::{Config, ConfigError, TomlConfig, TomlSurfaceConfig, EXAMPLE_CONFIG};

/// Get the default data directory path (~/.tracesync)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".tracesync"))
        .unwrap_or_else(|| PathBuf::from(".tracesync"))
}

/// Get the config file path (~/.tracesync/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
