//! Configuration management for Summoner

mod account;
mod instance;
pub mod serde_utils;
mod timing;
mod tunnel;
pub mod validate;

pub use account::AccountConfig;
pub use instance::InstanceProfile;
pub use timing::TimingConfig;
pub use tunnel::{BackoffConfig, RestartPolicy, TunnelConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("summoner")
}

/// Path of a named account file inside the default directory.
///
/// A name that already looks like a path is used as-is.
pub fn account_path(name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.extension().is_some() || candidate.components().count() > 1 {
        return candidate.to_path_buf();
    }
    default_config_dir().join(format!("{}.toml", name))
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
