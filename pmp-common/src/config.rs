//! Configuration file resolution and loading
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/pmp/config.toml`)
//! 4. Compiled defaults (no file)

use crate::{CrossfadeSettings, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PMP_CONFIG";

/// Player configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// `[crossfade]` table
    pub crossfade: CrossfadeSettings,
}

impl PlayerConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(content)?;
        config.crossfade.validate()?;
        Ok(config)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Resolve which config file to read
///
/// Returns `None` when no file applies and compiled defaults should be used.
/// An explicitly named file (argument or environment) is returned even if it
/// does not exist so the caller reports the missing file instead of silently
/// falling back.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// Platform config file location (`~/.config/pmp/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pmp").join("config.toml"))
}

/// Load and validate a config file
pub fn load_config(path: &Path) -> Result<PlayerConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config = PlayerConfig::from_toml_str(&content)?;
    debug!("Loaded config from {}: {:?}", path.display(), config);
    Ok(config)
}

/// Resolve and load the config, falling back to defaults when no file applies
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<PlayerConfig> {
    match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        Some(path) => {
            info!("Using config file {}", path.display());
            load_config(&path)
        }
        None => {
            info!("No config file found, using default crossfade settings");
            Ok(PlayerConfig::default())
        }
    }
}

/// Write a config file, creating parent directories as needed
pub fn save_config(path: &Path, config: &PlayerConfig) -> Result<()> {
    config.crossfade.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_toml_string()?)?;
    Ok(())
}
