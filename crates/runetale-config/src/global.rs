//! Global Configuration (~/.runetale/config.toml)
//!
//! Handles user-level configuration stored in `~/.runetale/config.toml`.
//! The runtime's extension directory is usually machine specific, so it is
//! the main thing people put here.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.runetale/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Runtime extension directory used when a project does not set one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mods_dir: Option<PathBuf>,

    /// Default scheduler worker count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Default decompiler command template
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decompiler: Vec<String>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            if defaults.workers == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "defaults.workers".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get the global config file path (~/.runetale/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".runetale").join("config.toml"))
    }

    /// Default extension directory, if configured
    pub fn mods_dir(&self) -> Option<&Path> {
        self.defaults.as_ref().and_then(|d| d.mods_dir.as_deref())
    }

    /// Default worker count, if configured
    pub fn workers(&self) -> Option<usize> {
        self.defaults.as_ref().and_then(|d| d.workers)
    }

    /// Default decompiler command, if configured
    pub fn decompiler(&self) -> Option<&[String]> {
        self.defaults
            .as_ref()
            .map(|d| d.decompiler.as_slice())
            .filter(|cmd| !cmd.is_empty())
    }
}
