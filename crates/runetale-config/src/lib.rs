//! RuneTale Configuration System
//!
//! Provides configuration management for the RuneTale plugin workspace:
//! - Project configuration (runetale.toml)
//! - Global user configuration (~/.runetale/config.toml)
//! - Module declarations and dependency scopes
//! - Configuration precedence, merging and resolution
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.runetale/config.toml)
//! 2. Project config (./runetale.toml)
//! 3. Environment variables (RUNETALE_*)
//! 4. CLI flags
//!
//! The merged result is a [`ResolvedConfig`]: every default filled in and every
//! path absolute. Build components receive it by reference and never consult
//! the environment themselves.
//!
//! # Example
//!
//! ```no_run
//! use runetale_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("{} v{}", config.project_name, config.version);
//! ```

pub mod global;
pub mod loader;
pub mod modules;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Name of the project configuration file
pub const PROJECT_FILE: &str = "runetale.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid semver version: {0}")]
    InvalidVersion(String),

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{ConfigLoader, Overrides, ResolvedConfig, ResolvedModule, ToolchainCommands};
pub use modules::{DependencyScope, DependencySpec, ModuleConfig, ModuleKind};
pub use project::{is_confined_subdir, ProjectConfig};
