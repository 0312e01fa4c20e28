//! Project Configuration (runetale.toml)
//!
//! Handles project-level configuration stored in `runetale.toml` at the project root.

use crate::modules::ModuleConfig;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Project configuration from runetale.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectSection>,

    /// External SDK reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk: Option<SdkConfig>,

    /// Build configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,

    /// Toolchain command templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainConfig>,

    /// Deployment target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,

    /// Reference extraction pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceConfig>,

    /// Module declarations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleConfig>,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Root project name, used in bundle file names
    pub name: String,

    /// Project version (semver), default version of every module
    pub version: String,
}

/// External SDK reference. The coordinate is opaque to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SdkConfig {
    /// Opaque, version-pinned coordinate (e.g. "com.hypixel.hytale:Server:+")
    pub coordinate: String,

    /// Local file handed to the toolchain on the classpath
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Output directory (default: "build")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Worker count for the task scheduler
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Cancel not-yet-started tasks after the first failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,

    /// Extension of packaged artifacts (default: "jar")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_extension: Option<String>,

    /// Marker that tags a test case as a contract test (default: "@ContractTest")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_marker: Option<String>,
}

/// Toolchain command templates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Compile command (program followed by arguments)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compile: Vec<String>,

    /// Test command (program followed by arguments)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test: Vec<String>,
}

/// Deployment target configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Runtime extension directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mods_dir: Option<PathBuf>,

    /// Configuration resource tree mirrored into the target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_source: Option<PathBuf>,

    /// Subdirectory of the target receiving the config mirror (default: "runetale/config")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_subdir: Option<PathBuf>,
}

/// Reference extraction pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ReferenceConfig {
    /// Vendor archive to filter (defaults to the SDK path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_archive: Option<PathBuf>,

    /// Entry path prefixes kept in the filtered archive
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,

    /// Decompiled output directory (default: "<build>/reference/decompiled")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Decompiler command template with `{input}` and `{output}` placeholders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decompiler: Vec<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(project) = &self.project {
            if project.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "project.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
            semver::Version::parse(&project.version)
                .map_err(|_| ConfigError::InvalidVersion(project.version.clone()))?;
        }

        if let Some(build) = &self.build {
            if build.workers == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "build.workers".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            if let Some(ext) = &build.artifact_extension {
                if ext.is_empty() || ext.contains(['/', '\\', '*']) {
                    return Err(ConfigError::InvalidValue {
                        field: "build.artifact_extension".to_string(),
                        reason: format!("invalid extension '{}'", ext),
                    });
                }
            }
        }

        if let Some(subdir) = self.deploy.as_ref().and_then(|d| d.config_subdir.as_deref()) {
            if !is_confined_subdir(subdir) {
                return Err(ConfigError::InvalidValue {
                    field: "deploy.config_subdir".to_string(),
                    reason: format!(
                        "'{}' must be a relative path below the mods directory",
                        subdir.display()
                    ),
                });
            }
        }

        if let Some(reference) = &self.reference {
            if reference.prefixes.iter().any(|p| p.is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "reference.prefixes".to_string(),
                    reason: "prefixes cannot be empty strings".to_string(),
                });
            }
            if let Some(output) = &reference.output {
                if output.components().all(|c| c == Component::CurDir) {
                    return Err(ConfigError::InvalidValue {
                        field: "reference.output".to_string(),
                        reason: format!("'{}' is not an output directory", output.display()),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            module.validate()?;
            if !seen.insert(module.path.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "module '{}' is declared more than once",
                    module.path
                )));
            }
        }

        Ok(())
    }

    /// Get the project name, if present
    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.name.as_str())
    }

    /// Get the project version, if present
    pub fn project_version(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.version.as_str())
    }
}

/// Whether `path` names a directory strictly below whatever it is joined to.
///
/// Empty paths, absolute paths and paths with `..` are rejected.
pub fn is_confined_subdir(path: &Path) -> bool {
    let mut named = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    named
}

/// Fold `.` and `..` components without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
