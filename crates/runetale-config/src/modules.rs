//! Module declarations (`[[modules]]` tables in runetale.toml)
//!
//! Each module is identified by its hierarchical path relative to the project
//! root (for example `plugins/skills`). Dependencies name another module by
//! path, or the external SDK, together with a visibility scope.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// Shared code consumed by plugins
    Library,
    /// Independently deployable plugin
    Plugin,
    /// Shared test fixtures and helpers
    TestSupport,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::Plugin => write!(f, "plugin"),
            Self::TestSupport => write!(f, "test-support"),
        }
    }
}

/// Visibility of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyScope {
    /// Exported to consumers of the declaring module
    Api,
    /// Needed to compile main sources
    #[default]
    CompileOnly,
    /// Needed only by the test suite
    TestOnly,
}

impl DependencyScope {
    /// Whether the dependency participates in main compilation and packaging
    pub fn is_main(&self) -> bool {
        !matches!(self, Self::TestOnly)
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::CompileOnly => write!(f, "compile-only"),
            Self::TestOnly => write!(f, "test-only"),
        }
    }
}

/// A declared dependency: either another module or the external SDK
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DependencySpec {
    /// Path of the target module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Depend on the external SDK instead of a module
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sdk: bool,

    /// Visibility scope (default: compile-only)
    #[serde(default)]
    pub scope: DependencyScope,
}

impl DependencySpec {
    /// Dependency on another module
    pub fn module(path: impl Into<String>, scope: DependencyScope) -> Self {
        Self {
            module: Some(path.into()),
            sdk: false,
            scope,
        }
    }

    /// Dependency on the external SDK
    pub fn sdk(scope: DependencyScope) -> Self {
        Self {
            module: None,
            sdk: true,
            scope,
        }
    }
}

/// A `[[modules]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    /// Hierarchical module path, relative to the project root
    pub path: String,

    /// Module kind
    pub kind: ModuleKind,

    /// Version override (defaults to the project version)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Source root relative to the module directory (default: src/main/java)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Test root relative to the module directory (default: src/test/java)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<PathBuf>,

    /// Resource root relative to the module directory (default: src/main/resources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<PathBuf>,

    /// Declared dependencies, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySpec>,
}

impl ModuleConfig {
    /// Create a module declaration with no dependencies
    pub fn new(path: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            path: path.into(),
            kind,
            version: None,
            source: None,
            tests: None,
            resources: None,
            dependencies: Vec::new(),
        }
    }

    /// Add a dependency
    pub fn with_dependency(mut self, dependency: DependencySpec) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Validate the structural shape of the declaration.
    ///
    /// Whether dependency targets exist is checked later, when the module
    /// graph is built.
    pub fn validate(&self) -> ConfigResult<()> {
        if !is_valid_module_path(&self.path) {
            return Err(ConfigError::InvalidValue {
                field: "modules.path".to_string(),
                reason: format!("invalid module path '{}'", self.path),
            });
        }

        if let Some(version) = &self.version {
            semver::Version::parse(version)
                .map_err(|_| ConfigError::InvalidVersion(version.clone()))?;
        }

        for dep in &self.dependencies {
            match (&dep.module, dep.sdk) {
                (Some(_), true) => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("modules[{}].dependencies", self.path),
                        reason: "a dependency cannot name both a module and the sdk".to_string(),
                    });
                }
                (None, false) => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("modules[{}].dependencies", self.path),
                        reason: "a dependency must name a module or set sdk = true".to_string(),
                    });
                }
                (Some(target), false) if !is_valid_module_path(target) => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("modules[{}].dependencies", self.path),
                        reason: format!("invalid module path '{}'", target),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Short name of the module (last path segment)
    pub fn name(&self) -> &str {
        module_name(&self.path)
    }
}

/// Last segment of a hierarchical module path
pub fn module_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Module paths are `/`-separated, relative, and made of `[A-Za-z0-9_.-]` segments
fn is_valid_module_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_module_with_dependencies() {
        let toml = r#"
path = "plugins/skills"
kind = "plugin"
dependencies = [
    { module = "plugins/skills-api", scope = "api" },
    { sdk = true },
    { module = "platform/testing-core", scope = "test-only" },
]
"#;
        let module: ModuleConfig = toml::from_str(toml).unwrap();
        assert_eq!(module.kind, ModuleKind::Plugin);
        assert_eq!(module.name(), "skills");
        assert_eq!(module.dependencies.len(), 3);
        assert!(module.dependencies[1].sdk);
        assert_eq!(module.dependencies[1].scope, DependencyScope::CompileOnly);
        assert_eq!(module.dependencies[2].scope, DependencyScope::TestOnly);
        assert!(module.validate().is_ok());
    }

    #[test]
    fn test_dependency_requires_exactly_one_target() {
        let both = ModuleConfig::new("plugins/a", ModuleKind::Plugin).with_dependency(
            DependencySpec {
                module: Some("libs/b".to_string()),
                sdk: true,
                scope: DependencyScope::Api,
            },
        );
        assert!(both.validate().is_err());

        let neither = ModuleConfig::new("plugins/a", ModuleKind::Plugin).with_dependency(
            DependencySpec {
                module: None,
                sdk: false,
                scope: DependencyScope::Api,
            },
        );
        assert!(neither.validate().is_err());
    }

    #[rstest]
    #[case("plugins/skills", true)]
    #[case("skills", true)]
    #[case("platform/testing-core", true)]
    #[case("", false)]
    #[case("plugins//skills", false)]
    #[case("../escape", false)]
    #[case("plugins/sk ills", false)]
    fn test_module_path_validation(#[case] path: &str, #[case] valid: bool) {
        assert_eq!(is_valid_module_path(path), valid);
    }

    #[test]
    fn test_invalid_module_version() {
        let mut module = ModuleConfig::new("plugins/a", ModuleKind::Plugin);
        module.version = Some("one".to_string());
        assert!(matches!(
            module.validate(),
            Err(ConfigError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_scope_is_main() {
        assert!(DependencyScope::Api.is_main());
        assert!(DependencyScope::CompileOnly.is_main());
        assert!(!DependencyScope::TestOnly.is_main());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ModuleKind::TestSupport.to_string(), "test-support");
        assert_eq!(ModuleKind::Plugin.to_string(), "plugin");
    }
}
