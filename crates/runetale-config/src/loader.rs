//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper
//! precedence, and resolves the result into an immutable [`ResolvedConfig`].

use crate::global::GlobalConfig;
use crate::modules::{DependencySpec, ModuleKind};
use crate::project::{normalize_path, ProjectConfig};
use crate::{ConfigError, ConfigResult, PROJECT_FILE};
use std::env;
use std::path::{Path, PathBuf};

/// Default contract test marker, matching the `@ContractTest` annotation
pub const DEFAULT_CONTRACT_MARKER: &str = "@ContractTest";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.runetale/config.toml) - lowest priority
/// 2. Project config (./runetale.toml) - overrides global
/// 3. Environment variables (RUNETALE_*) - overrides project
/// 4. CLI flags - highest priority, passed in as [`Overrides`]
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
    /// Skip the global config entirely
    skip_global: bool,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub fail_fast: Option<bool>,
    pub mods_dir: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
}

/// Toolchain command templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolchainCommands {
    pub compile: Vec<String>,
    pub test: Vec<String>,
}

/// A module declaration with every path resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModule {
    /// Hierarchical module path (e.g. `plugins/skills`)
    pub path: String,
    pub kind: ModuleKind,
    pub version: String,
    /// Module directory
    pub dir: PathBuf,
    pub source_root: PathBuf,
    pub test_root: PathBuf,
    pub resource_root: PathBuf,
    /// Declared dependencies, in declaration order
    pub dependencies: Vec<DependencySpec>,
}

/// Fully resolved, immutable configuration for one orchestrator run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Directory containing runetale.toml
    pub project_root: PathBuf,
    /// Root project name, used in bundle names
    pub project_name: String,
    /// Project version
    pub version: String,
    /// Opaque SDK coordinate
    pub sdk_coordinate: Option<String>,
    /// Local SDK file put on the classpath
    pub sdk_path: Option<PathBuf>,
    /// Build output directory
    pub build_dir: PathBuf,
    /// Scheduler worker count
    pub workers: usize,
    /// Cancel not-yet-started tasks after the first failure
    pub fail_fast: bool,
    /// Extension of packaged artifacts
    pub artifact_extension: String,
    /// Marker tagging contract test cases
    pub contract_marker: String,
    /// Toolchain command templates
    pub toolchain: ToolchainCommands,
    /// Runtime extension directory
    pub mods_dir: Option<PathBuf>,
    /// Config resource tree mirrored on deploy
    pub config_source: Option<PathBuf>,
    /// Subdirectory of the extension directory receiving the mirror
    pub config_subdir: PathBuf,
    /// Vendor archive for reference extraction
    pub vendor_archive: Option<PathBuf>,
    /// Entry prefixes kept by the reference filter
    pub reference_prefixes: Vec<String>,
    /// Decompiled output directory
    pub reference_output: PathBuf,
    /// Decompiler command template
    pub decompiler: Vec<String>,
    /// Module declarations in declaration order
    pub modules: Vec<ResolvedModule>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
            skip_global: false,
        }
    }

    /// Use a specific global config file instead of ~/.runetale/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Ignore the global config file
    pub fn without_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find runetale.toml.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<ResolvedConfig> {
        self.load_with_overrides(start_dir, &Overrides::default())
    }

    /// Load configuration and apply command line overrides on top
    pub fn load_with_overrides(
        &mut self,
        start_dir: &Path,
        overrides: &Overrides,
    ) -> ConfigResult<ResolvedConfig> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        let global = self.load_global_config()?;
        let overrides = self.apply_env_overrides(overrides.clone())?;

        ResolvedConfig::resolve(&project_root, &project, &global, &overrides)
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(PathBuf, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((current, project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Err(ConfigError::NotFound(start_dir.join(PROJECT_FILE))),
            }
        }
    }

    /// Load global configuration, which is optional
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        if self.skip_global {
            return Ok(GlobalConfig::default());
        }

        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Fill in overrides from RUNETALE_* environment variables.
    ///
    /// Values already set by the caller (CLI flags) win.
    fn apply_env_overrides(&self, mut overrides: Overrides) -> ConfigResult<Overrides> {
        if overrides.workers.is_none() {
            if let Ok(workers) = env::var("RUNETALE_WORKERS") {
                let parsed = workers
                    .parse::<usize>()
                    .ok()
                    .filter(|w| *w > 0)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        field: "RUNETALE_WORKERS".to_string(),
                        reason: format!("expected a positive integer, got '{}'", workers),
                    })?;
                overrides.workers = Some(parsed);
            }
        }

        if overrides.fail_fast.is_none() {
            if let Ok(fail_fast) = env::var("RUNETALE_FAIL_FAST") {
                overrides.fail_fast = Some(matches!(
                    fail_fast.to_lowercase().as_str(),
                    "true" | "1" | "yes"
                ));
            }
        }

        if overrides.mods_dir.is_none() {
            if let Ok(dir) = env::var("RUNETALE_MODS_DIR") {
                overrides.mods_dir = Some(PathBuf::from(dir));
            }
        }

        if overrides.build_dir.is_none() {
            if let Ok(dir) = env::var("RUNETALE_BUILD_DIR") {
                overrides.build_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(overrides)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolvedConfig {
    /// Merge the configuration layers into a resolved value.
    ///
    /// Pure function: no environment or filesystem access.
    pub fn resolve(
        project_root: &Path,
        project: &ProjectConfig,
        global: &GlobalConfig,
        overrides: &Overrides,
    ) -> ConfigResult<Self> {
        project.validate()?;
        global.validate()?;

        let abs = |p: &Path| -> PathBuf {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                project_root.join(p)
            }
        };

        let project_name = project
            .project_name()
            .map(str::to_string)
            .or_else(|| {
                project_root
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
            })
            .unwrap_or_else(|| "project".to_string());
        let version = project.project_version().unwrap_or("0.1.0").to_string();

        let build = project.build.clone().unwrap_or_default();
        let build_dir = overrides
            .build_dir
            .as_deref()
            .or(build.output.as_deref())
            .map(|p| abs(p))
            .unwrap_or_else(|| project_root.join("build"));

        let workers = overrides
            .workers
            .or(build.workers)
            .or(global.workers())
            .unwrap_or_else(default_workers);

        let deploy = project.deploy.clone().unwrap_or_default();
        let mods_dir = overrides
            .mods_dir
            .as_deref()
            .or(deploy.mods_dir.as_deref())
            .or(global.mods_dir())
            .map(|p| abs(p));

        let sdk_path = project
            .sdk
            .as_ref()
            .and_then(|s| s.path.as_deref())
            .map(|p| abs(p));

        let reference = project.reference.clone().unwrap_or_default();
        let decompiler = if reference.decompiler.is_empty() {
            global.decompiler().map(<[String]>::to_vec).unwrap_or_default()
        } else {
            reference.decompiler.clone()
        };

        let reference_output = reference
            .output
            .as_deref()
            .map(|p| abs(p))
            .unwrap_or_else(|| build_dir.join("reference").join("decompiled"));
        if normalize_path(project_root).starts_with(normalize_path(&reference_output)) {
            return Err(ConfigError::InvalidValue {
                field: "reference.output".to_string(),
                reason: format!(
                    "'{}' would contain the project root",
                    reference_output.display()
                ),
            });
        }

        let toolchain = project.toolchain.clone().unwrap_or_default();

        let modules = project
            .modules
            .iter()
            .map(|m| {
                let dir = project_root.join(&m.path);
                let under = |p: &Option<PathBuf>, default: &str| {
                    dir.join(p.as_deref().unwrap_or_else(|| Path::new(default)))
                };
                ResolvedModule {
                    path: m.path.clone(),
                    kind: m.kind,
                    version: m.version.clone().unwrap_or_else(|| version.clone()),
                    source_root: under(&m.source, "src/main/java"),
                    test_root: under(&m.tests, "src/test/java"),
                    resource_root: under(&m.resources, "src/main/resources"),
                    dependencies: m.dependencies.clone(),
                    dir,
                }
            })
            .collect();

        Ok(Self {
            project_root: project_root.to_path_buf(),
            project_name,
            sdk_coordinate: project.sdk.as_ref().map(|s| s.coordinate.clone()),
            vendor_archive: reference
                .vendor_archive
                .as_deref()
                .map(|p| abs(p))
                .or_else(|| sdk_path.clone()),
            sdk_path,
            reference_prefixes: reference.prefixes.clone(),
            reference_output,
            decompiler,
            build_dir,
            workers,
            fail_fast: overrides.fail_fast.or(build.fail_fast).unwrap_or(false),
            artifact_extension: build
                .artifact_extension
                .unwrap_or_else(|| "jar".to_string()),
            contract_marker: build
                .contract_marker
                .unwrap_or_else(|| DEFAULT_CONTRACT_MARKER.to_string()),
            toolchain: ToolchainCommands {
                compile: toolchain.compile,
                test: toolchain.test,
            },
            mods_dir,
            config_source: deploy.config_source.as_deref().map(|p| abs(p)),
            config_subdir: deploy
                .config_subdir
                .unwrap_or_else(|| PathBuf::from("runetale").join("config")),
            version,
            modules,
        })
    }

    /// Find a module declaration by path
    pub fn module(&self, path: &str) -> Option<&ResolvedModule> {
        self.modules.iter().find(|m| m.path == path)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn loader() -> ConfigLoader {
        ConfigLoader::new().without_global_config()
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[project]
name = "runetale"
version = "1.0.0"
"#,
        );

        let config = loader().load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.project_name, "runetale");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.project_root, temp_dir.path());
        assert_eq!(config.build_dir, temp_dir.path().join("build"));
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[project]
name = "parent"
version = "1.0.0"
"#,
        );

        let sub_dir = temp_dir.path().join("plugins").join("skills");
        fs::create_dir_all(&sub_dir).unwrap();

        let config = loader().load_from_directory(&sub_dir).unwrap();
        assert_eq!(config.project_name, "parent");
        assert_eq!(config.project_root, temp_dir.path());
    }

    #[test]
    #[serial]
    fn test_missing_project_config() {
        let temp_dir = TempDir::new().unwrap();
        let result = loader().load_from_directory(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[build]
workers = 2
"#,
        );

        env::set_var("RUNETALE_WORKERS", "7");
        env::set_var("RUNETALE_FAIL_FAST", "yes");
        env::set_var("RUNETALE_MODS_DIR", "/srv/mods");

        let config = loader().load_from_directory(temp_dir.path()).unwrap();

        env::remove_var("RUNETALE_WORKERS");
        env::remove_var("RUNETALE_FAIL_FAST");
        env::remove_var("RUNETALE_MODS_DIR");

        assert_eq!(config.workers, 7);
        assert!(config.fail_fast);
        assert_eq!(config.mods_dir, Some(PathBuf::from("/srv/mods")));
    }

    #[test]
    #[serial]
    fn test_cli_overrides_beat_env() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "");

        env::set_var("RUNETALE_WORKERS", "7");
        let overrides = Overrides {
            workers: Some(3),
            ..Default::default()
        };
        let config = loader()
            .load_with_overrides(temp_dir.path(), &overrides)
            .unwrap();
        env::remove_var("RUNETALE_WORKERS");

        assert_eq!(config.workers, 3);
    }

    #[test]
    #[serial]
    fn test_invalid_env_workers() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "");

        env::set_var("RUNETALE_WORKERS", "many");
        let result = loader().load_from_directory(temp_dir.path());
        env::remove_var("RUNETALE_WORKERS");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    #[serial]
    fn test_global_config_supplies_mods_dir() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "");
        let global_path = temp_dir.path().join("global.toml");
        fs::write(
            &global_path,
            r#"
[defaults]
mods_dir = "/opt/hytale/mods"
"#,
        )
        .unwrap();

        let mut loader = ConfigLoader::new().with_global_config_path(&global_path);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();
        assert_eq!(config.mods_dir, Some(PathBuf::from("/opt/hytale/mods")));
    }

    #[test]
    fn test_resolve_module_defaults() {
        let root = Path::new("/work/runetale");
        let project: ProjectConfig = toml::from_str(
            r#"
[project]
name = "runetale"
version = "2.1.0"

[sdk]
coordinate = "com.hypixel.hytale:Server:+"
path = "libs/Server.jar"

[[modules]]
path = "plugins/skills"
kind = "plugin"

[[modules]]
path = "plugins/skills-api"
kind = "library"
version = "1.0.0"
source = "src"
"#,
        )
        .unwrap();

        let config = ResolvedConfig::resolve(
            root,
            &project,
            &GlobalConfig::default(),
            &Overrides::default(),
        )
        .unwrap();

        let skills = config.module("plugins/skills").unwrap();
        assert_eq!(skills.version, "2.1.0");
        assert_eq!(
            skills.source_root,
            root.join("plugins/skills").join("src/main/java")
        );
        assert_eq!(
            skills.resource_root,
            root.join("plugins/skills").join("src/main/resources")
        );

        let api = config.module("plugins/skills-api").unwrap();
        assert_eq!(api.version, "1.0.0");
        assert_eq!(api.source_root, root.join("plugins/skills-api").join("src"));

        assert_eq!(config.sdk_path, Some(root.join("libs/Server.jar")));
        assert_eq!(config.vendor_archive, config.sdk_path);
        assert_eq!(config.artifact_extension, "jar");
        assert_eq!(config.contract_marker, DEFAULT_CONTRACT_MARKER);
        assert_eq!(config.config_subdir, PathBuf::from("runetale/config"));
        assert_eq!(
            config.reference_output,
            root.join("build").join("reference").join("decompiled")
        );
    }

    #[rstest::rstest]
    #[case("..")]
    #[case("/work")]
    #[case("/work/runetale")]
    #[case("build/../../runetale")]
    fn test_reference_output_containing_project_root_rejected(#[case] output: &str) {
        let project: ProjectConfig = toml::from_str(&format!(
            "[reference]\noutput = \"{}\"\n",
            output
        ))
        .unwrap();

        let result = ResolvedConfig::resolve(
            Path::new("/work/runetale"),
            &project,
            &GlobalConfig::default(),
            &Overrides::default(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "reference.output"
        ));
    }

    #[test]
    fn test_reference_output_inside_project_accepted() {
        let project: ProjectConfig =
            toml::from_str("[reference]\noutput = \"reference/src\"\n").unwrap();
        let config = ResolvedConfig::resolve(
            Path::new("/work/runetale"),
            &project,
            &GlobalConfig::default(),
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(
            config.reference_output,
            PathBuf::from("/work/runetale/reference/src")
        );
    }
}
