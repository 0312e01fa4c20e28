//! Configuration loading and precedence tests

use pretty_assertions::assert_eq;
use runetale_config::{
    ConfigError, ConfigLoader, DependencyScope, ModuleKind, Overrides, PROJECT_FILE,
};
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(PROJECT_FILE);
    fs::write(&config_path, content).unwrap();
    config_path
}

const WORKSPACE: &str = r#"
[project]
name = "runetale"
version = "0.3.0"

[sdk]
coordinate = "com.hypixel.hytale:Server:+"

[build]
workers = 4

[deploy]
mods_dir = "run/mods"
config_source = "config"

[[modules]]
path = "platform/testing-core"
kind = "test-support"

[[modules]]
path = "plugins/skills-api"
kind = "library"
dependencies = [{ sdk = true }]

[[modules]]
path = "plugins/skills"
kind = "plugin"
dependencies = [
    { sdk = true },
    { module = "plugins/skills-api", scope = "api" },
    { module = "platform/testing-core", scope = "test-only" },
]
"#;

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_workspace() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), WORKSPACE);

    let mut loader = ConfigLoader::new().without_global_config();
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert_eq!(config.project_name, "runetale");
    assert_eq!(config.modules.len(), 3);
    assert_eq!(config.workers, 4);
    assert_eq!(config.mods_dir, Some(temp_dir.path().join("run/mods")));
    assert_eq!(config.config_source, Some(temp_dir.path().join("config")));

    let skills = config.module("plugins/skills").unwrap();
    assert_eq!(skills.kind, ModuleKind::Plugin);
    assert_eq!(skills.version, "0.3.0");
    assert_eq!(skills.dir, temp_dir.path().join("plugins/skills"));
    assert_eq!(skills.dependencies[2].scope, DependencyScope::TestOnly);
}

#[test]
#[serial]
fn test_module_order_preserved() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), WORKSPACE);

    let mut loader = ConfigLoader::new().without_global_config();
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    let paths: Vec<&str> = config.modules.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["platform/testing-core", "plugins/skills-api", "plugins/skills"]
    );
}

#[test]
#[serial]
fn test_build_dir_override() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), WORKSPACE);

    let overrides = Overrides {
        build_dir: Some(PathBuf::from("/tmp/runetale-out")),
        fail_fast: Some(true),
        ..Default::default()
    };
    let mut loader = ConfigLoader::new().without_global_config();
    let config = loader
        .load_with_overrides(temp_dir.path(), &overrides)
        .unwrap();

    assert_eq!(config.build_dir, PathBuf::from("/tmp/runetale-out"));
    assert!(config.fail_fast);
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
#[serial]
fn test_syntax_error_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[project\nname = ");

    let mut loader = ConfigLoader::new().without_global_config();
    match loader.load_from_directory(temp_dir.path()) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected TomlParseError, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_bad_dependency_shape_rejected() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[[modules]]
path = "plugins/a"
kind = "plugin"
dependencies = [{ scope = "api" }]
"#,
    );

    let mut loader = ConfigLoader::new().without_global_config();
    assert!(matches!(
        loader.load_from_directory(temp_dir.path()),
        Err(ConfigError::InvalidValue { .. })
    ));
}

#[test]
#[serial]
fn test_unknown_module_kind_rejected() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[[modules]]
path = "plugins/a"
kind = "application"
"#,
    );

    let mut loader = ConfigLoader::new().without_global_config();
    assert!(loader.load_from_directory(temp_dir.path()).is_err());
}
