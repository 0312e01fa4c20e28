//! Shared fixtures for orchestrator tests

#![allow(dead_code)]

use runetale_build::{
    BuildResult, CompileOutput, CompileRequest, CompileScope, Decompiler, Orchestrator,
    SuiteResult, TestRequest, Toolchain,
};
use runetale_config::{GlobalConfig, Overrides, ProjectConfig, ResolvedConfig};
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const WORKSPACE: &str = r#"
[project]
name = "runetale"
version = "1.0.0"

[sdk]
coordinate = "vendor:server:+"

[build]
workers = 2

[deploy]
mods_dir = "run/mods"
config_source = "config"

[[modules]]
path = "libs/libA"
kind = "library"

[[modules]]
path = "plugins/pluginB"
kind = "plugin"
dependencies = [{ sdk = true }, { module = "libs/libA", scope = "api" }]
"#;

/// Test case bodies containing this token fail in the fake runner
pub const FAILING: &str = "FAIL";

/// A scratch project laid out on disk
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new(manifest: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("runetale.toml"), manifest).unwrap();
        Self { dir }
    }

    /// The two-module workspace with sources, tests, resources and config
    pub fn workspace() -> Self {
        let project = Self::new(WORKSPACE);
        project.write("libs/libA/src/main/java/com/example/LibA.java", "class LibA { v1 }");
        project.write("libs/libA/src/test/java/com/example/LibATest.java", "test libA");
        project.write(
            "plugins/pluginB/src/main/java/com/example/PluginB.java",
            "class PluginB {}",
        );
        project.write("plugins/pluginB/src/main/resources/manifest.json", "{}");
        project.write(
            "plugins/pluginB/src/test/java/com/example/PluginBTest.java",
            "test pluginB",
        );
        project.write(
            "plugins/pluginB/src/test/java/com/example/PluginBContractTest.java",
            "@ContractTest test pluginB contract",
        );
        project.write("config/skills.json", "{\"xp\": 1}");
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn config(&self) -> ResolvedConfig {
        let manifest = fs::read_to_string(self.path("runetale.toml")).unwrap();
        let project: ProjectConfig = toml::from_str(&manifest).unwrap();
        ResolvedConfig::resolve(
            self.root(),
            &project,
            &GlobalConfig::default(),
            &Overrides::default(),
        )
        .unwrap()
    }

    pub fn orchestrator(&self, toolchain: &FakeToolchain) -> Orchestrator {
        Orchestrator::new(self.config())
            .unwrap()
            .with_toolchain(Box::new(toolchain.clone()))
    }

    /// File names directly under a directory, sorted
    pub fn listing(&self, rel: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path(rel))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Toolchain that copies sources to classes and runs tests by inspection
#[derive(Clone, Default)]
pub struct FakeToolchain {
    calls: Arc<Mutex<Vec<String>>>,
    broken: Arc<Mutex<HashSet<String>>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make compilation of a module fail
    pub fn break_module(&self, module: &str) {
        self.broken.lock().unwrap().insert(module.to_string());
    }

    /// Calls so far, as `<action> <module>`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn compiled(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("compile-main ").map(str::to_string))
            .collect();
        modules.sort();
        modules
    }
}

impl Toolchain for FakeToolchain {
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, String> {
        let action = match request.scope {
            CompileScope::Main => "compile-main",
            CompileScope::Test => "compile-test",
        };
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", action, request.module));
        if self.broken.lock().unwrap().contains(&request.module) {
            return Err("error: cannot find symbol".to_string());
        }

        for entry in WalkDir::new(&request.source_root) {
            let entry = entry.map_err(|e| e.to_string())?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&request.source_root).unwrap();
            let target = request.output_dir.join(rel).with_extension("class");
            fs::create_dir_all(target.parent().unwrap()).map_err(|e| e.to_string())?;
            fs::copy(entry.path(), target).map_err(|e| e.to_string())?;
        }
        Ok(CompileOutput::default())
    }

    fn run_tests(&self, request: &TestRequest) -> Result<SuiteResult, String> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", request.suite, request.module));
        let failed = request
            .cases
            .iter()
            .filter(|c| fs::read_to_string(&c.path).unwrap().contains(FAILING))
            .count();
        Ok(if failed == 0 {
            SuiteResult::passed(request.suite, request.cases.len())
        } else {
            SuiteResult::failed(request.suite, request.cases.len(), failed)
        })
    }
}

/// Decompiler writing one source file per filtered entry
pub struct ListingDecompiler;

impl Decompiler for ListingDecompiler {
    fn decompile(&self, input: &Path, output: &Path) -> BuildResult<()> {
        let mut archive = zip::ZipArchive::new(fs::File::open(input).unwrap()).unwrap();
        for i in 0..archive.len() {
            let entry = archive.by_index(i).unwrap();
            let target = output.join(entry.name()).with_extension("java");
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, entry.name()).unwrap();
        }
        Ok(())
    }
}

/// Names of every entry in an archive
pub fn entry_names(archive: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(fs::File::open(archive).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

/// Content of one archive entry
pub fn entry_text(archive: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(fs::File::open(archive).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}
