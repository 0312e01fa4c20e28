//! Orchestrator integration tests
//!
//! End-to-end runs over a two-module workspace with a fake toolchain:
//! `libs/libA` (library) and `plugins/pluginB` (plugin depending on libA).

mod common;

use common::{entry_names, entry_text, FakeToolchain, ListingDecompiler, Project, FAILING};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use runetale_build::{
    BuildError, BundleKind, Goal, Module, ModuleGraph, Orchestrator, SuiteOutcome, TaskGraph,
    TaskId, TaskKind, TaskStatus,
};
use runetale_config::{
    ConfigError, DependencyScope, GlobalConfig, ModuleKind, Overrides, ProjectConfig,
    ResolvedConfig,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PLUGIN: &str = "plugins/pluginB";
const LIBRARY: &str = "libs/libA";

fn id(module: &str, kind: TaskKind) -> TaskId {
    TaskId::module(module, kind)
}

fn package_path(project: &Project) -> std::path::PathBuf {
    project.path("build/plugins/pluginB/libs/pluginB-1.0.0.jar")
}

/// Relative path and content of every file under a directory
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap().to_string_lossy().to_string();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

// ============================================================================
// Build
// ============================================================================

#[test]
fn test_build_packages_plugin_with_library_inlined() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    let report = project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();

    assert!(report.succeeded());
    assert_eq!(toolchain.compiled(), vec![LIBRARY, PLUGIN]);
    assert_eq!(
        entry_names(&package_path(&project)),
        vec![
            "com/example/LibA.class",
            "com/example/PluginB.class",
            "manifest.json"
        ]
    );
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].path, package_path(&project));
}

#[test]
fn test_library_compiles_before_dependent() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();

    let calls = toolchain.calls();
    let lib = calls.iter().position(|c| c == "compile-main libs/libA").unwrap();
    let plugin = calls
        .iter()
        .position(|c| c == "compile-main plugins/pluginB")
        .unwrap();
    assert!(lib < plugin);
}

#[test]
fn test_second_build_is_up_to_date() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();
    toolchain.clear();

    let report = project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();

    assert!(report.succeeded());
    assert!(toolchain.calls().is_empty());
    assert_eq!(report.schedule.executed().count(), 0);
    assert_eq!(
        report.schedule.status(&id(PLUGIN, TaskKind::Package)),
        Some(&TaskStatus::Succeeded { up_to_date: true })
    );
    // Cached suite results are still reported
    let unit = report.tests[PLUGIN].unit.as_ref().unwrap();
    assert_eq!(unit.outcome, SuiteOutcome::Passed);
}

#[test]
fn test_library_change_rebuilds_dependents() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();
    toolchain.clear();

    project.write("libs/libA/src/main/java/com/example/LibA.java", "class LibA { v2 }");
    let report = project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();

    assert!(report.succeeded());
    assert_eq!(toolchain.compiled(), vec![LIBRARY, PLUGIN]);
    assert_eq!(
        entry_text(&package_path(&project), "com/example/LibA.class"),
        "class LibA { v2 }"
    );
}

#[test]
fn test_disabled_cache_repackages_byte_identical() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();
    let first = fs::read(package_path(&project)).unwrap();
    toolchain.clear();

    let report = project
        .orchestrator(&toolchain)
        .with_cache(false)
        .run(Goal::Build, None)
        .unwrap();

    assert_eq!(toolchain.compiled(), vec![LIBRARY, PLUGIN]);
    assert_eq!(
        report.schedule.status(&id(PLUGIN, TaskKind::Package)),
        Some(&TaskStatus::Succeeded { up_to_date: false })
    );
    assert_eq!(first, fs::read(package_path(&project)).unwrap());
}

#[test]
fn test_compile_failure_skips_dependents() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    toolchain.break_module(LIBRARY);

    let report = project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();

    assert!(!report.succeeded());
    assert!(matches!(
        report.schedule.status(&id(LIBRARY, TaskKind::Compile)),
        Some(TaskStatus::Failed { .. })
    ));
    match report.schedule.status(&id(PLUGIN, TaskKind::Compile)) {
        Some(TaskStatus::Skipped { reason }) => {
            assert_eq!(reason, "prerequisite libs/libA:compile failed")
        }
        other => panic!("expected skipped compile, got {:?}", other),
    }
    assert_eq!(toolchain.compiled(), vec![LIBRARY]);
    assert!(!package_path(&project).exists());
}

#[test]
fn test_module_filter_limits_run() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    let report = project
        .orchestrator(&toolchain)
        .run(Goal::UnitTest, Some(LIBRARY))
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(toolchain.compiled(), vec![LIBRARY]);

    let unknown = project
        .orchestrator(&toolchain)
        .run(Goal::UnitTest, Some("plugins/missing"));
    assert!(matches!(unknown, Err(BuildError::TaskNotFound(_))));
}

#[test]
fn test_cyclic_graph_rejected_before_any_task() {
    let project = Project::new(
        r#"
[project]
name = "cyclic"
version = "1.0.0"

[[modules]]
path = "a"
kind = "library"
dependencies = [{ module = "b", scope = "compile-only" }]

[[modules]]
path = "b"
kind = "library"
dependencies = [{ module = "a", scope = "compile-only" }]
"#,
    );

    let result = Orchestrator::new(project.config());
    assert!(matches!(result, Err(BuildError::CyclicDependency(_))));
    assert!(!project.path("build").exists());
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_unit_and_contract_suites_are_separated() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    let report = project
        .orchestrator(&toolchain)
        .run(Goal::VerifyTests, None)
        .unwrap();

    assert!(report.succeeded());
    let plugin = &report.tests[PLUGIN];
    assert_eq!(plugin.unit.as_ref().unwrap().executed, 1);
    assert_eq!(plugin.contract.as_ref().unwrap().executed, 1);

    // libA has no contract cases
    let library = &report.tests[LIBRARY];
    assert_eq!(library.contract.as_ref().unwrap().outcome, SuiteOutcome::NoTests);
    assert!(!toolchain.calls().contains(&"contract libs/libA".to_string()));
}

#[test]
fn test_unit_failure_does_not_block_contract_suite() {
    let project = Project::workspace();
    project.write(
        "plugins/pluginB/src/test/java/com/example/PluginBTest.java",
        &format!("test pluginB {}", FAILING),
    );
    let toolchain = FakeToolchain::new();
    let report = project
        .orchestrator(&toolchain)
        .run(Goal::VerifyTests, None)
        .unwrap();

    assert!(!report.succeeded());
    assert!(matches!(
        report.schedule.status(&id(PLUGIN, TaskKind::UnitTest)),
        Some(TaskStatus::Failed { .. })
    ));
    assert_eq!(
        report.schedule.status(&id(PLUGIN, TaskKind::ContractTest)),
        Some(&TaskStatus::Succeeded { up_to_date: false })
    );
    let unit = report.tests[PLUGIN].unit.as_ref().unwrap();
    assert_eq!(unit.outcome, SuiteOutcome::Failed);
    assert_eq!(unit.failed, 1);
}

#[test]
fn test_unit_failure_blocks_packaging() {
    let project = Project::workspace();
    project.write(
        "plugins/pluginB/src/test/java/com/example/PluginBTest.java",
        &format!("test pluginB {}", FAILING),
    );
    let toolchain = FakeToolchain::new();
    let report = project.orchestrator(&toolchain).run(Goal::Build, None).unwrap();

    match report.schedule.status(&id(PLUGIN, TaskKind::Package)) {
        Some(TaskStatus::Skipped { reason }) => assert!(reason.contains("pluginB:unitTest")),
        other => panic!("expected skipped package, got {:?}", other),
    }
    assert!(!package_path(&project).exists());
    assert!(report.artifacts.is_empty());
}

// ============================================================================
// Bundles and deployment
// ============================================================================

#[test]
fn test_mods_release_bundle_layout() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    let orchestrator = project.orchestrator(&toolchain);
    let report = orchestrator.run(Goal::BundleModsRelease, None).unwrap();

    assert!(report.succeeded());
    let bundle = orchestrator.layout().bundle_path(BundleKind::ModsRelease);
    assert_eq!(
        bundle.file_name().unwrap().to_string_lossy(),
        "runetale-mods-bundle-1.0.0.zip"
    );
    assert_eq!(
        entry_names(&bundle),
        vec!["mods/pluginB-1.0.0.jar", "mods/runetale/config/skills.json"]
    );
}

#[test]
fn test_plugin_jars_bundle_layout() {
    let project = Project::workspace();
    let toolchain = FakeToolchain::new();
    let orchestrator = project.orchestrator(&toolchain);
    orchestrator.run(Goal::BundlePluginJars, None).unwrap();

    let bundle = orchestrator.layout().bundle_path(BundleKind::PluginJars);
    assert_eq!(entry_names(&bundle), vec!["pluginB-1.0.0.jar"]);
}

#[test]
fn test_deploy_replaces_stale_artifacts_and_keeps_foreign_files() {
    let project = Project::workspace();
    project.write("run/mods/foreign-plugin.jar", "not ours");
    project.write("run/mods/pluginB-0.9.0.jar", "stale");
    project.write("run/mods/runetale-mods-bundle-0.9.0.zip", "stale bundle");
    project.write("run/mods/runetale/config/removed.json", "{}");

    let toolchain = FakeToolchain::new();
    let report = project
        .orchestrator(&toolchain)
        .run(Goal::DeployPluginsToRun, None)
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(
        project.listing("run/mods"),
        vec!["foreign-plugin.jar", "pluginB-1.0.0.jar", "runetale"]
    );
    assert_eq!(project.listing("run/mods/runetale/config"), vec!["skills.json"]);
    assert_eq!(
        fs::read(project.path("run/mods/pluginB-1.0.0.jar")).unwrap(),
        fs::read(package_path(&project)).unwrap()
    );

    let deploy = report.deploy.unwrap();
    assert_eq!(deploy.removed.len(), 2);
    assert_eq!(deploy.pruned.len(), 1);
}

#[test]
fn test_deploy_is_idempotent() {
    let project = Project::workspace();
    project.write("run/mods/foreign-plugin.jar", "not ours");
    let toolchain = FakeToolchain::new();

    project
        .orchestrator(&toolchain)
        .run(Goal::DeployPluginsToRun, None)
        .unwrap();
    let first = snapshot(&project.path("run/mods"));

    project
        .orchestrator(&toolchain)
        .run(Goal::DeployPluginsToRun, None)
        .unwrap();
    assert_eq!(first, snapshot(&project.path("run/mods")));
}

#[test]
fn test_deploy_without_target_is_fatal_before_any_task() {
    let project = Project::workspace();
    let manifest = common::WORKSPACE.replace("mods_dir = \"run/mods\"\n", "");
    fs::write(project.path("runetale.toml"), manifest).unwrap();

    let toolchain = FakeToolchain::new();
    let result = project
        .orchestrator(&toolchain)
        .run(Goal::DeployPluginsToRun, None);

    assert!(matches!(result, Err(BuildError::NoDeployTarget)));
    assert!(toolchain.calls().is_empty());
    assert!(!package_path(&project).exists());
}

#[test]
fn test_empty_config_subdir_rejected_when_loading() {
    let manifest = common::WORKSPACE.replace(
        "config_source = \"config\"\n",
        "config_source = \"config\"\nconfig_subdir = \"\"\n",
    );
    let project: ProjectConfig = toml::from_str(&manifest).unwrap();

    let result = ResolvedConfig::resolve(
        Path::new("/work/runetale"),
        &project,
        &GlobalConfig::default(),
        &Overrides::default(),
    );
    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { field, .. }) if field == "deploy.config_subdir"
    ));
}

#[test]
fn test_unconfined_config_subdir_never_prunes_foreign_entries() {
    let project = Project::workspace();
    project.write("run/mods/unrelated-notes.txt", "keep");
    project.write("run/mods/OtherMod/data.json", "{}");

    let mut config = project.config();
    config.config_subdir = PathBuf::new();
    let toolchain = FakeToolchain::new();
    let orchestrator = Orchestrator::new(config)
        .unwrap()
        .with_toolchain(Box::new(toolchain.clone()));

    let result = orchestrator.run(Goal::DeployPluginsToRun, None);

    assert!(matches!(result, Err(BuildError::Config(_))));
    assert!(toolchain.calls().is_empty());
    assert_eq!(
        project.listing("run/mods"),
        vec!["OtherMod", "unrelated-notes.txt"]
    );
    assert_eq!(project.listing("run/mods/OtherMod"), vec!["data.json"]);
}

#[test]
fn test_unsaved_fingerprints_keep_run_report() {
    let project = Project::workspace();
    fs::create_dir_all(project.path("build/.runetale/fingerprints.json")).unwrap();

    let toolchain = FakeToolchain::new();
    let report = project
        .orchestrator(&toolchain)
        .run(Goal::Build, None)
        .unwrap();

    assert!(report.succeeded());
    assert!(package_path(&project).is_file());
    assert_eq!(
        report.schedule.status(&id(PLUGIN, TaskKind::Package)),
        Some(&TaskStatus::Succeeded { up_to_date: false })
    );
}

#[test]
fn test_clean_deployed_plugins_keeps_foreign_files() {
    let project = Project::workspace();
    project.write("run/mods/foreign-plugin.jar", "not ours");
    let toolchain = FakeToolchain::new();
    let orchestrator = project.orchestrator(&toolchain);
    orchestrator.run(Goal::DeployPluginsToRun, None).unwrap();

    let report = orchestrator.clean_deployed_plugins().unwrap();

    assert_eq!(report.removed, vec![project.path("run/mods/pluginB-1.0.0.jar")]);
    assert_eq!(
        project.listing("run/mods"),
        vec!["foreign-plugin.jar", "runetale"]
    );
    assert!(orchestrator.clean_deployed_bundles().unwrap().removed.is_empty());
}

// ============================================================================
// Reference extraction
// ============================================================================

fn write_vendor_jar(path: &Path) {
    use std::io::Write;
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for name in [
        "com/vendor/api/Api.class",
        "com/vendor/internal/Engine.class",
    ] {
        zip.start_file(name, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(name.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_decompile_reference_and_clean() {
    let project = Project::new(&format!(
        "{}\n[reference]\nvendor_archive = \"vendor/Server.jar\"\nprefixes = [\"com/vendor/api/\"]\n",
        common::WORKSPACE
    ));
    write_vendor_jar(&project.path("vendor/Server.jar"));
    let orchestrator = Orchestrator::new(project.config())
        .unwrap()
        .with_decompiler(Box::new(ListingDecompiler));

    let report = orchestrator.decompile_reference().unwrap();

    assert_eq!(report.filtered.kept, 1);
    let output = project.path("build/reference/decompiled");
    assert!(output.join("com/vendor/api/Api.java").is_file());
    assert!(!output.join("com/vendor/internal").exists());

    assert!(orchestrator.clean_reference().unwrap());
    assert!(!output.exists());
    assert!(!orchestrator.clean_reference().unwrap());
}

#[test]
fn test_decompile_reference_requires_decompiler() {
    let project = Project::new(&format!(
        "{}\n[reference]\nvendor_archive = \"vendor/Server.jar\"\nprefixes = [\"com/vendor/api/\"]\n",
        common::WORKSPACE
    ));
    write_vendor_jar(&project.path("vendor/Server.jar"));
    let orchestrator = Orchestrator::new(project.config()).unwrap();

    assert!(matches!(
        orchestrator.decompile_reference(),
        Err(BuildError::Config(_))
    ));
}

// ============================================================================
// Task graph properties
// ============================================================================

const KINDS: [ModuleKind; 3] = [ModuleKind::Library, ModuleKind::Plugin, ModuleKind::TestSupport];
const SCOPES: [DependencyScope; 3] = [
    DependencyScope::Api,
    DependencyScope::CompileOnly,
    DependencyScope::TestOnly,
];

/// Modules of mixed kinds where module `i` may depend on any module `j < i`.
///
/// `edges` holds one choice per candidate edge: 0 for no edge, otherwise
/// a dependency scope.
fn acyclic_modules(kinds: &[usize], edges: &[usize]) -> Vec<Module> {
    let mut choices = edges.iter().cycle();
    kinds
        .iter()
        .enumerate()
        .map(|(i, &k)| {
            let kind = KINDS[k % KINDS.len()];
            let mut module = Module::new(format!("m{}", i), kind, format!("m{}", i));
            if kind == ModuleKind::Plugin {
                module = module.with_sdk(DependencyScope::CompileOnly);
            }
            for j in 0..i {
                let choice = *choices.next().unwrap() % (SCOPES.len() + 1);
                if choice > 0 {
                    module = module.with_dependency(format!("m{}", j), SCOPES[choice - 1]);
                }
            }
            module
        })
        .collect()
}

fn module_task(tasks: &TaskGraph, module: &str, kind: TaskKind) -> usize {
    tasks.index_of(&id(module, kind)).unwrap()
}

proptest! {
    #[test]
    fn prop_acyclic_modules_yield_ordered_task_graph(
        kinds in prop::collection::vec(0usize..3, 1..8),
        edges in prop::collection::vec(0usize..4, 1..32),
    ) {
        let modules = acyclic_modules(&kinds, &edges);
        let graph = ModuleGraph::from_modules(modules.clone()).unwrap();
        let tasks = TaskGraph::build(&graph);

        for (index, task) in tasks.tasks().iter().enumerate() {
            prop_assert!(task.prerequisites.iter().all(|&p| p < index));
        }

        let plugins: Vec<&Module> = modules
            .iter()
            .filter(|m| m.kind == ModuleKind::Plugin)
            .collect();
        for plugin in &plugins {
            let package = module_task(&tasks, &plugin.path, TaskKind::Package);
            let prerequisites = &tasks.task(package).prerequisites;
            prop_assert!(prerequisites.contains(&module_task(&tasks, &plugin.path, TaskKind::UnitTest)));
            prop_assert!(!prerequisites.contains(&module_task(&tasks, &plugin.path, TaskKind::ContractTest)));
        }

        for kind in [
            TaskKind::Bundle(BundleKind::PluginJars),
            TaskKind::Bundle(BundleKind::ModsRelease),
            TaskKind::Deploy,
        ] {
            let root = tasks.index_of(&TaskId::root(kind)).unwrap();
            let closure = tasks.closure(&[TaskId::root(kind)]).unwrap();
            prop_assert_eq!(tasks.task(root).prerequisites.len(), plugins.len());
            for plugin in &plugins {
                prop_assert!(closure.contains(&module_task(&tasks, &plugin.path, TaskKind::UnitTest)));
            }
        }

        let requested = tasks.ids_of_kind(TaskKind::UnitTest);
        let closure = tasks.closure(&requested).unwrap();
        for compile in tasks.ids_of_kind(TaskKind::Compile) {
            prop_assert!(closure.contains(&tasks.index_of(&compile).unwrap()));
        }
    }

    #[test]
    fn prop_back_edge_is_always_rejected(
        kinds in prop::collection::vec(0usize..3, 1..8),
        edges in prop::collection::vec(0usize..4, 1..32),
        from in any::<prop::sample::Index>(),
        to in any::<prop::sample::Index>(),
        scope in 0usize..3,
    ) {
        let mut modules = acyclic_modules(&kinds, &edges);
        let low = from.index(modules.len()).min(to.index(modules.len()));
        let high = from.index(modules.len()).max(to.index(modules.len()));
        let (low_path, high_path) = (format!("m{}", low), format!("m{}", high));

        if !modules[high].dependencies.iter().any(|d| d.module == low_path) {
            modules[high] = modules[high].clone().with_dependency(low_path, SCOPES[scope]);
        }
        if low != high {
            modules[low] = modules[low].clone().with_dependency(high_path, SCOPES[scope]);
        }

        prop_assert!(matches!(
            ModuleGraph::from_modules(modules),
            Err(BuildError::CyclicDependency(_))
        ));
    }
}
