//! Build orchestration
//!
//! The [`Orchestrator`] owns the resolved configuration, both graphs and the
//! external collaborators, and implements every task action. Goals map to a
//! set of requested tasks which the [`Scheduler`] runs with their
//! prerequisites. Cleaning and reference extraction run outside the graph.

use crate::artifact::{Artifact, ArtifactKind, BundleKind, Layout, SuiteKind};
use crate::deploy::{DeployReport, DeploymentSync, OwnedPatterns};
use crate::error::{BuildError, BuildResult};
use crate::fingerprint::{FingerprintCache, Fingerprinter};
use crate::graph::{Module, ModuleGraph};
use crate::packager::{self, PackageInputs};
use crate::reference::{Decompiler, ExtractionReport, ProcessDecompiler, ReferencePipeline};
use crate::scheduler::{ScheduleReport, Scheduler, TaskContext, TaskExecutor, TaskOutcome};
use crate::tasks::{Task, TaskGraph, TaskId, TaskKind};
use crate::testing::{SuiteResult, TestClassifier, TestResultSet};
use crate::toolchain::{CommandToolchain, CompileRequest, CompileScope, TestRequest, Toolchain};
use runetale_config::{ConfigError, ResolvedConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// File inside a test report directory holding the suite result
const RESULT_FILE: &str = "result.json";

/// What the user asked the orchestrator to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Goal {
    /// Compile everything, run unit tests, package every plugin
    Build,
    UnitTest,
    ContractTest,
    /// Unit and contract tests
    VerifyTests,
    DeployPluginsToRun,
    BundlePluginJars,
    BundleModsRelease,
}

impl Goal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::UnitTest => "unitTest",
            Self::ContractTest => "contractTest",
            Self::VerifyTests => "verifyTests",
            Self::DeployPluginsToRun => "deployPluginsToRun",
            Self::BundlePluginJars => "bundlePluginJars",
            Self::BundleModsRelease => "bundleModsRelease",
        }
    }

    /// Task kinds fanned out over modules, or the single root task
    fn kinds(&self) -> &'static [TaskKind] {
        match self {
            Self::Build => &[TaskKind::Compile, TaskKind::UnitTest, TaskKind::Package],
            Self::UnitTest => &[TaskKind::UnitTest],
            Self::ContractTest => &[TaskKind::ContractTest],
            Self::VerifyTests => &[TaskKind::UnitTest, TaskKind::ContractTest],
            Self::DeployPluginsToRun => &[TaskKind::Deploy],
            Self::BundlePluginJars => &[TaskKind::Bundle(BundleKind::PluginJars)],
            Self::BundleModsRelease => &[TaskKind::Bundle(BundleKind::ModsRelease)],
        }
    }

    /// Whether the goal is a single root-level task
    pub fn is_root(&self) -> bool {
        matches!(
            self,
            Self::DeployPluginsToRun | Self::BundlePluginJars | Self::BundleModsRelease
        )
    }

    /// Requested task identities, optionally restricted to one module
    pub fn requested(&self, tasks: &TaskGraph, module: Option<&str>) -> BuildResult<Vec<TaskId>> {
        let mut requested = Vec::new();
        for kind in self.kinds() {
            if self.is_root() {
                requested.push(TaskId::root(*kind));
                continue;
            }
            requested.extend(
                tasks
                    .ids_of_kind(*kind)
                    .into_iter()
                    .filter(|id| module.is_none() || id.module.as_deref() == module),
            );
        }

        if requested.is_empty() {
            let target = module.unwrap_or("<all modules>");
            return Err(BuildError::TaskNotFound(format!("{} for {}", self.name(), target)));
        }
        Ok(requested)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub goal: Goal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub schedule: ScheduleReport,
    /// Test outcomes per module path
    pub tests: BTreeMap<String, TestResultSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployReport>,
    /// Packages and bundles of successful tasks
    pub artifacts: Vec<Artifact>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

impl RunReport {
    /// True when every requested task succeeded
    pub fn succeeded(&self) -> bool {
        self.schedule.succeeded()
    }
}

/// Main orchestrator for builds, deployment, and reference extraction
pub struct Orchestrator {
    config: ResolvedConfig,
    modules: ModuleGraph,
    tasks: TaskGraph,
    layout: Layout,
    classifier: TestClassifier,
    toolchain: Box<dyn Toolchain>,
    decompiler: Option<Box<dyn Decompiler>>,
    cache: Mutex<FingerprintCache>,
    test_results: Mutex<BTreeMap<String, TestResultSet>>,
    deploy_report: Mutex<Option<DeployReport>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Orchestrator {
    /// Validate the module graph and derive the task graph.
    ///
    /// Configuration errors surface here, before any task can run.
    pub fn new(config: ResolvedConfig) -> BuildResult<Self> {
        let modules = ModuleGraph::load(&config)?;
        let tasks = TaskGraph::build(&modules);
        let layout = Layout::from_config(&config);

        let toolchain = CommandToolchain::new(config.toolchain.clone(), &config.project_root);
        let decompiler: Option<Box<dyn Decompiler>> = if config.decompiler.is_empty() {
            None
        } else {
            Some(Box::new(ProcessDecompiler::new(
                config.decompiler.clone(),
                &config.project_root,
            )))
        };

        debug!(
            modules = modules.len(),
            tasks = tasks.len(),
            "derived task graph"
        );

        Ok(Self {
            classifier: TestClassifier::new(&config.contract_marker),
            cache: Mutex::new(FingerprintCache::load(layout.fingerprint_file())),
            toolchain: Box::new(toolchain),
            test_results: Mutex::new(BTreeMap::new()),
            deploy_report: Mutex::new(None),
            decompiler,
            config,
            modules,
            tasks,
            layout,
        })
    }

    /// Replace the toolchain
    pub fn with_toolchain(mut self, toolchain: Box<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Replace the decompiler
    pub fn with_decompiler(mut self, decompiler: Box<dyn Decompiler>) -> Self {
        self.decompiler = Some(decompiler);
        self
    }

    /// Enable/disable up-to-date checks
    pub fn with_cache(self, enabled: bool) -> Self {
        let cache = self
            .cache
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .with_lookups(enabled);
        Self {
            cache: Mutex::new(cache),
            ..self
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn module_graph(&self) -> &ModuleGraph {
        &self.modules
    }

    pub fn task_graph(&self) -> &TaskGraph {
        &self.tasks
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Run a goal, optionally restricted to one module
    pub fn run(&self, goal: Goal, module: Option<&str>) -> BuildResult<RunReport> {
        let start = Instant::now();
        if let Some(path) = module {
            if self.modules.module(path).is_none() {
                return Err(BuildError::TaskNotFound(format!("module {}", path)));
            }
        }
        let requested = goal.requested(&self.tasks, module)?;
        lock(&self.test_results).clear();
        *lock(&self.deploy_report) = None;

        let closure = self.tasks.closure(&requested)?;
        if closure
            .iter()
            .any(|&idx| self.tasks.task(idx).id.kind == TaskKind::Deploy)
        {
            self.deploy_target()?;
        }

        info!(goal = %goal, requested = requested.len(), "starting run");
        let scheduler = Scheduler::new(self.config.workers).with_fail_fast(self.config.fail_fast);
        let schedule = scheduler.run(&self.tasks, &requested, self)?;

        if let Err(e) = lock(&self.cache).save() {
            warn!(error = %e, "failed to save fingerprint cache, next run rebuilds");
        }

        let artifacts = schedule
            .records
            .iter()
            .filter(|r| r.status.is_success())
            .filter_map(|r| self.produced_artifact(&r.id))
            .collect();

        Ok(RunReport {
            goal,
            module: module.map(str::to_string),
            schedule,
            tests: lock(&self.test_results).clone(),
            deploy: lock(&self.deploy_report).clone(),
            artifacts,
            elapsed: start.elapsed(),
        })
    }

    fn produced_artifact(&self, id: &TaskId) -> Option<Artifact> {
        match id.kind {
            TaskKind::Package => {
                let module = self.modules.module(id.module.as_deref()?)?;
                Some(Artifact::new(
                    ArtifactKind::Package,
                    id.clone(),
                    self.layout.package_path(module),
                ))
            }
            TaskKind::Bundle(kind) => Some(Artifact::new(
                ArtifactKind::Bundle(kind),
                id.clone(),
                self.layout.bundle_path(kind),
            )),
            _ => None,
        }
    }

    // ========================================================================
    // Operations outside the task graph
    // ========================================================================

    fn deployment(&self) -> BuildResult<DeploymentSync> {
        let target = self
            .config
            .mods_dir
            .as_ref()
            .ok_or(BuildError::NoDeployTarget)?;
        Ok(DeploymentSync::new(target, &self.config.config_subdir))
    }

    /// Deployment target and every pattern a deploy may delete
    fn deploy_target(&self) -> BuildResult<(DeploymentSync, OwnedPatterns)> {
        let sync = self.deployment()?;
        sync.check_config_subdir()?;
        let mut patterns = self.artifact_patterns();
        patterns.extend(self.bundle_patterns());
        Ok((sync, OwnedPatterns::new(patterns)?))
    }

    fn artifact_patterns(&self) -> Vec<String> {
        self.modules
            .plugins()
            .map(|m| self.layout.package_pattern(m.name()))
            .collect()
    }

    fn bundle_patterns(&self) -> Vec<String> {
        BundleKind::all()
            .iter()
            .map(|k| k.pattern(self.layout.project_name()))
            .collect()
    }

    /// Delete deployed plugin artifacts from the extension directory
    pub fn clean_deployed_plugins(&self) -> BuildResult<DeployReport> {
        let owned = OwnedPatterns::new(self.artifact_patterns())?;
        let removed = self.deployment()?.clean(&owned)?;
        Ok(DeployReport {
            removed,
            ..Default::default()
        })
    }

    /// Delete deployed bundles from the extension directory
    pub fn clean_deployed_bundles(&self) -> BuildResult<DeployReport> {
        let owned = OwnedPatterns::new(self.bundle_patterns())?;
        let removed = self.deployment()?.clean(&owned)?;
        Ok(DeployReport {
            removed,
            ..Default::default()
        })
    }

    fn reference_pipeline(&self) -> BuildResult<ReferencePipeline> {
        let vendor = self.config.vendor_archive.clone().ok_or_else(|| {
            ConfigError::ValidationError(
                "No vendor archive configured (set reference.vendor_archive or sdk.path)".to_string(),
            )
        })?;
        if self.config.reference_prefixes.is_empty() {
            return Err(ConfigError::ValidationError(
                "reference.prefixes must list at least one entry prefix".to_string(),
            )
            .into());
        }
        Ok(ReferencePipeline {
            vendor_archive: vendor,
            prefixes: self.config.reference_prefixes.clone(),
            work_dir: self.layout.reference_dir(),
            output_dir: self.config.reference_output.clone(),
        })
    }

    /// Filter the vendor archive and decompile it for offline reference
    pub fn decompile_reference(&self) -> BuildResult<ExtractionReport> {
        let pipeline = self.reference_pipeline()?;
        let decompiler = self.decompiler.as_deref().ok_or_else(|| {
            ConfigError::ValidationError(
                "No decompiler command configured (set reference.decompiler)".to_string(),
            )
        })?;
        pipeline.extract_and_decompile(decompiler)
    }

    /// Remove the decompiled reference output
    pub fn clean_reference(&self) -> BuildResult<bool> {
        ReferencePipeline {
            vendor_archive: PathBuf::new(),
            prefixes: Vec::new(),
            work_dir: self.layout.reference_dir(),
            output_dir: self.config.reference_output.clone(),
        }
        .clean()
    }

    // ========================================================================
    // Task actions
    // ========================================================================

    fn module_of(&self, id: &TaskId) -> BuildResult<&Module> {
        id.module
            .as_deref()
            .and_then(|path| self.modules.module(path))
            .ok_or_else(|| BuildError::TaskNotFound(id.to_string()))
    }

    fn sdk_classpath(&self, module: &Module) -> Vec<PathBuf> {
        match (&module.sdk, &self.config.sdk_path) {
            (Some(_), Some(path)) => vec![path.clone()],
            _ => Vec::new(),
        }
    }

    fn classes_of(&self, modules: &[&Module]) -> Vec<PathBuf> {
        modules
            .iter()
            .map(|m| self.layout.classes_dir(&m.path))
            .collect()
    }

    /// Shared fingerprint inputs: identity, SDK, and upstream classes
    fn base_fingerprint(&self, id: &TaskId, module: &Module, upstream: &[&Module]) -> BuildResult<Fingerprinter> {
        let mut fp = Fingerprinter::new(id).value("version", &module.version);
        for path in self.sdk_classpath(module) {
            fp = fp.tree("sdk", &path)?;
        }
        for dep in upstream {
            fp = fp.tree(&dep.path, &self.layout.classes_dir(&dep.path))?;
        }
        Ok(fp)
    }

    fn up_to_date(&self, id: &TaskId, fingerprint: &str, outputs: &[PathBuf]) -> bool {
        let fresh = lock(&self.cache).is_up_to_date(id, fingerprint, outputs);
        if fresh {
            info!(task = %id, "up to date");
        }
        fresh
    }

    /// Record or clear the fingerprint depending on the result
    fn settle<T>(&self, id: &TaskId, fingerprint: String, result: BuildResult<T>) -> BuildResult<T> {
        let mut cache = lock(&self.cache);
        match &result {
            Ok(_) => cache.record(id, fingerprint),
            Err(_) => cache.invalidate(id),
        }
        result
    }

    fn compile(&self, id: &TaskId) -> BuildResult<TaskOutcome> {
        let module = self.module_of(id)?;
        let main_deps = self.modules.main_closure(&module.path);
        let test_deps = self.modules.test_closure(&module.path);

        let fingerprint = self
            .base_fingerprint(id, module, &test_deps)?
            .value("compile", &self.config.toolchain.compile.join(" "))
            .tree("sources", &module.source_root)?
            .tree("tests", &module.test_root)?
            .finish();

        let classes = self.layout.classes_dir(&module.path);
        let test_classes = self.layout.test_classes_dir(&module.path);
        let mut outputs = vec![classes.clone()];
        if module.test_root.is_dir() {
            outputs.push(test_classes.clone());
        }
        if self.up_to_date(id, &fingerprint, &outputs) {
            return Ok(TaskOutcome::UpToDate);
        }

        let result = (|| -> BuildResult<TaskOutcome> {
            reset_dir(&classes)?;
            remove_dir(&test_classes)?;

            let mut classpath = self.classes_of(&main_deps);
            classpath.extend(self.sdk_classpath(module));
            if module.source_root.is_dir() {
                info!(module = %module.path, "compiling main sources");
                self.toolchain
                    .compile(&CompileRequest {
                        module: module.path.clone(),
                        scope: CompileScope::Main,
                        source_root: module.source_root.clone(),
                        classpath,
                        output_dir: classes.clone(),
                    })
                    .map_err(|e| BuildError::compilation(&module.path, e))?;
            }

            if module.test_root.is_dir() {
                reset_dir(&test_classes)?;
                let mut classpath = vec![classes.clone()];
                classpath.extend(self.classes_of(&test_deps));
                classpath.extend(self.sdk_classpath(module));
                info!(module = %module.path, "compiling test sources");
                self.toolchain
                    .compile(&CompileRequest {
                        module: module.path.clone(),
                        scope: CompileScope::Test,
                        source_root: module.test_root.clone(),
                        classpath,
                        output_dir: test_classes.clone(),
                    })
                    .map_err(|e| BuildError::compilation(&module.path, e))?;
            }
            Ok(TaskOutcome::Executed)
        })();

        self.settle(id, fingerprint, result)
    }

    fn test(&self, id: &TaskId, suite: SuiteKind) -> BuildResult<TaskOutcome> {
        let module = self.module_of(id)?;
        let test_deps = self.modules.test_closure(&module.path);
        let classes = self.layout.classes_dir(&module.path);
        let test_classes = self.layout.test_classes_dir(&module.path);
        let report_dir = self.layout.test_results_dir(&module.path, suite);
        let result_file = report_dir.join(RESULT_FILE);

        let fingerprint = self
            .base_fingerprint(id, module, &test_deps)?
            .value("marker", &self.config.contract_marker)
            .value("test", &self.config.toolchain.test.join(" "))
            .tree("tests", &module.test_root)?
            .tree("classes", &classes)?
            .tree("test-classes", &test_classes)?
            .finish();

        if self.up_to_date(id, &fingerprint, &[result_file.clone()]) {
            if let Some(previous) = read_result(&result_file) {
                self.record_result(&module.path, previous);
                return Ok(TaskOutcome::UpToDate);
            }
        }

        let result = (|| -> BuildResult<TaskOutcome> {
            let plan = self.classifier.classify(&module.test_root)?;
            let cases = plan.select(suite).to_vec();
            reset_dir(&report_dir)?;

            let outcome = if cases.is_empty() {
                debug!(module = %module.path, %suite, "no test cases");
                SuiteResult::no_tests(suite)
            } else {
                let mut classpath = vec![test_classes.clone(), classes.clone()];
                classpath.extend(self.classes_of(&test_deps));
                classpath.extend(self.sdk_classpath(module));
                info!(module = %module.path, %suite, cases = cases.len(), "running tests");
                self.toolchain
                    .run_tests(&TestRequest {
                        module: module.path.clone(),
                        suite,
                        test_root: module.test_root.clone(),
                        test_classes_dir: test_classes.clone(),
                        classpath,
                        cases,
                        report_dir: report_dir.clone(),
                    })
                    .unwrap_or_else(|error| SuiteResult::error(suite, error))
            };

            self.record_result(&module.path, outcome.clone());
            if !outcome.is_success() {
                return Err(BuildError::TestFailure {
                    module: module.path.clone(),
                    suite: suite.name().to_string(),
                    result: outcome,
                });
            }
            write_result(&result_file, &outcome)?;
            Ok(TaskOutcome::Executed)
        })();

        self.settle(id, fingerprint, result)
    }

    fn record_result(&self, module: &str, result: SuiteResult) {
        lock(&self.test_results)
            .entry(module.to_string())
            .or_default()
            .record(result);
    }

    fn package(&self, id: &TaskId, context: &TaskContext) -> BuildResult<TaskOutcome> {
        let module = self.module_of(id)?;
        let gate = TaskId::module(&module.path, TaskKind::UnitTest);
        if !context.status_of(&gate).is_some_and(|s| s.is_success()) {
            return Err(BuildError::PackagingGate {
                module: module.path.clone(),
            });
        }

        let deps = self.modules.main_closure(&module.path);
        let inputs = PackageInputs {
            module: module.path.clone(),
            classes: self.layout.classes_dir(&module.path),
            resources: module.resource_root.clone(),
            dependencies: deps
                .iter()
                .map(|d| {
                    (
                        d.path.clone(),
                        self.layout.classes_dir(&d.path),
                        d.resource_root.clone(),
                    )
                })
                .collect(),
        };

        let mut fp = Fingerprinter::new(id)
            .value("version", &module.version)
            .value("extension", self.layout.extension())
            .tree("classes", &inputs.classes)?
            .tree("resources", &inputs.resources)?;
        for (path, classes, resources) in &inputs.dependencies {
            fp = fp
                .tree(&format!("{} classes", path), classes)?
                .tree(&format!("{} resources", path), resources)?;
        }
        let fingerprint = fp.finish();

        let output = self.layout.package_path(module);
        if self.up_to_date(id, &fingerprint, &[output.clone()]) {
            return Ok(TaskOutcome::UpToDate);
        }

        info!(module = %module.path, artifact = %output.display(), "packaging");
        let result = packager::package(&output, &inputs).map(|_| TaskOutcome::Executed);
        self.settle(id, fingerprint, result)
    }

    fn plugin_artifacts(&self) -> Vec<PathBuf> {
        self.modules
            .plugins()
            .map(|m| self.layout.package_path(m))
            .collect()
    }

    fn bundle(&self, id: &TaskId, kind: BundleKind) -> BuildResult<TaskOutcome> {
        let artifacts = self.plugin_artifacts();
        let mut fp = Fingerprinter::new(id)
            .value("subdir", &self.config.config_subdir.to_string_lossy());
        for artifact in &artifacts {
            fp = fp.tree(&artifact.to_string_lossy(), artifact)?;
        }
        if kind == BundleKind::ModsRelease {
            if let Some(config) = &self.config.config_source {
                fp = fp.tree("config", config)?;
            }
        }
        let fingerprint = fp.finish();

        let output = self.layout.bundle_path(kind);
        if self.up_to_date(id, &fingerprint, &[output.clone()]) {
            return Ok(TaskOutcome::UpToDate);
        }

        info!(bundle = %output.display(), plugins = artifacts.len(), "bundling");
        let result = match kind {
            BundleKind::PluginJars => packager::bundle_plugin_jars(&output, &artifacts),
            BundleKind::ModsRelease => packager::bundle_mods_release(
                &output,
                &artifacts,
                self.config.config_source.as_deref(),
                &self.config.config_subdir,
            ),
        }
        .map(|_| TaskOutcome::Executed);
        self.settle(id, fingerprint, result)
    }

    fn deploy(&self) -> BuildResult<TaskOutcome> {
        let (sync, owned) = self.deploy_target()?;

        info!(target = %sync.target().display(), "deploying plugins");
        let report = sync.deploy(
            &owned,
            &self.plugin_artifacts(),
            self.config.config_source.as_deref(),
        )?;
        *lock(&self.deploy_report) = Some(report);
        Ok(TaskOutcome::Executed)
    }
}

impl TaskExecutor for Orchestrator {
    fn execute(&self, task: &Task, context: &TaskContext) -> BuildResult<TaskOutcome> {
        match task.id.kind {
            TaskKind::Compile => self.compile(&task.id),
            TaskKind::UnitTest => self.test(&task.id, SuiteKind::Unit),
            TaskKind::ContractTest => self.test(&task.id, SuiteKind::Contract),
            TaskKind::Package => self.package(&task.id, context),
            TaskKind::Bundle(kind) => self.bundle(&task.id, kind),
            TaskKind::Deploy => self.deploy(),
        }
    }
}

fn remove_dir(dir: &Path) -> BuildResult<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
    }
    Ok(())
}

/// Remove stale output and recreate the directory empty
fn reset_dir(dir: &Path) -> BuildResult<()> {
    remove_dir(dir)?;
    fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))
}

fn read_result(path: &Path) -> Option<SuiteResult> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_result(path: &Path, result: &SuiteResult) -> BuildResult<()> {
    let json = serde_json::to_string_pretty(result)
        .map_err(|e| BuildError::io(path, std::io::Error::other(e)))?;
    fs::write(path, json).map_err(|e| BuildError::io(path, e))
}
