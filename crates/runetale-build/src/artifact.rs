//! Artifact kinds and the deterministic build output layout
//!
//! Every path here is a pure function of (module, kind, version), so a
//! consumer can refer to an artifact before it has been produced.

use crate::graph::Module;
use crate::tasks::TaskId;
use runetale_config::ResolvedConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Aggregate archive flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleKind {
    /// Plugin artifacts at the archive root
    PluginJars,
    /// Plugin artifacts under `mods/` plus the config tree
    ModsRelease,
}

impl BundleKind {
    /// Infix used in the bundle file name
    pub fn infix(&self) -> &'static str {
        match self {
            Self::PluginJars => "plugin-jars",
            Self::ModsRelease => "mods-bundle",
        }
    }

    /// Bundle file name for a project version
    pub fn file_name(&self, project: &str, version: &str) -> String {
        format!("{}-{}-{}.zip", project, self.infix(), version)
    }

    /// Glob matching every version of this bundle
    pub fn pattern(&self, project: &str) -> String {
        format!("{}-{}-*.zip", glob::Pattern::escape(project), self.infix())
    }

    pub fn all() -> [BundleKind; 2] {
        [Self::PluginJars, Self::ModsRelease]
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.infix())
    }
}

/// Kind of produced file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Compiled main classes directory
    Classes,
    /// Compiled test classes directory
    TestClasses,
    /// Test report directory
    TestResults,
    /// Self-contained plugin archive
    Package,
    /// Aggregate archive
    Bundle(BundleKind),
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classes => write!(f, "classes"),
            Self::TestClasses => write!(f, "test-classes"),
            Self::TestResults => write!(f, "test-results"),
            Self::Package => write!(f, "package"),
            Self::Bundle(kind) => write!(f, "bundle ({})", kind),
        }
    }
}

/// A produced file or directory with its producing task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub producer: TaskId,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, producer: TaskId, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            producer,
            path: path.into(),
        }
    }

    /// Whether the artifact is present on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// Which test subset a report directory belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuiteKind {
    Unit,
    Contract,
}

impl SuiteKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Contract => "contract",
        }
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build directory layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    build_dir: PathBuf,
    project_name: String,
    version: String,
    extension: String,
}

impl Layout {
    pub fn new(
        build_dir: impl Into<PathBuf>,
        project_name: impl Into<String>,
        version: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            build_dir: build_dir.into(),
            project_name: project_name.into(),
            version: version.into(),
            extension: extension.into(),
        }
    }

    /// Layout for a resolved configuration
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            &config.build_dir,
            &config.project_name,
            &config.version,
            &config.artifact_extension,
        )
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Output namespace of a module
    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.build_dir.join(module)
    }

    pub fn classes_dir(&self, module: &str) -> PathBuf {
        self.module_dir(module).join("classes").join("main")
    }

    pub fn test_classes_dir(&self, module: &str) -> PathBuf {
        self.module_dir(module).join("classes").join("test")
    }

    pub fn test_results_dir(&self, module: &str, suite: SuiteKind) -> PathBuf {
        self.module_dir(module).join("test-results").join(suite.name())
    }

    /// Artifact file name: `<name>-<version>.<ext>`
    pub fn package_file_name(&self, module: &Module) -> String {
        format!("{}-{}.{}", module.name(), module.version, self.extension)
    }

    /// `<build>/<module-path>/libs/<name>-<version>.<ext>`
    pub fn package_path(&self, module: &Module) -> PathBuf {
        self.module_dir(&module.path)
            .join("libs")
            .join(self.package_file_name(module))
    }

    /// Glob matching every version of a module's artifact
    pub fn package_pattern(&self, module_name: &str) -> String {
        format!(
            "{}-*.{}",
            glob::Pattern::escape(module_name),
            glob::Pattern::escape(&self.extension)
        )
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.build_dir.join("bundles")
    }

    pub fn bundle_path(&self, kind: BundleKind) -> PathBuf {
        self.bundles_dir()
            .join(kind.file_name(&self.project_name, &self.version))
    }

    /// Persistent fingerprint store
    pub fn fingerprint_file(&self) -> PathBuf {
        self.build_dir.join(".runetale").join("fingerprints.json")
    }

    /// Working directory of the reference extraction pipeline
    pub fn reference_dir(&self) -> PathBuf {
        self.build_dir.join("reference")
    }
}
