//! Build system error types

use crate::testing::SuiteResult;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Config(#[from] runetale_config::ConfigError),

    #[error("Module not found: {module} (required by {required_by})")]
    MissingModule { module: String, required_by: String },

    #[error("Module declared more than once: {0}")]
    DuplicateModule(String),

    #[error("Circular dependency detected: {0}")]
    CyclicDependency(String),

    #[error("Plugin module '{module}' does not declare the SDK dependency")]
    MissingSdk { module: String },

    #[error("Compilation failed for module '{module}': {error}")]
    Compile { module: String, error: String },

    #[error("{suite} tests failed for module '{module}': {result}")]
    TestFailure {
        module: String,
        suite: String,
        result: SuiteResult,
    },

    #[error("Refusing to package '{module}': unit tests did not succeed in this run")]
    PackagingGate { module: String },

    #[error("Packaging failed for '{target}': {error}")]
    Packaging { target: String, error: String },

    #[error("Deployment failed at {path}: {error}")]
    Deployment {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("No deployment target configured (set deploy.mods_dir or RUNETALE_MODS_DIR)")]
    NoDeployTarget,

    #[error("{tool} exited with status {exit_code}: {output}")]
    ExternalProcess {
        tool: String,
        exit_code: i32,
        output: String,
    },

    #[error("Failed to launch {tool}: {error}")]
    ProcessLaunch { tool: String, error: String },

    #[error("Archive error at {path}: {error}")]
    Archive { path: PathBuf, error: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {0} panicked")]
    TaskPanicked(String),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a deployment I/O error
    pub fn deployment(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Deployment {
            path: path.into(),
            error,
        }
    }

    /// Create a compilation error
    pub fn compilation(module: impl Into<String>, error: impl ToString) -> Self {
        Self::Compile {
            module: module.into(),
            error: error.to_string(),
        }
    }

    /// Create an archive error
    pub fn archive(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Create a packaging error
    pub fn packaging(target: impl Into<String>, error: impl ToString) -> Self {
        Self::Packaging {
            target: target.into(),
            error: error.to_string(),
        }
    }

    /// Whether this error stops the whole run rather than one branch of the task graph
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::MissingModule { .. }
                | Self::DuplicateModule(_)
                | Self::CyclicDependency(_)
                | Self::MissingSdk { .. }
                | Self::Deployment { .. }
                | Self::NoDeployTarget
        )
    }
}
