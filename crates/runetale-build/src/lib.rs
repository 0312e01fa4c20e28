//! RuneTale build orchestration
//!
//! Drives a multi-module plugin project from sources to a running server:
//! - Module graph validation and task derivation
//! - Parallel, dependency-ordered task scheduling
//! - Fingerprint-based up-to-date checks
//! - Unit/contract test classification and execution
//! - Reproducible packaging and release bundles
//! - Deployment into a shared extension directory
//! - Vendor reference extraction
//!
//! The entry point is the [`Orchestrator`], built from a
//! [`runetale_config::ResolvedConfig`]. Compilers, test runners and the
//! decompiler sit behind the [`Toolchain`] and [`Decompiler`] traits.

pub mod artifact;
pub mod deploy;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod orchestrator;
pub mod packager;
pub mod process;
pub mod reference;
pub mod scheduler;
pub mod tasks;
pub mod testing;
pub mod toolchain;

// Re-export main types
pub use artifact::{Artifact, ArtifactKind, BundleKind, Layout, SuiteKind};
pub use deploy::{DeployReport, DeploymentSync, OwnedPatterns};
pub use error::{BuildError, BuildResult};
pub use fingerprint::{FingerprintCache, Fingerprinter};
pub use graph::{Module, ModuleDependency, ModuleGraph};
pub use orchestrator::{Goal, Orchestrator, RunReport};
pub use packager::{ArchiveSummary, Layer, PackageInputs};
pub use reference::{Decompiler, ExtractionReport, ProcessDecompiler, ReferencePipeline};
pub use scheduler::{
    ScheduleReport, Scheduler, TaskContext, TaskExecutor, TaskOutcome, TaskRecord, TaskStatus,
};
pub use tasks::{Task, TaskGraph, TaskId, TaskKind};
pub use testing::{SuiteOutcome, SuiteResult, TestCase, TestClassifier, TestPlan, TestResultSet};
pub use toolchain::{
    CommandToolchain, CompileOutput, CompileRequest, CompileScope, TestRequest, Toolchain,
};
