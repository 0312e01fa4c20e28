//! Toolchain boundary
//!
//! The compiler and test runner are opaque collaborators. The orchestrator
//! only knows the [`Toolchain`] contract; [`CommandToolchain`] implements it
//! by running configured command templates.

use crate::artifact::SuiteKind;
use crate::process;
use crate::testing::{tag_expression, SuiteResult, TestCase};
use runetale_config::ToolchainCommands;
use std::path::PathBuf;
use tracing::debug;

/// Whether a compile request covers main or test sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileScope {
    Main,
    Test,
}

/// One compiler invocation
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub module: String,
    pub scope: CompileScope,
    pub source_root: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

/// What the compiler reported
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub log: String,
}

/// One test runner invocation over a pre-selected set of cases
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub module: String,
    pub suite: SuiteKind,
    pub test_root: PathBuf,
    pub test_classes_dir: PathBuf,
    /// Main classes, dependency classes, and the SDK
    pub classpath: Vec<PathBuf>,
    pub cases: Vec<TestCase>,
    pub report_dir: PathBuf,
}

impl TestRequest {
    /// Tag filter selecting this request's suite
    pub fn tag_filter(&self) -> &'static str {
        tag_expression(self.suite)
    }
}

/// Compiler and test runner contract
pub trait Toolchain: Send + Sync {
    /// Compile a source root into an output directory
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, String>;

    /// Run the selected cases; `Err` means the runner could not be started
    fn run_tests(&self, request: &TestRequest) -> Result<SuiteResult, String>;
}

/// Toolchain driven by external command templates
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    commands: ToolchainCommands,
    working_dir: PathBuf,
}

impl CommandToolchain {
    pub fn new(commands: ToolchainCommands, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            commands,
            working_dir: working_dir.into(),
        }
    }
}

fn join_classpath(classpath: &[PathBuf]) -> String {
    std::env::join_paths(classpath)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl Toolchain for CommandToolchain {
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, String> {
        let argv = process::expand(
            &self.commands.compile,
            &[
                ("module", request.module.clone()),
                ("source_root", request.source_root.display().to_string()),
                ("classpath", join_classpath(&request.classpath)),
                ("output_dir", request.output_dir.display().to_string()),
            ],
        );

        let output =
            process::run("compiler", &argv, &self.working_dir).map_err(|e| e.to_string())?;
        if output.success() {
            Ok(CompileOutput {
                log: output.output(),
            })
        } else {
            Err(output.output())
        }
    }

    fn run_tests(&self, request: &TestRequest) -> Result<SuiteResult, String> {
        let cases: Vec<&str> = request.cases.iter().map(|c| c.name.as_str()).collect();
        let argv = process::expand(
            &self.commands.test,
            &[
                ("module", request.module.clone()),
                ("test_root", request.test_root.display().to_string()),
                ("classpath", join_classpath(&request.classpath)),
                ("output_dir", request.test_classes_dir.display().to_string()),
                ("test_output_dir", request.report_dir.display().to_string()),
                ("tag_filter", request.tag_filter().to_string()),
                ("cases", cases.join(",")),
            ],
        );

        let output =
            process::run("test runner", &argv, &self.working_dir).map_err(|e| e.to_string())?;
        debug!(module = %request.module, suite = %request.suite, exit_code = output.exit_code, "test runner finished");

        let executed = request.cases.len();
        if output.success() {
            Ok(SuiteResult::passed(request.suite, executed))
        } else {
            // The runner only reports an exit code; count every case as run
            Ok(SuiteResult::failed(request.suite, executed, 0).with_message(output.output()))
        }
    }
}
