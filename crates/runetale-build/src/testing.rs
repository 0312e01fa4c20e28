//! Test classification and results
//!
//! A module's test root is partitioned into unit and contract cases. Only
//! test classes count as cases: files whose stem starts with `Test` or ends
//! with `Test`, `Tests` or `TestCase`. Helpers and fixtures under the test
//! root are ignored.
//!
//! The configured marker (`@ContractTest` by default) tags either a whole
//! class or single methods. A class tagged at type level is a contract case
//! only. A class with tagged methods is selected by both suites, and the
//! runner's tag expression splits it by method, so no method runs twice.
//! Placement is decided textually: a marker before the first type
//! declaration is a type-level tag.

use crate::artifact::SuiteKind;
use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A single discovered test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Dotted name derived from the path under the test root
    pub name: String,
    pub path: PathBuf,
    pub suite: SuiteKind,
}

/// Test cases of one module, partitioned by classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestPlan {
    pub unit: Vec<TestCase>,
    pub contract: Vec<TestCase>,
}

impl TestPlan {
    /// Cases of one suite
    pub fn select(&self, suite: SuiteKind) -> &[TestCase] {
        match suite {
            SuiteKind::Unit => &self.unit,
            SuiteKind::Contract => &self.contract,
        }
    }

    /// Total number of suite selections; a class with tagged methods counts twice
    pub fn len(&self) -> usize {
        self.unit.len() + self.contract.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tag-based test partitioner
#[derive(Debug, Clone)]
pub struct TestClassifier {
    marker: String,
}

impl TestClassifier {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Discover and classify every case under a test root.
    ///
    /// A missing test root yields an empty plan.
    pub fn classify(&self, test_root: &Path) -> BuildResult<TestPlan> {
        let mut plan = TestPlan::default();
        if !test_root.is_dir() {
            return Ok(plan);
        }

        for entry in WalkDir::new(test_root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(test_root).to_path_buf();
                BuildError::io(path, e.into())
            })?;
            if !entry.file_type().is_file()
                || is_hidden(entry.path())
                || !is_test_class(entry.path())
            {
                continue;
            }

            let source = fs::read(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
            let name = case_name(test_root, entry.path());
            let case = |suite| TestCase {
                name: name.clone(),
                path: entry.path().to_path_buf(),
                suite,
            };
            match self.placement(&source) {
                Placement::Untagged => plan.unit.push(case(SuiteKind::Unit)),
                Placement::Type => plan.contract.push(case(SuiteKind::Contract)),
                Placement::Members => {
                    plan.unit.push(case(SuiteKind::Unit));
                    plan.contract.push(case(SuiteKind::Contract));
                }
            }
        }

        Ok(plan)
    }

    fn placement(&self, source: &[u8]) -> Placement {
        let Some(marker) = find(source, self.marker.as_bytes()) else {
            return Placement::Untagged;
        };
        let declaration = TYPE_KEYWORDS
            .iter()
            .filter_map(|k| find(source, k.as_bytes()))
            .min();
        match declaration {
            Some(at) if at < marker => Placement::Members,
            _ => Placement::Type,
        }
    }
}

/// Where the contract marker sits in a test class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Untagged,
    Type,
    Members,
}

const TYPE_KEYWORDS: [&str; 4] = ["class ", "interface ", "record ", "enum "];

/// Tag expression handed to the test runner for a suite
pub fn tag_expression(suite: SuiteKind) -> &'static str {
    match suite {
        SuiteKind::Unit => "!contract",
        SuiteKind::Contract => "contract",
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn is_test_class(path: &Path) -> bool {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) else {
        return false;
    };
    stem.starts_with("Test")
        || stem.ends_with("Test")
        || stem.ends_with("Tests")
        || stem.ends_with("TestCase")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn case_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join(".")
}

/// Tri-state outcome of a suite run, plus the "nothing to run" case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuiteOutcome {
    Passed,
    Failed,
    /// The runner itself broke (could not start, crashed)
    Error,
    /// No case of this classification exists
    NoTests,
}

impl SuiteOutcome {
    /// Whether the suite counts as successful
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed | Self::NoTests)
    }
}

impl fmt::Display for SuiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
            Self::NoTests => write!(f, "no tests"),
        }
    }
}

/// Outcome of one suite of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite: SuiteKind,
    pub outcome: SuiteOutcome,
    /// Number of executed cases
    pub executed: usize,
    /// Number of failed cases, when the runner reports it
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuiteResult {
    pub fn passed(suite: SuiteKind, executed: usize) -> Self {
        Self {
            suite,
            outcome: SuiteOutcome::Passed,
            executed,
            failed: 0,
            message: None,
        }
    }

    pub fn failed(suite: SuiteKind, executed: usize, failed: usize) -> Self {
        Self {
            suite,
            outcome: SuiteOutcome::Failed,
            executed,
            failed,
            message: None,
        }
    }

    pub fn error(suite: SuiteKind, message: impl Into<String>) -> Self {
        Self {
            suite,
            outcome: SuiteOutcome::Error,
            executed: 0,
            failed: 0,
            message: Some(message.into()),
        }
    }

    pub fn no_tests(suite: SuiteKind) -> Self {
        Self {
            suite,
            outcome: SuiteOutcome::NoTests,
            executed: 0,
            failed: 0,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

impl fmt::Display for SuiteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            SuiteOutcome::NoTests => write!(f, "no tests"),
            SuiteOutcome::Failed => write!(
                f,
                "{} of {} failed",
                self.failed, self.executed
            ),
            _ => write!(f, "{} ({} executed)", self.outcome, self.executed),
        }?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Both suite outcomes of a module; `None` when the suite did not run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultSet {
    pub unit: Option<SuiteResult>,
    pub contract: Option<SuiteResult>,
}

impl TestResultSet {
    pub fn record(&mut self, result: SuiteResult) {
        match result.suite {
            SuiteKind::Unit => self.unit = Some(result),
            SuiteKind::Contract => self.contract = Some(result),
        }
    }

    pub fn get(&self, suite: SuiteKind) -> Option<&SuiteResult> {
        match suite {
            SuiteKind::Unit => self.unit.as_ref(),
            SuiteKind::Contract => self.contract.as_ref(),
        }
    }
}
