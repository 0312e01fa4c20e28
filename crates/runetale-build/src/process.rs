//! External process invocation for command templates
//!
//! Toolchain and decompiler commands are configured as argument vectors with
//! `{placeholder}` slots. Output is captured; the exit code is authoritative.

use crate::error::{BuildError, BuildResult};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Check if the process succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output
    pub fn output(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str("STDOUT:\n");
            output.push_str(&self.stdout);
            output.push('\n');
        }
        if !self.stderr.is_empty() {
            output.push_str("STDERR:\n");
            output.push_str(&self.stderr);
        }
        output
    }
}

/// Substitute `{key}` placeholders in every argument of a template
pub fn expand(template: &[String], vars: &[(&str, String)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{}}}", key), value)
            })
        })
        .collect()
}

/// Run an expanded command line to completion
pub fn run(tool: &str, argv: &[String], cwd: &Path) -> BuildResult<ProcessOutput> {
    let (program, args) = argv.split_first().ok_or_else(|| BuildError::ProcessLaunch {
        tool: tool.to_string(),
        error: "no command configured".to_string(),
    })?;

    debug!(tool, command = %argv.join(" "), "spawning process");

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BuildError::ProcessLaunch {
            tool: tool.to_string(),
            error: e.to_string(),
        })?
        .wait_with_output()
        .map_err(|e| BuildError::ProcessLaunch {
            tool: tool.to_string(),
            error: e.to_string(),
        })?;

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
