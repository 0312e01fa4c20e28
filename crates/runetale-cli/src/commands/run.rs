//! Goal commands - build, test, bundle and deploy through the task graph

use crate::config;
use crate::reporter::RunReporter;
use crate::GlobalArgs;
use anyhow::{Context, Result};
use runetale_build::Goal;
use tracing::debug;

/// Run a goal and report it; returns whether every requested task succeeded
pub fn run(args: &GlobalArgs, goal: Goal, module: Option<String>) -> Result<bool> {
    let orchestrator = config::orchestrator(args)?;
    debug!(
        workers = orchestrator.config().workers,
        fail_fast = orchestrator.config().fail_fast,
        "configuration resolved"
    );

    let report = orchestrator
        .run(goal, module.as_deref())
        .with_context(|| format!("{} failed", goal))?;

    RunReporter::new(args.json).report(&report)?;
    Ok(report.succeeded())
}
