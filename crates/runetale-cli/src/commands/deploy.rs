//! Cleaning the deployment target

use crate::config;
use crate::reporter::RunReporter;
use crate::GlobalArgs;
use anyhow::{Context, Result};

/// Which owned files to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanTarget {
    Plugins,
    Bundles,
}

pub fn clean(args: &GlobalArgs, target: CleanTarget) -> Result<bool> {
    let orchestrator = config::orchestrator(args)?;
    let report = match target {
        CleanTarget::Plugins => orchestrator
            .clean_deployed_plugins()
            .context("Failed to clean deployed plugins")?,
        CleanTarget::Bundles => orchestrator
            .clean_deployed_bundles()
            .context("Failed to clean deployed bundles")?,
    };
    RunReporter::new(args.json).deploy(&report)?;
    Ok(true)
}
