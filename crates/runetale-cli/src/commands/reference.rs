//! Vendor reference extraction commands

use crate::config;
use crate::reporter::RunReporter;
use crate::GlobalArgs;
use anyhow::{Context, Result};

/// Filter the vendor archive and decompile it
pub fn decompile(args: &GlobalArgs) -> Result<bool> {
    let orchestrator = config::orchestrator(args)?;
    let report = orchestrator
        .decompile_reference()
        .context("Reference extraction failed")?;

    let reporter = RunReporter::new(args.json);
    if !args.json {
        println!(
            "Filtered {} entries ({} dropped) into {}",
            report.filtered.kept,
            report.filtered.dropped,
            report.filtered.path.display()
        );
    }
    reporter.message("decompiled", &report.output_dir, true)?;
    Ok(true)
}

/// Remove decompiled output
pub fn clean(args: &GlobalArgs) -> Result<bool> {
    let orchestrator = config::orchestrator(args)?;
    let removed = orchestrator
        .clean_reference()
        .context("Failed to remove decompiled reference")?;
    RunReporter::new(args.json).message(
        "removed",
        &orchestrator.config().reference_output,
        removed,
    )?;
    Ok(true)
}
