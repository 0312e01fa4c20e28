//! Configuration loading for CLI invocations
//!
//! Command line flags become [`Overrides`], the highest-precedence layer on
//! top of the global file, the project file and `RUNETALE_*` variables.

use crate::GlobalArgs;
use anyhow::{Context, Result};
use runetale_build::Orchestrator;
use runetale_config::{ConfigLoader, Overrides, ResolvedConfig};
use std::env;
use std::path::PathBuf;

/// Overrides carried by command line flags
pub fn overrides(args: &GlobalArgs) -> Result<Overrides> {
    let workers = args
        .workers
        .map(usize::try_from)
        .transpose()
        .context("--workers is out of range")?;
    Ok(Overrides {
        workers,
        fail_fast: args.fail_fast.then_some(true),
        ..Default::default()
    })
}

/// Find runetale.toml and resolve every configuration layer
pub fn load(args: &GlobalArgs) -> Result<ResolvedConfig> {
    let start = match &args.project_dir {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("Failed to read current directory")?,
    };
    let start = start
        .canonicalize()
        .with_context(|| format!("Project directory not found: {}", start.display()))?;

    ConfigLoader::new()
        .load_with_overrides(&start, &overrides(args)?)
        .with_context(|| format!("Failed to load configuration from {}", start.display()))
}

/// Resolve configuration and validate the module graph
pub fn orchestrator(args: &GlobalArgs) -> Result<Orchestrator> {
    let config = load(args)?;
    let root: PathBuf = config.project_root.clone();
    let orchestrator = Orchestrator::new(config)
        .with_context(|| format!("Invalid module graph in {}", root.display()))?;
    Ok(orchestrator.with_cache(!args.no_cache))
}
