use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use runetale_build::Goal;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod reporter;

/// RuneTale plugin workspace orchestrator.
///
/// Builds, tests, packages and deploys the modules declared in runetale.toml,
/// and extracts decompiled vendor reference sources.
///
/// EXAMPLES:
///     runetale build                        Compile, unit test and package everything
///     runetale unit-test --module libs/core Run one module's unit suite
///     runetale deploy-plugins-to-run        Package and deploy into the mods directory
///     runetale graph                        Show modules and task order
///
/// ENVIRONMENT VARIABLES:
///     RUNETALE_MODS_DIR   Deployment target directory
///     RUNETALE_WORKERS    Scheduler worker count
///     RUNETALE_FAIL_FAST  Cancel pending tasks after the first failure
///     RUNETALE_BUILD_DIR  Build output directory
///     RUST_LOG            Log filter (overrides -v)
///     NO_COLOR            Set to disable colored output
#[derive(Parser)]
#[command(name = "runetale")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Directory to start the runetale.toml search from
    #[arg(long, global = true, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Number of tasks to run in parallel
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Cancel tasks that have not started after the first failure
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Ignore up-to-date checks and run every task
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Print a machine-readable JSON report
    #[arg(long, global = true, env = "RUNETALE_JSON")]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every module, run unit tests, package every plugin
    #[command(visible_alias = "b")]
    Build {
        /// Restrict to one module path
        #[arg(long)]
        module: Option<String>,
    },

    /// Run unit test suites
    UnitTest {
        /// Restrict to one module path
        #[arg(long)]
        module: Option<String>,
    },

    /// Run contract test suites
    ContractTest {
        /// Restrict to one module path
        #[arg(long)]
        module: Option<String>,
    },

    /// Run unit and contract test suites
    #[command(visible_alias = "t")]
    VerifyTests {
        /// Restrict to one module path
        #[arg(long)]
        module: Option<String>,
    },

    /// Package plugins and deploy them into the mods directory
    ///
    /// Removes previously deployed artifacts owned by this project, mirrors
    /// the config tree, then copies fresh artifacts. Foreign files are
    /// left untouched.
    #[command(visible_alias = "deploy")]
    DeployPluginsToRun,

    /// Zip every plugin artifact
    BundlePluginJars,

    /// Zip plugin artifacts under mods/ together with the config tree
    BundleModsRelease,

    /// Delete deployed plugin artifacts from the mods directory
    CleanDeployedPlugins,

    /// Delete deployed bundles from the mods directory
    CleanDeployedPluginBundles,

    /// Filter the vendor archive and decompile it for reference
    DecompileServerJar,

    /// Remove the decompiled reference sources
    CleanDecompiledReference,

    /// Print modules in dependency order and the derived tasks
    Graph,

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     runetale completions bash > ~/.local/share/bash-completion/completions/runetale
    ///     runetale completions zsh > ~/.zfunc/_runetale
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a subcommand; `Ok(false)` means it ran but did not succeed
fn run(cli: Cli) -> Result<bool> {
    let global = cli.global;
    let goal = |goal: Goal, module: Option<String>| commands::run::run(&global, goal, module);

    match cli.command {
        Commands::Build { module } => goal(Goal::Build, module),
        Commands::UnitTest { module } => goal(Goal::UnitTest, module),
        Commands::ContractTest { module } => goal(Goal::ContractTest, module),
        Commands::VerifyTests { module } => goal(Goal::VerifyTests, module),
        Commands::DeployPluginsToRun => goal(Goal::DeployPluginsToRun, None),
        Commands::BundlePluginJars => goal(Goal::BundlePluginJars, None),
        Commands::BundleModsRelease => goal(Goal::BundleModsRelease, None),
        Commands::CleanDeployedPlugins => {
            commands::deploy::clean(&global, commands::deploy::CleanTarget::Plugins)
        }
        Commands::CleanDeployedPluginBundles => {
            commands::deploy::clean(&global, commands::deploy::CleanTarget::Bundles)
        }
        Commands::DecompileServerJar => commands::reference::decompile(&global),
        Commands::CleanDecompiledReference => commands::reference::clean(&global),
        Commands::Graph => commands::graph::run(&global),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(true)
        }
    }
}
