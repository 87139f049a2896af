//! CLI command definitions and dispatch.

pub mod list;
pub mod resolve;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use imgprobe_common::config::HarnessConfig;
use imgprobe_contract::{Contract, catalog, contract};

/// imgprobe — container image contract checks.
#[derive(Parser, Debug)]
#[command(name = "imgprobe", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// YAML harness configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Registry prefix for bare image names (e.g. ghcr.io/aedot).
    #[arg(long, global = true)]
    pub registry: Option<String>,

    /// Pin every image to this tag, as CI does with `IMGPROBE_TAG`.
    #[arg(long, global = true, value_name = "TAG")]
    pub pin_tag: Option<String>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start images and check their contracts.
    Run(run::RunArgs),
    /// List contracts and their checks.
    List(list::ListArgs),
    /// Print the registry reference a logical name resolves to.
    Resolve(resolve::ResolveArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = harness_config(&cli)?;
    match cli.command {
        Command::Run(args) => run::execute(args, &config),
        Command::List(args) => list::execute(&args),
        Command::Resolve(args) => resolve::execute(&args, &config),
    }
}

/// Builds the harness configuration: defaults, then the YAML file, then
/// `IMGPROBE_*` variables, then command-line flags.
fn harness_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let base = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    let mut config = base.with_env_overrides(|key| std::env::var(key).ok())?;
    if let Some(registry) = &cli.registry {
        config.registry.clone_from(registry);
    }
    if let Some(tag) = &cli.pin_tag {
        config.tag_override = Some(tag.clone());
    }
    tracing::debug!(?config, "harness configuration");
    Ok(config)
}

/// Contracts from a manifest, or the built-in catalog when none is given.
fn load_contracts(manifest: Option<&Path>) -> anyhow::Result<Vec<Contract>> {
    match manifest {
        Some(path) => contract::load_manifest(path)
            .with_context(|| format!("loading manifest {}", path.display())),
        None => Ok(catalog::builtin()?),
    }
}
