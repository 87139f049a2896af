//! `imgprobe list` — List contracts and their checks.

use std::path::PathBuf;

use clap::Args;
use imgprobe_contract::contract;

use crate::output::{BOLD, DIM, RESET};

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// YAML manifest to list instead of the built-in catalog.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Print contracts as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded.
#[allow(clippy::print_stdout)]
pub fn execute(args: &ListArgs) -> anyhow::Result<()> {
    let contracts = super::load_contracts(args.manifest.as_deref())?;
    if args.json {
        println!("{}", contract::to_json(&contracts)?);
        return Ok(());
    }
    for contract in &contracts {
        let tag = contract
            .tag
            .as_deref()
            .map_or_else(String::new, |t| format!(":{t}"));
        println!("{BOLD}{}{RESET} {DIM}{}{tag}{RESET}", contract.name, contract.image);
        for check in &contract.checks {
            println!("    {}", check.description());
        }
    }
    Ok(())
}
