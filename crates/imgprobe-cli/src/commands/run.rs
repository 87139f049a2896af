//! `imgprobe run` — Start images and check their contracts.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context as _, bail};
use clap::Args;
use imgprobe_common::config::HarnessConfig;
use imgprobe_contract::{CancelToken, Contract, EvalPolicy, contract};
use imgprobe_image::Resolver;
use imgprobe_runtime::{LifecycleManager, RuntimeSession};

use crate::output::{self, BOLD, DIM, GREEN, RED, RESET, YELLOW};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Contracts to run, by name.
    pub names: Vec<String>,

    /// YAML manifest to take contracts from instead of the built-in catalog.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Run every contract.
    #[arg(short, long, conflicts_with = "names")]
    pub all: bool,

    /// Abort each contract run after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Archive container logs into this directory.
    #[arg(long, env = imgprobe_common::constants::ENV_LOG_DIR)]
    pub log_dir: Option<PathBuf>,
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if no contract was selected, the runtime is not
/// reachable, or any contract failed.
pub fn execute(args: RunArgs, config: &HarnessConfig) -> anyhow::Result<()> {
    let contracts = select(super::load_contracts(args.manifest.as_deref())?, &args)?;
    check_image_override(config, &contracts)?;
    let resolver = Resolver::from_config(config)?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let session = RuntimeSession::init(config)?;
    let mut lifecycle = LifecycleManager::new(&session, config);
    if let Some(dir) = &args.log_dir {
        lifecycle = lifecycle.with_log_dir(dir);
    }

    eprintln!();
    eprintln!(
        "  {BOLD}imgprobe{RESET} {DIM}v{} · {} contract(s){RESET}",
        env!("CARGO_PKG_VERSION"),
        contracts.len()
    );
    eprintln!();

    let started = Instant::now();
    let mut failed = Vec::new();
    let mut skipped = 0usize;
    for contract in &contracts {
        if cancel.is_cancelled() {
            skipped += 1;
            continue;
        }
        let mut policy = EvalPolicy::from_config(config).with_cancel(cancel.clone());
        if let Some(secs) = args.timeout {
            policy = policy.with_run_timeout(Duration::from_secs(secs));
        }
        match contract.execute(&resolver, &lifecycle, &policy) {
            Ok(report) => {
                output::print_report(&contract.name, &report);
                if !report.passed() {
                    failed.push(contract.name.clone());
                }
            }
            Err(e) => {
                eprintln!("  {RED}{BOLD}FAIL{RESET} {BOLD}{}{RESET}", contract.name);
                eprintln!("{DIM}{}{RESET}", output::indent(&e.to_string(), 8));
                eprintln!();
                failed.push(contract.name.clone());
                if e.is_infrastructure() {
                    break;
                }
            }
        }
    }

    let leftovers = session.shutdown()?;
    if leftovers > 0 {
        eprintln!("  {YELLOW}Removed {leftovers} leftover container(s).{RESET}");
    }

    let total = contracts.len();
    let elapsed = output::format_duration(started.elapsed());
    if skipped > 0 {
        eprintln!("  {YELLOW}Cancelled:{RESET} {skipped} contract(s) not run.");
    }
    if failed.is_empty() && skipped == 0 {
        eprintln!("  {GREEN}{BOLD}All {total} contract(s) passed{RESET} in {elapsed}.");
        return Ok(());
    }
    bail!(
        "{} of {total} contract(s) failed in {elapsed}: {}",
        failed.len() + skipped,
        failed.join(", ")
    )
}

/// Picks the contracts named on the command line, in the order given.
fn select(available: Vec<Contract>, args: &RunArgs) -> anyhow::Result<Vec<Contract>> {
    if args.all {
        return Ok(available);
    }
    if args.names.is_empty() {
        bail!("name at least one contract or pass --all (see `imgprobe list`)");
    }
    let known = || {
        let names: Vec<&str> = available.iter().map(|c| c.name.as_str()).collect();
        format!("available: {}", names.join(", "))
    };
    args.names
        .iter()
        .map(|name| {
            contract::by_name(&available, name)
                .cloned()
                .with_context(known)
        })
        .collect()
}

/// An image override replaces every logical name, so it only makes sense
/// for a single contract.
fn check_image_override(config: &HarnessConfig, contracts: &[Contract]) -> anyhow::Result<()> {
    match &config.image_override {
        Some(image) if contracts.len() != 1 => bail!(
            "{} = {image} applies to one contract, but {} were selected",
            imgprobe_common::constants::ENV_TEST_IMAGE,
            contracts.len()
        ),
        _ => Ok(()),
    }
}
