//! `imgprobe resolve` — Print the reference a logical name resolves to.

use clap::Args;
use imgprobe_common::config::HarnessConfig;
use imgprobe_image::Resolver;

/// Arguments for the `resolve` command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Logical image name (e.g. `auto-m4b` or `ghcr.io/aedot/auto-m4b:alpine`).
    pub name: String,

    /// Tag to use unless CI pins one.
    #[arg(short, long)]
    pub tag: Option<String>,
}

/// Executes the `resolve` command.
///
/// # Errors
///
/// Returns an error if the name cannot be parsed.
#[allow(clippy::print_stdout)]
pub fn execute(args: &ResolveArgs, config: &HarnessConfig) -> anyhow::Result<()> {
    let reference = Resolver::from_config(config)?.resolve(&args.name, args.tag.as_deref())?;
    println!("{reference}");
    Ok(())
}
