//! Contract definitions, their fluent builder, and YAML manifests.

use std::collections::HashSet;
use std::path::Path;

use imgprobe_common::error::{ProbeError, Result};
use imgprobe_image::{ImageReference, Resolver};
use imgprobe_runtime::{Lifecycle, RuntimeConfig};
use serde::{Deserialize, Serialize};

use crate::check::ReadinessCheck;
use crate::policy::EvalPolicy;
use crate::result::ContractReport;
use crate::runner::ContractRunner;

/// The checks an image must pass, with how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract name, unique within a manifest.
    pub name: String,
    /// Logical image name, resolved at run time.
    pub image: String,
    /// Tag for this contract, below CI pins in precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Runtime configuration of the container.
    #[serde(default)]
    pub config: RuntimeConfig,
    /// Checks, evaluated in order.
    pub checks: Vec<ReadinessCheck>,
}

impl Contract {
    /// Starts a builder for a contract named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder::new(name)
    }

    /// Resolves this contract's image.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::InvalidReference` if the image name is malformed.
    pub fn resolve(&self, resolver: &Resolver) -> Result<ImageReference> {
        resolver.resolve(&self.image, self.tag.as_deref())
    }

    /// Resolves the image and runs every check against one container.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be resolved or the container
    /// cannot be started. Check failures are reported, not returned.
    pub fn execute<L: Lifecycle + ?Sized>(
        &self,
        resolver: &Resolver,
        lifecycle: &L,
        policy: &EvalPolicy,
    ) -> Result<ContractReport> {
        let image = self.resolve(resolver)?;
        tracing::info!(contract = %self.name, image = %image, checks = self.checks.len(), "running contract");
        ContractRunner::new(lifecycle, policy.clone()).run(&image, &self.checks, Some(&self.config))
    }
}

/// Fluent construction of a [`Contract`].
#[derive(Debug)]
pub struct ContractBuilder {
    name: String,
    image: Option<String>,
    tag: Option<String>,
    config: RuntimeConfig,
    checks: Vec<ReadinessCheck>,
}

impl ContractBuilder {
    /// Creates a builder with the given contract name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            tag: None,
            config: RuntimeConfig::default(),
            checks: Vec::new(),
        }
    }

    /// Sets the logical image name.
    #[must_use]
    pub fn image(mut self, name: impl Into<String>) -> Self {
        self.image = Some(name.into());
        self
    }

    /// Sets the contract's tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.env(key, value);
        self
    }

    /// Publishes a container port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config = self.config.port(port);
        self
    }

    /// Overrides the container command.
    #[must_use]
    pub fn command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.command(argv);
        self
    }

    /// Keeps an image without a long-running process alive for exec checks.
    #[must_use]
    pub fn keep_alive(mut self) -> Self {
        self.config = self.config.keep_alive();
        self
    }

    /// Appends a check.
    #[must_use]
    pub fn check(mut self, check: ReadinessCheck) -> Self {
        self.checks.push(check);
        self
    }

    /// Builds the contract.
    ///
    /// # Errors
    ///
    /// Returns an error if no image was given or the name is empty.
    pub fn build(self) -> Result<Contract> {
        if self.name.trim().is_empty() {
            return Err(ProbeError::Config {
                message: "contract name must not be empty".to_string(),
            });
        }
        let image = self.image.ok_or_else(|| ProbeError::Config {
            message: format!("contract {:?} has no image", self.name),
        })?;
        Ok(Contract {
            name: self.name,
            image,
            tag: self.tag,
            config: self.config,
            checks: self.checks,
        })
    }
}

/// Finds a contract by name.
///
/// # Errors
///
/// Returns `ProbeError::NotFound` if no contract has that name.
pub fn by_name<'a>(contracts: &'a [Contract], name: &str) -> Result<&'a Contract> {
    contracts
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| ProbeError::NotFound {
            kind: "contract",
            id: name.to_string(),
        })
}

/// Renders contracts as pretty-printed JSON.
///
/// # Errors
///
/// Returns `ProbeError::Serialization` if a contract cannot be encoded.
pub fn to_json(contracts: &[Contract]) -> Result<String> {
    Ok(serde_json::to_string_pretty(contracts)?)
}

#[derive(Debug, Deserialize)]
struct Manifest {
    contracts: Vec<Contract>,
}

/// Parses a YAML manifest of the form `contracts: [...]`.
///
/// # Errors
///
/// Returns `ProbeError::Config` if the YAML is invalid or two contracts
/// share a name.
pub fn parse_manifest(source: &str) -> Result<Vec<Contract>> {
    let manifest: Manifest = serde_yaml::from_str(source).map_err(|e| ProbeError::Config {
        message: format!("invalid contract manifest: {e}"),
    })?;
    let mut seen = HashSet::new();
    for contract in &manifest.contracts {
        if !seen.insert(contract.name.as_str()) {
            return Err(ProbeError::Config {
                message: format!("contract {:?} is defined more than once", contract.name),
            });
        }
    }
    Ok(manifest.contracts)
}

/// Loads a YAML manifest from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_manifest(path: &Path) -> Result<Vec<Contract>> {
    let source = std::fs::read_to_string(path).map_err(|e| ProbeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_manifest(&source).map_err(|e| match e {
        ProbeError::Config { message } => ProbeError::Config {
            message: format!("{}: {message}", path.display()),
        },
        other => other,
    })
}
