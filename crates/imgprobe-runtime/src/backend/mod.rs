//! Container runtime abstraction.
//!
//! A [`ContainerBackend`] is the harness's only way into the external
//! container runtime: pulling, sandbox creation, port mapping, and log
//! streaming all happen behind it.

pub mod docker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use imgprobe_common::config::HarnessConfig;
use imgprobe_common::error::Result;
use imgprobe_common::types::{ContainerId, PortBinding};
use imgprobe_image::ImageReference;
use serde::{Deserialize, Serialize};

use crate::exec::ExecOutput;

/// Optional runtime configuration for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Container ports to publish on ephemeral host ports.
    pub ports: Vec<u16>,
    /// Command (arguments to the entrypoint) overriding the image default.
    pub command: Vec<String>,
    /// Entrypoint overriding the image default.
    pub entrypoint: Option<String>,
}

impl RuntimeConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Publishes a container port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        if !self.ports.contains(&port) {
            self.ports.push(port);
        }
        self
    }

    /// Sets the command passed to the entrypoint.
    #[must_use]
    pub fn command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the entrypoint.
    #[must_use]
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Replaces the image's own process with one that idles forever, for
    /// images whose default command exits immediately.
    #[must_use]
    pub fn keep_alive(self) -> Self {
        self.entrypoint("tail").command(["-f", "/dev/null"])
    }
}

/// Everything a backend needs to start one container.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Unique container name.
    pub name: String,
    /// Image to run.
    pub image: ImageReference,
    /// Session label value, used to sweep leftovers.
    pub session: String,
    /// Runtime configuration.
    pub config: RuntimeConfig,
    /// Host port each published container port is bound to.
    pub bindings: Vec<PortBinding>,
    /// Bound on reaching the running state (pulling excluded).
    pub startup_timeout: Duration,
}

/// Platform-agnostic container runtime.
///
/// Implementors handle the runtime-specific details of container
/// creation, execution, and teardown.
pub trait ContainerBackend: Send + Sync {
    /// Short name of the runtime, for logs.
    fn name(&self) -> &str;

    /// Checks that the runtime is reachable.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::RuntimeUnavailable` if it is not.
    fn ping(&self) -> Result<()>;

    /// Starts a container and waits until it is running.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::StartFailure` if the image cannot be pulled, the
    /// container cannot be created, or it does not reach the running state
    /// within the request's startup timeout.
    fn start(&self, request: &StartRequest) -> Result<ContainerId>;

    /// Returns all log output of a container since start.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::LogRetrievalFailure` if logs cannot be fetched.
    fn logs(&self, id: &ContainerId) -> Result<String>;

    /// Executes a command inside a running container.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::ExecFailure` if the command cannot be dispatched.
    fn exec(&self, id: &ContainerId, argv: &[String]) -> Result<ExecOutput>;

    /// Force-removes a container. Removing an unknown container succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the removal.
    fn remove(&self, id: &ContainerId) -> Result<()>;

    /// Removes every container carrying the given session label, returning
    /// how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the containers cannot be listed.
    fn sweep(&self, session: &str) -> Result<usize>;
}

/// Creates the backend described by the harness configuration.
///
/// # Errors
///
/// Returns `ProbeError::RuntimeUnavailable` if the runtime binary is missing.
pub fn from_config(config: &HarnessConfig) -> Result<Arc<dyn ContainerBackend>> {
    Ok(Arc::new(docker::DockerCliBackend::from_config(config)?))
}
