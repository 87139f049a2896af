//! Harness configuration model.
//!
//! Values come from three layers, later ones winning: built-in defaults,
//! an optional YAML file, and `IMGPROBE_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{ProbeError, Result};

/// Root configuration for a harness process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Registry prefix prepended to bare logical names (e.g. `ghcr.io/aedot`).
    pub registry: String,
    /// Tag used when nothing else supplies one.
    pub default_tag: String,
    /// Tag pinned for every image, typically by CI.
    pub tag_override: Option<String>,
    /// Full image reference replacing whatever logical name a test asks for.
    pub image_override: Option<String>,
    /// Container runtime CLI.
    pub runtime_binary: String,
    /// Bound on bringing a container to the running state.
    pub startup_timeout_secs: u64,
    /// Bound on pulling an image that is not present locally.
    pub pull_timeout_secs: u64,
    /// Bound on a single command executed inside a container.
    pub exec_timeout_secs: u64,
    /// Delay before logs are re-read by log checks.
    pub settle_delay_secs: u64,
    /// Polling deadline of HTTP readiness checks.
    pub http_deadline_secs: u64,
    /// Interval between HTTP readiness polls.
    pub poll_interval_ms: u64,
    /// Directory receiving archived container logs.
    pub log_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            registry: constants::DEFAULT_REGISTRY.to_string(),
            default_tag: constants::DEFAULT_TAG.to_string(),
            tag_override: None,
            image_override: None,
            runtime_binary: constants::DEFAULT_RUNTIME_BINARY.to_string(),
            startup_timeout_secs: constants::DEFAULT_STARTUP_TIMEOUT_SECS,
            pull_timeout_secs: constants::DEFAULT_PULL_TIMEOUT_SECS,
            exec_timeout_secs: constants::DEFAULT_EXEC_TIMEOUT_SECS,
            settle_delay_secs: constants::DEFAULT_SETTLE_DELAY_SECS,
            http_deadline_secs: constants::DEFAULT_HTTP_DEADLINE_SECS,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            log_dir: None,
        }
    }
}

impl HarnessConfig {
    /// Loads a configuration from a YAML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProbeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ProbeError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Builds the configuration from defaults and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric environment variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `IMGPROBE_*` overrides obtained through `lookup`.
    ///
    /// Empty values are treated as unset so CI matrices can blank a variable.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is present but not a number.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(constants::ENV_REGISTRY) {
            self.registry = v;
        }
        if let Some(v) = get(constants::ENV_DEFAULT_TAG) {
            self.default_tag = v;
        }
        if let Some(v) = get(constants::ENV_TAG) {
            self.tag_override = Some(v);
        }
        if let Some(v) = get(constants::ENV_TEST_IMAGE) {
            self.image_override = Some(v);
        }
        if let Some(v) = get(constants::ENV_RUNTIME) {
            self.runtime_binary = v;
        }
        if let Some(v) = get(constants::ENV_STARTUP_TIMEOUT) {
            self.startup_timeout_secs = parse_secs(constants::ENV_STARTUP_TIMEOUT, &v)?;
        }
        if let Some(v) = get(constants::ENV_SETTLE_DELAY) {
            self.settle_delay_secs = parse_secs(constants::ENV_SETTLE_DELAY, &v)?;
        }
        if let Some(v) = get(constants::ENV_HTTP_DEADLINE) {
            self.http_deadline_secs = parse_secs(constants::ENV_HTTP_DEADLINE, &v)?;
        }
        if let Some(v) = get(constants::ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// Startup timeout as a [`Duration`].
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Pull timeout as a [`Duration`].
    #[must_use]
    pub const fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    /// Exec timeout as a [`Duration`].
    #[must_use]
    pub const fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    /// Settle delay as a [`Duration`].
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// HTTP readiness deadline as a [`Duration`].
    #[must_use]
    pub const fn http_deadline(&self) -> Duration {
        Duration::from_secs(self.http_deadline_secs)
    }

    /// HTTP poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| ProbeError::Config {
        message: format!("{key} must be a whole number of seconds, got {value:?}"),
    })
}
