//! System-wide constants, defaults, and environment variable names.

/// Registry prefix prepended to bare logical image names.
pub const DEFAULT_REGISTRY: &str = "ghcr.io/aedot";

/// Registry used when a name carries none and no prefix is configured.
pub const FALLBACK_REGISTRY: &str = "docker.io";

/// Tag applied when neither the name nor any override carries one.
pub const DEFAULT_TAG: &str = "rolling";

/// Container runtime CLI used by the default backend.
pub const DEFAULT_RUNTIME_BINARY: &str = "docker";

/// Seconds a container may take to reach the running state.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Seconds an image pull may take before start is abandoned.
pub const DEFAULT_PULL_TIMEOUT_SECS: u64 = 300;

/// Seconds a single exec may run before it is killed.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;

/// Seconds to wait before re-reading logs for asynchronous startup output.
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 5;

/// Seconds an HTTP readiness check keeps polling.
pub const DEFAULT_HTTP_DEADLINE_SECS: u64 = 30;

/// Milliseconds between HTTP readiness polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Maximum tag length accepted by OCI registries.
pub const MAX_TAG_LENGTH: usize = 128;

/// Prefix of every container name created by the harness.
pub const CONTAINER_NAME_PREFIX: &str = "imgprobe";

/// Label key carrying the runtime session ID on every container.
pub const SESSION_LABEL: &str = "io.imgprobe.session";

/// Application name used in CLI output.
pub const APP_NAME: &str = "imgprobe";

/// Environment variable: registry prefix.
pub const ENV_REGISTRY: &str = "IMGPROBE_REGISTRY";
/// Environment variable: default tag.
pub const ENV_DEFAULT_TAG: &str = "IMGPROBE_DEFAULT_TAG";
/// Environment variable: tag pinned by CI, wins over per-test overrides.
pub const ENV_TAG: &str = "IMGPROBE_TAG";
/// Environment variable: full image reference replacing the logical name.
pub const ENV_TEST_IMAGE: &str = "IMGPROBE_TEST_IMAGE";
/// Environment variable: container runtime binary.
pub const ENV_RUNTIME: &str = "IMGPROBE_RUNTIME";
/// Environment variable: startup timeout in seconds.
pub const ENV_STARTUP_TIMEOUT: &str = "IMGPROBE_STARTUP_TIMEOUT";
/// Environment variable: settle delay in seconds.
pub const ENV_SETTLE_DELAY: &str = "IMGPROBE_SETTLE_DELAY";
/// Environment variable: HTTP readiness deadline in seconds.
pub const ENV_HTTP_DEADLINE: &str = "IMGPROBE_HTTP_DEADLINE";
/// Environment variable: directory receiving archived container logs.
pub const ENV_LOG_DIR: &str = "IMGPROBE_LOG_DIR";
