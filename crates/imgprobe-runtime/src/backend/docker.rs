//! Backend driving the `docker` CLI (or a CLI-compatible runtime such as
//! `podman`).
//!
//! Every call is a bounded child process; the daemon is never talked to
//! directly.

use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use imgprobe_common::config::HarnessConfig;
use imgprobe_common::constants::SESSION_LABEL;
use imgprobe_common::error::{ProbeError, Result};
use imgprobe_common::types::ContainerId;

use super::{ContainerBackend, StartRequest};
use crate::container::PUBLISH_HOST;
use crate::exec::ExecOutput;
use crate::logs::merge_timestamped;
use crate::process::{ProcessOutcome, run_with_deadline};

const STATE_POLL: Duration = Duration::from_millis(100);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Container runtime reached through its command-line client.
#[derive(Debug, Clone)]
pub struct DockerCliBackend {
    binary: PathBuf,
    pull_timeout: Duration,
    exec_timeout: Duration,
    control_timeout: Duration,
}

/// Observed state of a container, from `inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InspectState {
    Running,
    Exited(i32),
    Pending(String),
}

impl DockerCliBackend {
    /// Locates `binary` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::RuntimeUnavailable` if the binary is not found.
    pub fn new(binary: &str) -> Result<Self> {
        let path = which::which(binary).map_err(|e| ProbeError::RuntimeUnavailable {
            binary: binary.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            binary: path,
            pull_timeout: Duration::from_secs(imgprobe_common::constants::DEFAULT_PULL_TIMEOUT_SECS),
            exec_timeout: Duration::from_secs(imgprobe_common::constants::DEFAULT_EXEC_TIMEOUT_SECS),
            control_timeout: CONTROL_TIMEOUT,
        })
    }

    /// Locates the configured runtime binary and applies configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::RuntimeUnavailable` if the binary is not found.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let mut backend = Self::new(&config.runtime_binary)?;
        backend.pull_timeout = config.pull_timeout();
        backend.exec_timeout = config.exec_timeout();
        Ok(backend)
    }

    fn binary_name(&self) -> String {
        self.binary
            .file_name()
            .map_or_else(|| self.binary.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        let _ = cmd.args(args);
        cmd
    }

    /// Runs a control-plane command, mapping a timeout to an error message.
    fn run(&self, args: &[&str], timeout: Duration) -> std::result::Result<ExecOutput, String> {
        match run_with_deadline(&mut self.command(args), timeout) {
            Ok(ProcessOutcome::Finished(output)) => Ok(ExecOutput::from(output)),
            Ok(ProcessOutcome::TimedOut { stderr }) => Err(format!(
                "`{} {}` timed out after {timeout:?}{}",
                self.binary_name(),
                args.first().copied().unwrap_or_default(),
                if stderr.trim().is_empty() {
                    String::new()
                } else {
                    format!(": {}", stderr.trim())
                }
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    fn image_present(&self, image: &str) -> bool {
        matches!(
            self.run(&["image", "inspect", "--format", "{{.Id}}", image], self.control_timeout),
            Ok(out) if out.success()
        )
    }

    fn ensure_image(&self, image: &str) -> Result<()> {
        if self.image_present(image) {
            tracing::debug!(image, "image present locally");
            return Ok(());
        }
        tracing::info!(image, "pulling image");
        let started = Instant::now();
        let out = self
            .run(&["pull", "--quiet", image], self.pull_timeout)
            .map_err(|message| start_failure(image, message))?;
        if !out.success() {
            return Err(start_failure(
                image,
                format!("pull failed: {}", out.stderr.trim()),
            ));
        }
        tracing::info!(image, elapsed = ?started.elapsed(), "image pulled");
        Ok(())
    }

    fn inspect_state(&self, id: &str) -> std::result::Result<InspectState, String> {
        let out = self.run(
            &["inspect", "--format", "{{.State.Status}} {{.State.ExitCode}}", id],
            self.control_timeout,
        )?;
        if !out.success() {
            return Err(out.stderr.trim().to_string());
        }
        Ok(parse_state(&out.stdout))
    }

    fn wait_for_running(&self, request: &StartRequest, id: &ContainerId) -> Result<()> {
        let image = request.image.to_string();
        let deadline = Instant::now() + request.startup_timeout;
        loop {
            match self.inspect_state(id.as_str()) {
                Ok(InspectState::Running) => return Ok(()),
                Ok(InspectState::Exited(code)) => {
                    let logs = self.logs(id).unwrap_or_default();
                    return Err(start_failure(
                        &image,
                        format!("container exited with code {code} before running\n{logs}"),
                    ));
                }
                Ok(InspectState::Pending(state)) => {
                    tracing::trace!(id = %id.short(), state = %state, "waiting for running state");
                }
                Err(message) => {
                    tracing::debug!(id = %id.short(), %message, "inspect failed while waiting");
                }
            }
            if Instant::now() >= deadline {
                return Err(start_failure(
                    &image,
                    format!(
                        "container did not reach running state within {:?}",
                        request.startup_timeout
                    ),
                ));
            }
            thread::sleep(STATE_POLL);
        }
    }
}

impl ContainerBackend for DockerCliBackend {
    fn name(&self) -> &str {
        self.binary
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("docker")
    }

    fn ping(&self) -> Result<()> {
        let unavailable = |message: String| ProbeError::RuntimeUnavailable {
            binary: self.binary_name(),
            message,
        };
        let out = self
            .run(&["version", "--format", "{{.Server.Version}}"], self.control_timeout)
            .map_err(unavailable)?;
        if !out.success() {
            return Err(unavailable(out.stderr.trim().to_string()));
        }
        tracing::debug!(runtime = %self.binary_name(), server = %out.stdout.trim(), "runtime reachable");
        Ok(())
    }

    fn start(&self, request: &StartRequest) -> Result<ContainerId> {
        let image = request.image.to_string();
        self.ensure_image(&image)?;

        let args = run_args(request);
        let out = match run_with_deadline(&mut self.command(&args), self.control_timeout) {
            Ok(ProcessOutcome::Finished(output)) => ExecOutput::from(output),
            Ok(ProcessOutcome::TimedOut { .. }) => {
                // The container may exist even though the client never answered.
                let _ = self.remove(&ContainerId::new(request.name.clone()));
                return Err(start_failure(&image, "container create timed out"));
            }
            Err(e) => return Err(start_failure(&image, e.to_string())),
        };
        if !out.success() {
            let _ = self.remove(&ContainerId::new(request.name.clone()));
            return Err(start_failure(&image, out.stderr.trim()));
        }
        let id = ContainerId::new(out.stdout.trim());
        tracing::debug!(id = %id.short(), name = %request.name, "container created");

        if let Err(e) = self.wait_for_running(request, &id) {
            if let Err(rm) = self.remove(&id) {
                tracing::warn!(id = %id.short(), error = %rm, "failed to remove container after start failure");
            }
            return Err(e);
        }
        Ok(id)
    }

    fn logs(&self, id: &ContainerId) -> Result<String> {
        let failure = |message: String| ProbeError::LogRetrievalFailure {
            id: id.to_string(),
            message,
        };
        let out = self
            .run(&["logs", "--timestamps", id.as_str()], self.control_timeout)
            .map_err(failure)?;
        if !out.success() {
            return Err(failure(out.stderr.trim().to_string()));
        }
        Ok(merge_timestamped(&out.stdout, &out.stderr))
    }

    fn exec(&self, id: &ContainerId, argv: &[String]) -> Result<ExecOutput> {
        let failure = |message: String| ProbeError::ExecFailure {
            id: id.to_string(),
            message,
        };
        if argv.is_empty() {
            return Err(failure("empty command".to_string()));
        }
        let mut args: Vec<&str> = vec!["exec", id.as_str()];
        args.extend(argv.iter().map(String::as_str));
        let out = self.run(&args, self.exec_timeout).map_err(failure)?;
        if is_dispatch_error(&out) {
            return Err(failure(out.stderr.trim().to_string()));
        }
        Ok(out)
    }

    fn remove(&self, id: &ContainerId) -> Result<()> {
        let out = self
            .run(&["rm", "--force", "--volumes", id.as_str()], self.control_timeout)
            .map_err(|message| remove_failure(id, &message))?;
        if out.success() || out.stderr.contains("No such container") {
            tracing::debug!(id = %id.short(), "container removed");
            return Ok(());
        }
        Err(remove_failure(id, out.stderr.trim()))
    }

    fn sweep(&self, session: &str) -> Result<usize> {
        let filter = format!("label={SESSION_LABEL}={session}");
        let out = self
            .run(&["ps", "--all", "--quiet", "--filter", &filter], self.control_timeout)
            .map_err(|message| ProbeError::RuntimeUnavailable {
                binary: self.binary_name(),
                message,
            })?;
        if !out.success() {
            return Err(ProbeError::RuntimeUnavailable {
                binary: self.binary_name(),
                message: out.stderr.trim().to_string(),
            });
        }
        let mut removed = 0;
        for id in out.stdout.split_whitespace().map(ContainerId::new) {
            match self.remove(&id) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(id = %id.short(), error = %e, "sweep could not remove container"),
            }
        }
        Ok(removed)
    }
}

/// Builds the argument list of the `run` invocation for a request.
#[must_use]
pub fn run_args(request: &StartRequest) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        request.name.clone(),
        "--label".to_string(),
        format!("{SESSION_LABEL}={}", request.session),
    ];
    for (key, value) in &request.config.env {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    for binding in &request.bindings {
        args.push("--publish".to_string());
        args.push(format!("{PUBLISH_HOST}:{}:{}", binding.host, binding.container));
    }
    if let Some(entrypoint) = &request.config.entrypoint {
        args.push("--entrypoint".to_string());
        args.push(entrypoint.clone());
    }
    args.push(request.image.to_string());
    args.extend(request.config.command.iter().cloned());
    args
}

fn parse_state(raw: &str) -> InspectState {
    let mut parts = raw.split_whitespace();
    let status = parts.next().unwrap_or_default();
    let code = parts.next().and_then(|c| c.parse().ok()).unwrap_or(-1);
    match status {
        "running" => InspectState::Running,
        "exited" | "dead" => InspectState::Exited(code),
        other => InspectState::Pending(other.to_string()),
    }
}

/// Returns whether an exec result means the command never ran, as opposed
/// to running and exiting non-zero.
fn is_dispatch_error(out: &ExecOutput) -> bool {
    !out.success()
        && (out.stderr.contains("Error response from daemon")
            || out.stderr.contains("No such container"))
}

fn remove_failure(id: &ContainerId, message: &str) -> ProbeError {
    ProbeError::Runtime {
        operation: "remove",
        message: format!("container {id}: {message}"),
    }
}

fn start_failure(image: &str, message: impl Into<String>) -> ProbeError {
    ProbeError::StartFailure {
        image: image.to_string(),
        message: message.into(),
    }
}
