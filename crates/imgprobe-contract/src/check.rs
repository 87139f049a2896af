//! Readiness checks and their evaluation strategies.
//!
//! Every strategy waits a bounded time and reports a negative result when
//! its condition never became true. Only infrastructure errors (the
//! runtime is gone, the run was cancelled) are returned as `Err`.

use std::time::{Duration, Instant};

use imgprobe_common::error::{ProbeError, Result};
use imgprobe_runtime::container::PUBLISH_HOST;
use imgprobe_runtime::{ContainerHandle, Lifecycle};
use serde::{Deserialize, Serialize};

use crate::policy::EvalPolicy;
use crate::result::ContractResult;

const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A single condition a started container must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessCheck {
    /// A path exists inside the container.
    FileExists {
        /// Absolute path inside the container.
        path: String,
    },
    /// A command run inside the container exits with the expected code.
    CommandSucceeds {
        /// Command and arguments.
        argv: Vec<String>,
        /// Expected exit code.
        #[serde(default)]
        exit_code: i32,
    },
    /// An HTTP endpoint on a published port answers with the expected status.
    HttpReady {
        /// Container port.
        port: u16,
        /// Request path.
        #[serde(default = "default_http_path")]
        path: String,
        /// Expected status code.
        #[serde(default = "default_http_status")]
        status: u16,
    },
    /// The container logs contain every substring.
    LogContains {
        /// Required substrings.
        substrings: Vec<String>,
    },
}

fn default_http_path() -> String {
    "/".to_string()
}

const fn default_http_status() -> u16 {
    200
}

enum Verdict {
    Pass,
    Fail(String),
}

impl ReadinessCheck {
    /// Checks that `path` exists.
    #[must_use]
    pub fn file_exists(path: impl Into<String>) -> Self {
        Self::FileExists { path: path.into() }
    }

    /// Checks that `argv` exits 0.
    #[must_use]
    pub fn command_succeeds<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CommandSucceeds {
            argv: argv.into_iter().map(Into::into).collect(),
            exit_code: 0,
        }
    }

    /// Checks that `argv` exits with `exit_code`.
    #[must_use]
    pub fn command_exits<I, S>(argv: I, exit_code: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CommandSucceeds {
            argv: argv.into_iter().map(Into::into).collect(),
            exit_code,
        }
    }

    /// Checks that `GET /` on `port` answers 200.
    #[must_use]
    pub fn http_ready(port: u16) -> Self {
        Self::http_status(port, "/", 200)
    }

    /// Checks that `GET path` on `port` answers `status`.
    #[must_use]
    pub fn http_status(port: u16, path: impl Into<String>, status: u16) -> Self {
        Self::HttpReady {
            port,
            path: path.into(),
            status,
        }
    }

    /// Checks that the logs contain every one of `substrings`.
    #[must_use]
    pub fn log_contains<I, S>(substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::LogContains {
            substrings: substrings.into_iter().map(Into::into).collect(),
        }
    }

    /// Container port this check needs published, if any.
    #[must_use]
    pub const fn required_port(&self) -> Option<u16> {
        match self {
            Self::HttpReady { port, .. } => Some(*port),
            _ => None,
        }
    }

    /// One-line description used in reports.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::FileExists { path } => format!("file exists: {path}"),
            Self::CommandSucceeds { argv, exit_code: 0 } => {
                format!("command succeeds: {}", argv.join(" "))
            }
            Self::CommandSucceeds { argv, exit_code } => {
                format!("command exits {exit_code}: {}", argv.join(" "))
            }
            Self::HttpReady { port, path, status } => {
                format!("http ready: GET :{port}{path} -> {status}")
            }
            Self::LogContains { substrings } => {
                let quoted: Vec<String> = substrings.iter().map(|s| format!("{s:?}")).collect();
                format!("logs contain: {}", quoted.join(", "))
            }
        }
    }

    /// Evaluates the check against a running container.
    ///
    /// Exec and log failures become failed results carrying the cause.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures: the runtime is
    /// unreachable or the policy's cancel token fired.
    pub fn evaluate<L: Lifecycle + ?Sized>(
        &self,
        lifecycle: &L,
        handle: &ContainerHandle,
        policy: &EvalPolicy,
    ) -> Result<ContractResult> {
        let started = Instant::now();
        let description = self.description();
        tracing::debug!(id = %handle.id().short(), check = %description, "evaluating check");

        let verdict = match self {
            Self::FileExists { path } => file_exists(lifecycle, handle, path),
            Self::CommandSucceeds { argv, exit_code } => {
                command_succeeds(lifecycle, handle, argv, *exit_code)
            }
            Self::HttpReady { port, path, status } => {
                http_ready(handle, *port, path, *status, policy)
            }
            Self::LogContains { substrings } => log_contains(lifecycle, handle, substrings, policy),
        };
        let verdict = match verdict {
            Ok(v) => v,
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => Verdict::Fail(e.to_string()),
        };

        let elapsed = started.elapsed();
        let result = match verdict {
            Verdict::Pass => ContractResult::pass(description, elapsed),
            Verdict::Fail(diagnostic) => ContractResult::fail(description, diagnostic, elapsed),
        };
        tracing::info!(
            id = %handle.id().short(),
            check = %result.description(),
            passed = result.passed(),
            ?elapsed,
            "check evaluated"
        );
        Ok(result)
    }
}

fn file_exists<L: Lifecycle + ?Sized>(
    lifecycle: &L,
    handle: &ContainerHandle,
    path: &str,
) -> Result<Verdict> {
    let argv = ["test".to_string(), "-e".to_string(), path.to_string()];
    let out = lifecycle.exec(handle, &argv)?;
    Ok(match out.exit_code {
        0 => Verdict::Pass,
        1 => Verdict::Fail(format!("{path} does not exist in the container")),
        code @ (126 | 127) => Verdict::Fail(format!(
            "presence probe `test` is unavailable in the image (exit {code})\n{}",
            out.combined()
        )),
        code => Verdict::Fail(format!(
            "presence probe for {path} exited with {code}\n{}",
            out.combined()
        )),
    })
}

fn command_succeeds<L: Lifecycle + ?Sized>(
    lifecycle: &L,
    handle: &ContainerHandle,
    argv: &[String],
    expected: i32,
) -> Result<Verdict> {
    if argv.is_empty() {
        return Ok(Verdict::Fail("no command given".to_string()));
    }
    let out = lifecycle.exec(handle, argv)?;
    if out.exit_code == expected {
        return Ok(Verdict::Pass);
    }
    let mut diagnostic = format!("exit code {} (expected {expected})", out.exit_code);
    let combined = out.combined();
    if combined.is_empty() {
        diagnostic.push_str("\n(no output)");
    } else {
        diagnostic.push_str(&format!("\n{}", combined.trim_end()));
    }
    Ok(Verdict::Fail(diagnostic))
}

fn http_ready(
    handle: &ContainerHandle,
    port: u16,
    path: &str,
    expected: u16,
    policy: &EvalPolicy,
) -> Result<Verdict> {
    let Some(host_port) = handle.host_port(port) else {
        return Ok(Verdict::Fail(format!(
            "container port {port} is not published"
        )));
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let url = format!("http://{PUBLISH_HOST}:{host_port}{path}");
    let client = match reqwest::blocking::Client::builder().no_proxy().build() {
        Ok(client) => client,
        Err(e) => return Ok(Verdict::Fail(format!("cannot build HTTP client: {e}"))),
    };

    let deadline = policy.deadline_after(policy.http_deadline);
    let mut attempts = 0u32;
    let mut last: Option<String> = None;
    loop {
        if policy.cancel.is_cancelled() {
            return Err(ProbeError::Cancelled {
                stage: format!("polling {url}"),
            });
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        attempts += 1;
        let observed = match client
            .get(&url)
            .timeout(remaining.min(HTTP_REQUEST_TIMEOUT))
            .send()
        {
            Ok(response) if response.status().as_u16() == expected => {
                if Instant::now() <= deadline {
                    tracing::debug!(url = %url, attempts, "http endpoint ready");
                    return Ok(Verdict::Pass);
                }
                format!("status {} arrived after the deadline", response.status())
            }
            Ok(response) => format!("status {}", response.status()),
            Err(e) => format!("error: {e}"),
        };
        tracing::debug!(url = %url, attempt = attempts, last = %observed, "http endpoint not ready");
        last = Some(observed);

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if !policy.cancel.sleep_until(deadline.min(now + policy.poll_interval)) {
            return Err(ProbeError::Cancelled {
                stage: format!("polling {url}"),
            });
        }
    }
    Ok(Verdict::Fail(format!(
        "GET {url} did not return {expected} within {:?} ({attempts} attempts); last observed: {}",
        policy.http_deadline,
        last.as_deref().unwrap_or("no response")
    )))
}

fn log_contains<L: Lifecycle + ?Sized>(
    lifecycle: &L,
    handle: &ContainerHandle,
    substrings: &[String],
    policy: &EvalPolicy,
) -> Result<Verdict> {
    let mut logs = lifecycle.logs(handle)?;
    if missing(&logs, substrings).is_empty() {
        return Ok(Verdict::Pass);
    }

    tracing::debug!(id = %handle.id().short(), delay = ?policy.settle_delay, "waiting for logs to settle");
    if !policy.cancel.sleep_until(policy.deadline_after(policy.settle_delay)) {
        return Err(ProbeError::Cancelled {
            stage: "waiting for logs to settle".to_string(),
        });
    }
    logs = lifecycle.logs(handle)?;

    let absent = missing(&logs, substrings);
    if absent.is_empty() {
        return Ok(Verdict::Pass);
    }
    let quoted: Vec<String> = absent.iter().map(|s| format!("{s:?}")).collect();
    let body = if logs.is_empty() { "(no log output)" } else { logs.trim_end() };
    Ok(Verdict::Fail(format!(
        "missing from logs: {}\n--- container logs ---\n{body}",
        quoted.join(", ")
    )))
}

fn missing<'a>(logs: &str, substrings: &'a [String]) -> Vec<&'a str> {
    substrings
        .iter()
        .map(String::as_str)
        .filter(|s| !logs.contains(s))
        .collect()
}
