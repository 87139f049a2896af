//! Child process execution with a hard deadline.
//!
//! `std::process::Command::output` blocks without bound; every runtime
//! CLI call goes through [`run_with_deadline`] instead, which kills the
//! child once the deadline passes.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use imgprobe_common::error::{ProbeError, Result};

const WAIT_SLICE: Duration = Duration::from_millis(20);

/// How a bounded child process ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The process exited on its own.
    Finished(Output),
    /// The deadline passed and the process was killed.
    TimedOut {
        /// Whatever the process wrote to stderr before it was killed.
        stderr: String,
    },
}

/// Runs `command` to completion or until `timeout` elapses.
///
/// Stdout and stderr are drained on background threads so a chatty child
/// cannot block on a full pipe while we wait for it.
///
/// # Errors
///
/// Returns `ProbeError::Io` if the process cannot be spawned or waited on.
pub fn run_with_deadline(command: &mut Command, timeout: Duration) -> Result<ProcessOutcome> {
    let program = command.get_program().to_string_lossy().into_owned();
    let io_err = |source: std::io::Error| ProbeError::Io {
        path: program.clone().into(),
        source,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(io_err)?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait().map_err(io_err)? {
            break Some(status);
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(program = %program, ?timeout, "killing process past deadline");
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(WAIT_SLICE.min(deadline - now));
    };

    let stdout = stdout.map(join_bytes).unwrap_or_default();
    let stderr = stderr.map(join_bytes).unwrap_or_default();

    Ok(match status {
        Some(status) => ProcessOutcome::Finished(Output {
            status,
            stdout,
            stderr,
        }),
        None => ProcessOutcome::TimedOut {
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        },
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_bytes(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn finished_process_returns_output() {
        let outcome =
            run_with_deadline(Command::new("sh").args(["-c", "echo hello; echo oops >&2"]), Duration::from_secs(5))
                .expect("spawn");
        let ProcessOutcome::Finished(output) = outcome else {
            panic!("expected the process to finish");
        };
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "oops\n");
    }

    #[test]
    fn nonzero_exit_is_still_finished() {
        let outcome = run_with_deadline(Command::new("sh").args(["-c", "exit 3"]), Duration::from_secs(5))
            .expect("spawn");
        let ProcessOutcome::Finished(output) = outcome else {
            panic!("expected the process to finish");
        };
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn process_past_deadline_is_killed() {
        let start = Instant::now();
        let outcome = run_with_deadline(Command::new("sleep").arg("10"), Duration::from_millis(200))
            .expect("spawn");
        assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_program_is_io_error() {
        let err = run_with_deadline(
            &mut Command::new("imgprobe-definitely-not-a-binary"),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ProbeError::Io { .. }));
    }
}
