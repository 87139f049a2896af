//! Output of commands executed inside running containers.

/// Output from an exec command.
///
/// A non-zero `exit_code` is a normal result, not an error: only a failure
/// to dispatch the command at all is reported as `ProbeError::ExecFailure`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command (-1 if it was killed by a signal).
    pub exit_code: i32,
}

impl ExecOutput {
    /// Creates an output from its parts.
    #[must_use]
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns whether the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, each newline-terminated when non-empty.
    #[must_use]
    pub fn combined(&self) -> String {
        crate::logs::join_streams(&self.stdout, &self.stderr)
    }
}

/// Builds the output of a finished runtime CLI process.
impl From<std::process::Output> for ExecOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_only_for_zero_exit() {
        assert!(ExecOutput::new(0, "", "").success());
        assert!(!ExecOutput::new(1, "", "").success());
        assert!(!ExecOutput::new(-1, "", "").success());
    }

    #[test]
    fn combined_joins_stdout_then_stderr() {
        let out = ExecOutput::new(1, "made dir", "mkdir: permission denied\n");
        assert_eq!(out.combined(), "made dir\nmkdir: permission denied\n");
    }

    #[test]
    fn combined_of_empty_output_is_empty() {
        assert_eq!(ExecOutput::default().combined(), "");
    }
}
