//! Unified error types for the imgprobe workspace.
//!
//! Evaluation-time failures (`LogRetrievalFailure`, `ExecFailure`) are
//! recorded into contract results by the runner; only reference, start,
//! and runtime-availability errors usually reach a caller.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A logical image name could not be parsed into registry + repository form.
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidReference {
        /// The offending input.
        reference: String,
        /// Why the input was rejected.
        reason: String,
    },

    /// The container could not be brought up.
    #[error("failed to start container from {image}: {message}")]
    StartFailure {
        /// Image the container was started from.
        image: String,
        /// Underlying cause (pull error, port conflict, sandbox error, timeout).
        message: String,
    },

    /// Logs could not be fetched for a container.
    #[error("failed to retrieve logs for container {id}: {message}")]
    LogRetrievalFailure {
        /// Container the logs were requested for.
        id: String,
        /// Underlying cause.
        message: String,
    },

    /// A command could not be dispatched into a container.
    #[error("failed to exec in container {id}: {message}")]
    ExecFailure {
        /// Container the command targeted.
        id: String,
        /// Underlying cause.
        message: String,
    },

    /// The container runtime cannot be reached at all.
    #[error("container runtime {binary} is unavailable: {message}")]
    RuntimeUnavailable {
        /// Runtime binary that was probed.
        binary: String,
        /// Underlying cause.
        message: String,
    },

    /// A runtime operation on an existing container or host resource failed.
    #[error("runtime {operation} failed: {message}")]
    Runtime {
        /// What was being done (`remove`, `port reservation`, ...).
        operation: &'static str,
        /// Underlying cause.
        message: String,
    },

    /// The operation was cancelled before it completed.
    #[error("cancelled during {stage}")]
    Cancelled {
        /// What was in progress when cancellation was observed.
        stage: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl ProbeError {
    /// Returns whether this error means the runtime itself is gone, as opposed
    /// to a failure local to one container or one command.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::RuntimeUnavailable { .. } | Self::Cancelled { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_reference_message_quotes_input() {
        let err = ProbeError::InvalidReference {
            reference: "Bad Name".into(),
            reason: "contains whitespace".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid image reference \"Bad Name\": contains whitespace"
        );
    }

    #[test]
    fn runtime_unavailable_and_cancelled_are_infrastructure() {
        let unavailable = ProbeError::RuntimeUnavailable {
            binary: "docker".into(),
            message: "not found".into(),
        };
        let cancelled = ProbeError::Cancelled {
            stage: "evaluation".into(),
        };
        assert!(unavailable.is_infrastructure());
        assert!(cancelled.is_infrastructure());
    }

    #[test]
    fn runtime_failure_names_operation_and_is_local() {
        let err = ProbeError::Runtime {
            operation: "remove",
            message: "device or resource busy".into(),
        };
        assert_eq!(err.to_string(), "runtime remove failed: device or resource busy");
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn exec_failure_is_local() {
        let err = ProbeError::ExecFailure {
            id: "abc".into(),
            message: "no such container".into(),
        };
        assert!(!err.is_infrastructure());
    }
}
