//! Per-check results and the aggregated report of one run.

use std::fmt;
use std::time::Duration;

use imgprobe_image::ImageReference;
use thiserror::Error;

use crate::runner::RunState;

/// Outcome of evaluating one readiness check. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractResult {
    description: String,
    passed: bool,
    diagnostic: Option<String>,
    elapsed: Duration,
}

impl ContractResult {
    /// A passing result.
    #[must_use]
    pub fn pass(description: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            description: description.into(),
            passed: true,
            diagnostic: None,
            elapsed,
        }
    }

    /// A failing result carrying the evidence behind the failure.
    #[must_use]
    pub fn fail(description: impl Into<String>, diagnostic: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            description: description.into(),
            passed: false,
            diagnostic: Some(diagnostic.into()),
            elapsed,
        }
    }

    /// Failing result for a check that was skipped because the run aborted.
    #[must_use]
    pub fn not_evaluated(description: impl Into<String>, reason: &str) -> Self {
        Self::fail(description, format!("not evaluated: {reason}"), Duration::ZERO)
    }

    /// Human-readable description of the check.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the check passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Captured logs, command output, or last HTTP status.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Time spent evaluating the check.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Everything one contract run produced.
#[derive(Debug, Clone)]
pub struct ContractReport {
    /// Image the run started.
    pub image: ImageReference,
    /// One result per check, in declaration order.
    pub results: Vec<ContractResult>,
    /// State history of the run.
    pub states: Vec<RunState>,
    /// Why evaluation stopped early, if it did.
    pub aborted: Option<String>,
}

impl ContractReport {
    /// Returns whether every check passed and the run was not aborted.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.results.iter().all(ContractResult::passed)
    }

    /// Results of the checks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ContractResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    /// Converts a failing report into an error.
    ///
    /// # Errors
    ///
    /// Returns `ContractFailure` carrying the report if any check failed.
    pub fn into_result(self) -> Result<Self, ContractFailure> {
        if self.passed() {
            Ok(self)
        } else {
            Err(ContractFailure {
                report: Box::new(self),
            })
        }
    }
}

impl fmt::Display for ContractReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.results.len();
        let failed = self.failures().count();
        if self.passed() {
            writeln!(f, "{}: passed ({total} checks)", self.image)?;
        } else {
            writeln!(f, "{}: FAILED ({failed} of {total} checks)", self.image)?;
        }
        if let Some(reason) = &self.aborted {
            writeln!(f, "  run aborted: {reason}")?;
        }
        for result in &self.results {
            let mark = if result.passed() { "ok" } else { "FAIL" };
            writeln!(
                f,
                "  [{mark}] {} ({:.1}s)",
                result.description(),
                result.elapsed().as_secs_f64()
            )?;
            if let Some(diagnostic) = result.diagnostic() {
                for line in diagnostic.lines() {
                    writeln!(f, "      {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// A contract run in which at least one check failed.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct ContractFailure {
    /// The failing report.
    pub report: Box<ContractReport>,
}
