//! Runs an ordered set of readiness checks against one container.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use imgprobe_common::error::Result;
use imgprobe_image::ImageReference;
use imgprobe_runtime::{ContainerGuard, Lifecycle, RuntimeConfig};

use crate::check::ReadinessCheck;
use crate::policy::EvalPolicy;
use crate::result::{ContractReport, ContractResult};

/// Why a run left the happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The container never came up.
    Start,
    /// The runtime went away, the run was cancelled, or its deadline passed.
    Infrastructure,
}

/// One state of a contract run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Runner built, nothing started.
    Created,
    /// Container start in progress.
    Starting,
    /// Container running.
    Ready,
    /// Checks being evaluated.
    Evaluating,
    /// Run short-circuited.
    Failed(FailureKind),
    /// Container being torn down.
    Terminating,
    /// Terminal state.
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Evaluating => "evaluating",
            Self::Failed(FailureKind::Start) => "failed(start)",
            Self::Failed(FailureKind::Infrastructure) => "failed(infrastructure)",
            Self::Terminating => "terminating",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Shared, append-only record of the states a run passed through.
///
/// Readable after the run even when it ended in a start failure and no
/// report was produced.
#[derive(Debug, Clone, Default)]
pub struct StateLog {
    states: Arc<Mutex<Vec<RunState>>>,
}

impl StateLog {
    fn push(&self, state: RunState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state);
    }

    /// States recorded so far, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RunState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Single-use executor of one contract run.
///
/// Starts exactly one container, evaluates every check in order without
/// stopping at the first failure, and always tears the container down.
pub struct ContractRunner<'a, L: Lifecycle + ?Sized> {
    lifecycle: &'a L,
    policy: EvalPolicy,
    states: StateLog,
}

impl<'a, L: Lifecycle + ?Sized> ContractRunner<'a, L> {
    /// Creates a runner in the `Created` state.
    #[must_use]
    pub fn new(lifecycle: &'a L, policy: EvalPolicy) -> Self {
        let states = StateLog::default();
        states.push(RunState::Created);
        Self {
            lifecycle,
            policy,
            states,
        }
    }

    /// Handle on the state history, valid after `run` consumed the runner.
    #[must_use]
    pub fn history(&self) -> StateLog {
        self.states.clone()
    }

    fn transition(&self, image: &ImageReference, state: RunState) {
        tracing::info!(image = %image, state = %state, "contract run state");
        self.states.push(state);
    }

    /// Runs `checks` against a container started from `image`.
    ///
    /// Ports used by HTTP checks are published in addition to those in
    /// `config`. Returns one result per check, in order.
    ///
    /// # Errors
    ///
    /// Returns the start error if the container could not be brought up.
    /// Failures during evaluation never surface here; they are recorded in
    /// the report.
    pub fn run(
        self,
        image: &ImageReference,
        checks: &[ReadinessCheck],
        config: Option<&RuntimeConfig>,
    ) -> Result<ContractReport> {
        self.transition(image, RunState::Starting);
        let config = checks
            .iter()
            .filter_map(ReadinessCheck::required_port)
            .fold(config.cloned().unwrap_or_default(), RuntimeConfig::port);

        let guard = match ContainerGuard::start(self.lifecycle, image, Some(&config)) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(image = %image, error = %e, "container start failed");
                self.transition(image, RunState::Failed(FailureKind::Start));
                self.transition(image, RunState::Terminating);
                self.transition(image, RunState::Done);
                return Err(e);
            }
        };
        self.transition(image, RunState::Ready);
        self.transition(image, RunState::Evaluating);

        let mut results = Vec::with_capacity(checks.len());
        let mut aborted: Option<String> = None;
        for check in checks {
            if aborted.is_none() {
                if self.policy.cancel.is_cancelled() {
                    aborted = Some("run cancelled".to_string());
                } else if self.policy.run_expired() {
                    aborted = Some("run deadline expired".to_string());
                }
                if aborted.is_some() {
                    self.transition(image, RunState::Failed(FailureKind::Infrastructure));
                }
            }
            if let Some(reason) = &aborted {
                results.push(ContractResult::not_evaluated(check.description(), reason));
                continue;
            }

            match check.evaluate(self.lifecycle, &guard, &self.policy) {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::warn!(image = %image, check = %check.description(), error = %e, "infrastructure failure, aborting run");
                    results.push(ContractResult::fail(
                        check.description(),
                        format!("infrastructure error: {e}"),
                        std::time::Duration::ZERO,
                    ));
                    aborted = Some(e.to_string());
                    self.transition(image, RunState::Failed(FailureKind::Infrastructure));
                }
            }
        }

        self.transition(image, RunState::Terminating);
        drop(guard);
        self.transition(image, RunState::Done);

        Ok(ContractReport {
            image: image.clone(),
            results,
            states: self.states.snapshot(),
            aborted,
        })
    }
}

impl<L: Lifecycle + ?Sized> fmt::Debug for ContractRunner<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRunner")
            .field("policy", &self.policy)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}
