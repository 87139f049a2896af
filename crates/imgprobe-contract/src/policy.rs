//! Timing policy applied while evaluating readiness checks.

use std::time::{Duration, Instant};

use imgprobe_common::config::HarnessConfig;
use imgprobe_common::constants;

use crate::cancel::CancelToken;

/// Waits, deadlines, and the cancellation token for one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvalPolicy {
    /// Delay before logs are fetched a second time.
    pub settle_delay: Duration,
    /// How long an HTTP check keeps polling.
    pub http_deadline: Duration,
    /// Interval between HTTP polls.
    pub poll_interval: Duration,
    /// Absolute deadline of the whole run, if any.
    pub run_deadline: Option<Instant>,
    /// Cancellation shared with the caller.
    pub cancel: CancelToken,
}

impl Default for EvalPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(constants::DEFAULT_SETTLE_DELAY_SECS),
            http_deadline: Duration::from_secs(constants::DEFAULT_HTTP_DEADLINE_SECS),
            poll_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            run_deadline: None,
            cancel: CancelToken::new(),
        }
    }
}

impl EvalPolicy {
    /// Takes timings from the harness configuration.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            http_deadline: config.http_deadline(),
            poll_interval: config.poll_interval(),
            ..Self::default()
        }
    }

    /// Shares `cancel` with the caller.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bounds the whole run to `timeout` from now.
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_deadline = Some(Instant::now() + timeout);
        self
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the HTTP polling deadline and interval.
    #[must_use]
    pub const fn with_http_timing(mut self, deadline: Duration, interval: Duration) -> Self {
        self.http_deadline = deadline;
        self.poll_interval = interval;
        self
    }

    /// `now + wait`, clipped to the run deadline.
    #[must_use]
    pub fn deadline_after(&self, wait: Duration) -> Instant {
        let local = Instant::now() + wait;
        self.run_deadline.map_or(local, |run| run.min(local))
    }

    /// Returns whether the run deadline has passed.
    #[must_use]
    pub fn run_expired(&self) -> bool {
        self.run_deadline.is_some_and(|d| Instant::now() >= d)
    }
}
