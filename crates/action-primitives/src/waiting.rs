//! The one bounded polling loop every "wait until ready" goes through.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::errors::{RetryState, Transient, WaitError};

/// Poll interval, backoff and ceilings for one kind of wait.
///
/// The loop stops at whichever ceiling comes first: `max_attempts` probes or
/// `timeout_ms` elapsed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitPolicy {
    pub interval_ms: u64,
    /// Multiplier applied to the interval after each miss; 1.0 keeps it fixed.
    pub backoff: f64,
    pub max_interval_ms: u64,
    pub max_attempts: Option<u32>,
    pub timeout_ms: u64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            backoff: 1.0,
            max_interval_ms: 2_000,
            max_attempts: None,
            timeout_ms: 10_000,
        }
    }
}

impl WaitPolicy {
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            backoff: 1.0,
            max_interval_ms: interval.as_millis() as u64,
            max_attempts: None,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff = factor;
        self.max_interval_ms = max_interval.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval that follows `current` under this policy's backoff.
    fn next_interval(&self, current: Duration) -> Duration {
        let ceiling = Duration::from_millis(self.max_interval_ms.max(self.interval_ms));
        if self.backoff.is_nan() || self.backoff <= 1.0 {
            return current.min(ceiling);
        }
        let next_nanos = current.as_nanos() as f64 * self.backoff;
        if !next_nanos.is_finite() || next_nanos >= ceiling.as_nanos() as f64 {
            return ceiling;
        }
        Duration::from_nanos(next_nanos.round() as u64)
    }
}

/// Runs a probe until a predicate holds or the policy's ceilings are hit.
#[derive(Clone, Debug, Default)]
pub struct StabilizingWaiter {
    policy: WaitPolicy,
}

impl StabilizingWaiter {
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Poll `probe`; return the first value satisfying `predicate`.
    ///
    /// `Ok(None)` from the probe means "not ready". Transient probe errors
    /// count as a miss, any other error aborts. A satisfying value returns
    /// immediately, without a trailing sleep.
    pub async fn until<T, E, P, Fut, F>(
        &self,
        label: &str,
        mut probe: P,
        predicate: F,
    ) -> Result<T, WaitError<T, E>>
    where
        T: fmt::Debug,
        E: Transient + fmt::Debug + fmt::Display,
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        F: Fn(&T) -> bool,
    {
        let started = Instant::now();
        let ceiling = self.policy.timeout();
        let mut interval = self.policy.interval();
        let mut state = RetryState::new();

        loop {
            state.attempts += 1;
            match probe().await {
                Ok(Some(value)) => {
                    if predicate(&value) {
                        debug!(target: "waiter", label, attempts = state.attempts, "condition met");
                        return Ok(value);
                    }
                    trace!(target: "waiter", label, attempt = state.attempts, observed = ?value, "not yet");
                    state.last = Some(value);
                }
                Ok(None) => {
                    trace!(target: "waiter", label, attempt = state.attempts, "not ready");
                }
                Err(err) if err.is_transient() => {
                    debug!(target: "waiter", label, attempt = state.attempts, %err, "transient probe error");
                    state.last_error = Some(err.to_string());
                }
                Err(err) => {
                    debug!(target: "waiter", label, attempt = state.attempts, %err, "probe aborted");
                    return Err(WaitError::Aborted {
                        label: label.to_string(),
                        cause: err,
                    });
                }
            }

            state.elapsed = started.elapsed();
            let out_of_attempts = self
                .policy
                .max_attempts
                .map(|max| state.attempts >= max)
                .unwrap_or(false);
            if out_of_attempts || state.elapsed >= ceiling {
                debug!(
                    target: "waiter",
                    label,
                    attempts = state.attempts,
                    elapsed_ms = state.elapsed.as_millis() as u64,
                    "wait exhausted"
                );
                return Err(WaitError::Timeout {
                    label: label.to_string(),
                    state,
                });
            }

            sleep(interval.min(ceiling - state.elapsed)).await;
            interval = self.policy.next_interval(interval);
        }
    }

    /// [`until`](Self::until) where any produced value is good enough.
    pub async fn until_some<T, E, P, Fut>(
        &self,
        label: &str,
        probe: P,
    ) -> Result<T, WaitError<T, E>>
    where
        T: fmt::Debug,
        E: Transient + fmt::Debug + fmt::Display,
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.until(label, probe, |_| true).await
    }
}
