//! Error types for the polling primitives

use std::fmt;
use std::time::Duration;

use cdp_adapter::AdapterError;
use thiserror::Error;

/// Classifies a probe error as worth another poll.
///
/// Anything not transient aborts the wait on the spot.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for AdapterError {
    fn is_transient(&self) -> bool {
        AdapterError::is_transient(self)
    }
}

impl Transient for std::convert::Infallible {
    fn is_transient(&self) -> bool {
        match *self {}
    }
}

/// Bookkeeping for one wait call. Never shared between calls.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryState<T> {
    pub attempts: u32,
    pub elapsed: Duration,
    /// Most recent value the probe produced, ready or not.
    pub last: Option<T>,
    /// Most recent transient probe error, rendered.
    pub last_error: Option<String>,
}

impl<T> RetryState<T> {
    pub(crate) fn new() -> Self {
        Self {
            attempts: 0,
            elapsed: Duration::ZERO,
            last: None,
            last_error: None,
        }
    }
}

impl<T> fmt::Display for RetryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempt(s) over {}ms",
            self.attempts,
            self.elapsed.as_millis()
        )?;
        if let Some(err) = &self.last_error {
            write!(f, ", last error: {err}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum WaitError<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug + fmt::Display,
{
    /// Attempt or time ceiling reached before the predicate held.
    #[error("wait for {label} timed out after {state}")]
    Timeout { label: String, state: RetryState<T> },

    /// The probe failed with a non-transient error.
    #[error("wait for {label} aborted: {cause}")]
    Aborted { label: String, cause: E },
}

impl<T, E> WaitError<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug + fmt::Display,
{
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    /// Last observed value, when the wait timed out with one.
    pub fn last_observed(&self) -> Option<&T> {
        match self {
            WaitError::Timeout { state, .. } => state.last.as_ref(),
            WaitError::Aborted { .. } => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            WaitError::Timeout { label, .. } | WaitError::Aborted { label, .. } => label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::AdapterErrorKind;

    #[test]
    fn adapter_errors_classify_through_trait() {
        assert!(Transient::is_transient(&AdapterError::stale("gone")));
        assert!(!Transient::is_transient(&AdapterError::new(
            AdapterErrorKind::PageCrashed
        )));
        assert!(!Transient::is_transient(&AdapterError::new(
            AdapterErrorKind::Script
        )));
    }

    #[test]
    fn timeout_message_carries_diagnostics() {
        let err: WaitError<usize, AdapterError> = WaitError::Timeout {
            label: "table rows".into(),
            state: RetryState {
                attempts: 3,
                elapsed: Duration::from_millis(900),
                last: Some(0),
                last_error: None,
            },
        };
        assert_eq!(
            err.to_string(),
            "wait for table rows timed out after 3 attempt(s) over 900ms"
        );
        assert_eq!(err.last_observed(), Some(&0));
    }
}
