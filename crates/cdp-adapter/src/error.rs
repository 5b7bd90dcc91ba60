use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// High-level error categories surfaced by the automation surface.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum AdapterErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("navigation failed")]
    NavFailed,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("stale frame or element handle")]
    StaleHandle,
    #[error("target element not found")]
    TargetNotFound,
    #[error("element not interactable")]
    NotInteractable,
    #[error("page script failed")]
    Script,
    #[error("page crashed")]
    PageCrashed,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to higher layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        let retriable = matches!(
            kind,
            AdapterErrorKind::StaleHandle | AdapterErrorKind::NavTimeout
        );
        Self {
            kind,
            hint: None,
            retriable,
            data: None,
        }
    }

    pub fn stale(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::StaleHandle).with_hint(hint)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The page or browser is gone; nothing on this page can be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            AdapterErrorKind::PageCrashed | AdapterErrorKind::ConnectionClosed
        )
    }

    /// Worth another probe: the DOM may still be settling.
    pub fn is_transient(&self) -> bool {
        !self.is_fatal() && (self.retriable || self.kind == AdapterErrorKind::StaleHandle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handles_are_transient() {
        let err = AdapterError::stale("node detached");
        assert!(err.is_transient());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "stale frame or element handle: node detached");
    }

    #[test]
    fn crashes_are_fatal_even_when_marked_retriable() {
        let err = AdapterError::new(AdapterErrorKind::PageCrashed).retriable(true);
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn script_errors_are_not_transient_by_default() {
        assert!(!AdapterError::new(AdapterErrorKind::Script).is_transient());
        assert!(AdapterError::new(AdapterErrorKind::CdpIo)
            .retriable(true)
            .is_transient());
    }
}
