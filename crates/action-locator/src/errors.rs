//! Error types for frame and element location

use action_primitives::Transient;
use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// No attached frame carries the content signature.
    #[error("no frame matches signature {signature} ({scanned} frame(s) scanned)")]
    FrameNotFound { signature: String, scanned: usize },

    /// Every strategy in the chain came back empty or ambiguous.
    #[error("element not resolvable: {0}")]
    ElementNotFound(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl LocatorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LocatorError::Adapter(err) if err.is_fatal())
    }
}

impl Transient for LocatorError {
    fn is_transient(&self) -> bool {
        match self {
            LocatorError::Adapter(err) => err.is_transient(),
            LocatorError::FrameNotFound { .. } | LocatorError::ElementNotFound(_) => true,
        }
    }
}
