use cdp_adapter::AdapterError;
use dashprobe_core_types::FailureKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillError {
    #[error("field {field} not resolvable: every lookup strategy missed")]
    NotResolvable { field: String },
    #[error("field {field} committed {actual:?}, expected {expected:?}")]
    CommitMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    #[error("field {field}: {source}")]
    Adapter {
        field: String,
        #[source]
        source: AdapterError,
    },
}

impl FillError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FillError::NotResolvable { .. } => FailureKind::FieldNotResolvable,
            FillError::CommitMismatch { .. } => FailureKind::FieldCommitMismatch,
            FillError::Adapter { source, .. } if source.is_fatal() => {
                FailureKind::UnexpectedAutomationFailure
            }
            // The field went away under us; resolving again may succeed.
            FillError::Adapter { .. } => FailureKind::FieldNotResolvable,
        }
    }
}
