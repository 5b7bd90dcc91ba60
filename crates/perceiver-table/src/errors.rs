use cdp_adapter::AdapterError;
use dashprobe_core_types::FailureKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("table kept repainting: last read {rows} row(s)")]
    Unstable { rows: usize },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl ExtractError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExtractError::Unstable { .. } => FailureKind::Timeout,
            ExtractError::Adapter(err) if err.is_fatal() => FailureKind::UnexpectedAutomationFailure,
            ExtractError::Adapter(_) => FailureKind::Timeout,
        }
    }
}
