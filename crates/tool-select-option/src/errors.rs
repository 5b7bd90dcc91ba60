use cdp_adapter::AdapterError;
use dashprobe_core_types::FailureKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("range control {control} not found")]
    ControlMissing { control: String },
    #[error("no option for {label:?} (tried {tried:?})")]
    OptionMissing { label: String, tried: Vec<String> },
    /// The control closed without the choice taking effect.
    #[error("selection of {label:?} not applied; control shows {observed:?}")]
    NotApplied { label: String, observed: String },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl SelectError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SelectError::Adapter(err) if err.is_fatal() => FailureKind::UnexpectedAutomationFailure,
            _ => FailureKind::RangeSelectionFailed,
        }
    }
}
