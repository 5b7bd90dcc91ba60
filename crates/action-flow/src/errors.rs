//! Query orchestration error types

use dashprobe_core_types::{FailureKind, QueryFailure, QueryStage};
use dashprobe_session_store::SessionStoreError;
use thiserror::Error;

/// Why one attempt at a query stopped.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A stage gave up; `kind` decides whether the query is retried.
    #[error("{stage} failed: {message}")]
    Stage {
        stage: QueryStage,
        kind: FailureKind,
        message: String,
    },

    /// A stage ran past its own budget.
    #[error("{stage} exceeded its {budget_ms}ms budget")]
    StageTimeout { stage: QueryStage, budget_ms: u64 },

    /// The dashboard bounced to the login page or showed the login form.
    #[error("session rejected by the dashboard: {0}")]
    SessionInvalid(String),

    /// The login collaborator could not produce a usable session.
    #[error("login failed: {0}")]
    Login(String),

    #[error("session store: {0}")]
    Store(#[from] SessionStoreError),
}

impl FlowError {
    pub fn stage(stage: QueryStage, kind: FailureKind, message: impl ToString) -> Self {
        FlowError::Stage {
            stage,
            kind,
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FlowError::Stage { kind, .. } => *kind,
            FlowError::StageTimeout { .. } => FailureKind::Timeout,
            FlowError::SessionInvalid(_) | FlowError::Login(_) => FailureKind::SessionInvalid,
            FlowError::Store(_) => FailureKind::UnexpectedAutomationFailure,
        }
    }

    /// Stage the failure belongs to, when one is known.
    pub fn failed_stage(&self) -> Option<QueryStage> {
        match self {
            FlowError::Stage { stage, .. } | FlowError::StageTimeout { stage, .. } => Some(*stage),
            FlowError::SessionInvalid(_) | FlowError::Login(_) | FlowError::Store(_) => {
                Some(QueryStage::SessionEnsured)
            }
        }
    }

    pub fn to_failure(&self) -> QueryFailure {
        let message = match self {
            FlowError::Stage { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let failure = QueryFailure::new(self.kind(), message);
        match self.failed_stage() {
            Some(stage) => failure.at(stage),
            None => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_kind_stage_and_plain_message() {
        let err = FlowError::stage(QueryStage::RangeSet, FailureKind::RangeSelectionFailed, "list closed");
        let failure = err.to_failure();
        assert_eq!(failure.kind, FailureKind::RangeSelectionFailed);
        assert_eq!(failure.stage, Some(QueryStage::RangeSet));
        assert_eq!(failure.message, "list closed");
    }

    #[test]
    fn stage_timeout_is_retryable() {
        let err = FlowError::StageTimeout {
            stage: QueryStage::TableReady,
            budget_ms: 100,
        };
        assert!(err.kind().is_retryable());
        assert!(err.to_failure().message.contains("100ms"));
    }
}
