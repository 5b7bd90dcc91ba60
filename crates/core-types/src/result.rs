use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::{QueryKind, ReportWindow};
use crate::row::ResultRow;
use crate::QueryId;

/// Stages of one orchestrated query, in order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    NotStarted,
    SessionEnsured,
    FrameReady,
    ParametersSet,
    RangeSet,
    TableReady,
    Extracted,
}

impl QueryStage {
    pub fn name(&self) -> &'static str {
        match self {
            QueryStage::NotStarted => "not_started",
            QueryStage::SessionEnsured => "session_ensured",
            QueryStage::FrameReady => "frame_ready",
            QueryStage::ParametersSet => "parameters_set",
            QueryStage::RangeSet => "range_set",
            QueryStage::TableReady => "table_ready",
            QueryStage::Extracted => "extracted",
        }
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure taxonomy shared by every query.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    SessionInvalid,
    FrameNotFound,
    FieldNotResolvable,
    FieldCommitMismatch,
    RangeSelectionFailed,
    Timeout,
    NoMatchingData,
    UnexpectedAutomationFailure,
}

impl FailureKind {
    /// Stage-local failures that the orchestrator restarts from the last
    /// stable stage.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::FrameNotFound
                | FailureKind::FieldNotResolvable
                | FailureKind::RangeSelectionFailed
                | FailureKind::Timeout
        )
    }

    /// Kinds that end the query immediately regardless of remaining budget.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailureKind::NoMatchingData
                | FailureKind::FieldCommitMismatch
                | FailureKind::UnexpectedAutomationFailure
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::SessionInvalid => "SessionInvalid",
            FailureKind::FrameNotFound => "FrameNotFound",
            FailureKind::FieldNotResolvable => "FieldNotResolvable",
            FailureKind::FieldCommitMismatch => "FieldCommitMismatch",
            FailureKind::RangeSelectionFailed => "RangeSelectionFailed",
            FailureKind::Timeout => "Timeout",
            FailureKind::NoMatchingData => "NoMatchingData",
            FailureKind::UnexpectedAutomationFailure => "UnexpectedAutomationFailure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error descriptor carried by a failed [`ExtractionResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Stage that was being attempted when the query failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<QueryStage>,
}

impl QueryFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stage: None,
        }
    }

    pub fn at(mut self, stage: QueryStage) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} at {}: {}", self.kind, stage, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Uniform outcome of both query kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub query_id: QueryId,
    pub kind: QueryKind,
    pub success: bool,
    /// Winning row for a ticket query, first row for a success-rate query.
    pub selected: Option<ResultRow>,
    /// Aggregate statistic of a success-rate query.
    pub success_rate: Option<String>,
    pub rows: Vec<ResultRow>,
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<ReportWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryFailure>,
    /// Coarse orchestrator attempts consumed, starting at 1.
    pub attempts: u32,
}

impl ExtractionResult {
    pub fn matched(kind: QueryKind, selected: ResultRow, rows: Vec<ResultRow>) -> Self {
        let success_rate = match kind {
            QueryKind::SuccessRate => selected.success_rate.clone(),
            QueryKind::Ticket => None,
        };
        let total_count = rows.len();
        Self {
            query_id: QueryId::new(),
            kind,
            success: true,
            selected: Some(selected),
            success_rate,
            rows,
            total_count,
            window: None,
            error: None,
            attempts: 1,
        }
    }

    pub fn no_data(kind: QueryKind, message: impl Into<String>) -> Self {
        Self::failed(kind, QueryFailure::new(FailureKind::NoMatchingData, message))
    }

    pub fn failed(kind: QueryKind, failure: QueryFailure) -> Self {
        Self {
            query_id: QueryId::new(),
            kind,
            success: false,
            selected: None,
            success_rate: None,
            rows: Vec::new(),
            total_count: 0,
            window: None,
            error: Some(failure),
            attempts: 1,
        }
    }

    pub fn with_query_id(mut self, query_id: QueryId) -> Self {
        self.query_id = query_id;
        self
    }

    pub fn with_window(mut self, window: Option<ReportWindow>) -> Self {
        self.window = window;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|failure| failure.kind)
    }

    /// A valid, empty answer rather than a fault.
    pub fn is_no_data(&self) -> bool {
        self.failure_kind() == Some(FailureKind::NoMatchingData)
    }

    /// Ticket id of the selected row, when there is one.
    pub fn ticket_id(&self) -> Option<&str> {
        self.selected.as_ref().and_then(|row| row.ticket_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_and_terminal_are_disjoint() {
        let all = [
            FailureKind::SessionInvalid,
            FailureKind::FrameNotFound,
            FailureKind::FieldNotResolvable,
            FailureKind::FieldCommitMismatch,
            FailureKind::RangeSelectionFailed,
            FailureKind::Timeout,
            FailureKind::NoMatchingData,
            FailureKind::UnexpectedAutomationFailure,
        ];
        for kind in all {
            assert!(!(kind.is_retryable() && kind.is_terminal()), "{kind}");
        }
        assert!(!FailureKind::NoMatchingData.is_retryable());
        assert!(!FailureKind::SessionInvalid.is_retryable());
    }

    #[test]
    fn matched_success_rate_carries_primary_rate() {
        let first = ResultRow::new(0).with_sign_name("A").with_success_rate("97.10");
        let rows = vec![first.clone(), ResultRow::new(1).with_sign_name("B")];
        let result = ExtractionResult::matched(QueryKind::SuccessRate, first, rows);
        assert!(result.success);
        assert_eq!(result.success_rate.as_deref(), Some("97.10"));
        assert_eq!(result.total_count, 2);
    }

    #[test]
    fn no_data_serializes_error_kind() {
        let result = ExtractionResult::no_data(QueryKind::Ticket, "no rows for customer")
            .with_attempts(1);
        assert!(result.is_no_data());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "NoMatchingData");
        assert_eq!(json["total_count"], 0);
    }
}
