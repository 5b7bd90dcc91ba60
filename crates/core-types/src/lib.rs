//! Shared primitives for the dashprobe extraction engine.
//!
//! Every crate in the workspace speaks in these types: the immutable
//! [`QueryRequest`] going in, the [`ResultRow`] values read from the report
//! table, and the single [`ExtractionResult`] contract coming out of both
//! query operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod query;
mod result;
mod row;
mod state;

pub use query::{QueryKind, QueryRequest, ReportWindow};
pub use result::{ExtractionResult, FailureKind, QueryFailure, QueryStage};
pub use row::{parse_timestamp, ResultRow};
pub use state::SerializedState;

/// Correlation id for one orchestrated query.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
