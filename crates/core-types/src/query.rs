use std::fmt;

use serde::{Deserialize, Serialize};

/// The two query operations exposed by the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Latest ticket id for a customer/signature pair.
    Ticket,
    /// Aggregate success-rate records for a customer.
    SuccessRate,
}

impl QueryKind {
    pub fn name(&self) -> &'static str {
        match self {
            QueryKind::Ticket => "ticket",
            QueryKind::SuccessRate => "success_rate",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Label of the reporting-window control, e.g. `30天` or `本周`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ReportWindow(pub String);

impl ReportWindow {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl Default for ReportWindow {
    fn default() -> Self {
        Self("30天".to_string())
    }
}

impl fmt::Display for ReportWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable input to one orchestrated query.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub customer_id: String,
    pub sign_name: Option<String>,
    pub window: Option<ReportWindow>,
}

impl QueryRequest {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            sign_name: None,
            window: None,
        }
    }

    pub fn with_sign_name(mut self, sign_name: impl Into<String>) -> Self {
        self.sign_name = Some(sign_name.into());
        self
    }

    pub fn with_window(mut self, window: ReportWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Signature name with surrounding whitespace removed; `None` when blank.
    pub fn sign_filter(&self) -> Option<&str> {
        self.sign_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
