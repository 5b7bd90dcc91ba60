use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a modified-time cell. Unparseable text yields `None`, which orders
/// before every real timestamp.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// One row read from the rendered report table. Rows are compared, never
/// mutated after extraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub ticket_id: Option<String>,
    pub modified_at: Option<NaiveDateTime>,
    pub modified_raw: Option<String>,
    pub sign_name: Option<String>,
    pub customer_id: Option<String>,
    pub success_rate: Option<String>,
    /// Remaining display columns keyed by column name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    /// Zero-based observation order within one table read.
    pub position: usize,
}

impl ResultRow {
    pub fn new(position: usize) -> Self {
        Self {
            ticket_id: None,
            modified_at: None,
            modified_raw: None,
            sign_name: None,
            customer_id: None,
            success_rate: None,
            fields: BTreeMap::new(),
            position,
        }
    }

    pub fn with_ticket(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    pub fn with_modified(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        self.modified_at = parse_timestamp(&raw);
        self.modified_raw = Some(raw.trim().to_string());
        self
    }

    pub fn with_sign_name(mut self, sign_name: impl Into<String>) -> Self {
        self.sign_name = Some(sign_name.into());
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_success_rate(mut self, rate: impl Into<String>) -> Self {
        self.success_rate = Some(rate.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Success rate as a number, tolerating a trailing percent sign.
    pub fn success_rate_value(&self) -> Option<f64> {
        self.success_rate
            .as_deref()
            .map(|raw| raw.trim().trim_end_matches('%').trim())
            .and_then(|raw| raw.parse::<f64>().ok())
    }
}
