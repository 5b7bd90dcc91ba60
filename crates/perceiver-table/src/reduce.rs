//! Filtering, deduplication and winner selection over rows already read.
//!
//! Everything here is pure: the same rows always reduce to the same answer.

use std::collections::HashMap;

use dashprobe_core_types::{ExtractionResult, QueryKind, QueryRequest, ResultRow};
use tracing::debug;

/// Rows must match every filter that is set.
#[derive(Clone, Debug, Default)]
pub struct RowFilter {
    pub customer_id: Option<String>,
    pub sign_name: Option<String>,
}

impl RowFilter {
    /// Customer always filters; the signature name only narrows ticket
    /// queries.
    pub fn for_request(kind: QueryKind, request: &QueryRequest) -> Self {
        let customer_id = Some(request.customer_id.trim().to_string()).filter(|id| !id.is_empty());
        let sign_name = match kind {
            QueryKind::Ticket => request.sign_filter().map(str::to_string),
            QueryKind::SuccessRate => None,
        };
        Self {
            customer_id,
            sign_name,
        }
    }

    /// Rows without a customer column are not excluded by the customer
    /// filter; the query itself was already scoped to that customer.
    pub fn accepts(&self, row: &ResultRow) -> bool {
        if let (Some(wanted), Some(actual)) = (&self.customer_id, &row.customer_id) {
            if actual.trim() != wanted {
                return false;
            }
        }
        if let Some(wanted) = &self.sign_name {
            if row.sign_name.as_deref().map(str::trim) != Some(wanted.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Identity of a row across repeated reads.
pub fn natural_key(kind: QueryKind, row: &ResultRow) -> Option<String> {
    match kind {
        QueryKind::Ticket => row.ticket_id.clone(),
        QueryKind::SuccessRate => row
            .sign_name
            .as_deref()
            .map(str::trim)
            .filter(|sign| !sign.is_empty())
            .map(str::to_string),
    }
}

/// Collapse rows sharing a natural key. The survivor holds the greatest
/// modified time; on a tie the first-seen row stays. Survivors keep their
/// first-seen order. Rows without a key are kept as they are.
pub fn dedup(kind: QueryKind, rows: Vec<ResultRow>) -> Vec<ResultRow> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ResultRow> = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(key) = natural_key(kind, &row) else {
            kept.push(row);
            continue;
        };
        match slots.get(&key) {
            Some(&slot) => {
                if row.modified_at > kept[slot].modified_at {
                    debug!(target: "table", %key, "newer duplicate replaces earlier row");
                    kept[slot] = row;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(row);
            }
        }
    }
    kept
}

/// Ticket queries pick the latest modified row, earliest position on ties.
/// Success-rate queries surface the first row.
pub fn select(kind: QueryKind, rows: &[ResultRow]) -> Option<&ResultRow> {
    match kind {
        QueryKind::Ticket => rows.iter().fold(None, |best: Option<&ResultRow>, row| match best {
            Some(current) if row.modified_at <= current.modified_at => Some(current),
            _ => Some(row),
        }),
        QueryKind::SuccessRate => rows.first(),
    }
}

/// Filter, dedup and select; no surviving row is a `NoMatchingData` result.
pub fn reduce(kind: QueryKind, rows: Vec<ResultRow>, filter: &RowFilter) -> ExtractionResult {
    let read = rows.len();
    let matching: Vec<ResultRow> = rows.into_iter().filter(|row| filter.accepts(row)).collect();
    let matched = matching.len();
    let unique = dedup(kind, matching);
    debug!(target: "table", %kind, read, matched, unique = unique.len(), "rows reduced");

    match select(kind, &unique).cloned() {
        Some(selected) => ExtractionResult::matched(kind, selected, unique),
        None => ExtractionResult::no_data(kind, no_data_message(kind, read, filter)),
    }
}

fn no_data_message(kind: QueryKind, read: usize, filter: &RowFilter) -> String {
    let mut message = match kind {
        QueryKind::Ticket => "no ticket rows".to_string(),
        QueryKind::SuccessRate => "no success-rate rows".to_string(),
    };
    if let Some(customer) = &filter.customer_id {
        message.push_str(&format!(" for customer {customer}"));
    }
    if let Some(sign) = &filter.sign_name {
        message.push_str(&format!(" with signature {sign}"));
    }
    if read > 0 {
        message.push_str(&format!(" ({read} row(s) read, none matched)"));
    }
    message
}
