//! Rendering of query outcomes and the process exit code they map to.

use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use dashprobe_core_types::{ExtractionResult, FailureKind, QueryKind, ResultRow};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Yaml,
}

pub fn render(result: &ExtractionResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Human => render_human(result),
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Yaml => serde_yaml::to_string(result)?,
    })
}

/// `0` for an answer and for an empty-but-valid query, `1` otherwise.
pub fn exit_code(result: &ExtractionResult) -> u8 {
    match result.failure_kind() {
        None | Some(FailureKind::NoMatchingData) => 0,
        Some(_) => 1,
    }
}

pub fn render_human(result: &ExtractionResult) -> String {
    let mut out = String::new();
    if !result.success {
        let (kind, stage, message) = match &result.error {
            Some(failure) => (
                failure.kind.name(),
                failure.stage.map(|s| s.name()).unwrap_or("-"),
                failure.message.as_str(),
            ),
            None => ("Unknown", "-", ""),
        };
        let _ = writeln!(out, "[FAIL] {} query: {kind} (stage {stage})", result.kind);
        let _ = writeln!(out, "  {message}");
        let _ = writeln!(out, "  attempts: {}", result.attempts);
        return out;
    }

    match result.kind {
        QueryKind::Ticket => {
            let latest = result.selected.as_ref();
            let _ = writeln!(out, "[OK] latest ticket: {}", result.ticket_id().unwrap_or("-"));
            if let Some(modified) = latest.and_then(|row| row.modified_raw.as_deref()) {
                let _ = writeln!(out, "  modified: {modified}");
            }
            if result.total_count > 1 {
                let _ = writeln!(out, "\n{} ticket(s) found:", result.total_count);
                for (index, row) in result.rows.iter().enumerate() {
                    let _ = writeln!(out, "  {}. {}", index + 1, ticket_line(row));
                }
            }
        }
        QueryKind::SuccessRate => {
            let rate = result.success_rate.as_deref().unwrap_or("-");
            let _ = writeln!(out, "[OK] success rate: {rate}");
            if let Some(window) = &result.window {
                let _ = writeln!(out, "  window: {window}");
            }
            let _ = writeln!(out, "\n{} record(s):", result.total_count);
            for (index, row) in result.rows.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", index + 1, rate_line(row));
            }
        }
    }
    out
}

fn ticket_line(row: &ResultRow) -> String {
    format!(
        "ticket {}, modified {}",
        row.ticket_id.as_deref().unwrap_or("-"),
        row.modified_raw.as_deref().unwrap_or("-")
    )
}

fn rate_line(row: &ResultRow) -> String {
    format!(
        "sign {}, rate {}, type {}, submitted {}",
        row.sign_name.as_deref().unwrap_or("-"),
        row.success_rate.as_deref().unwrap_or("-"),
        row.field("sms_type").unwrap_or("-"),
        row.field("submit_count").unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashprobe_core_types::{QueryFailure, QueryStage};

    fn ticket(position: usize, id: &str, modified: &str) -> ResultRow {
        ResultRow::new(position).with_ticket(id).with_modified(modified)
    }

    #[test]
    fn ticket_lists_every_candidate() {
        let rows = vec![ticket(0, "3301", "2024-01-10"), ticket(1, "3302", "2024-01-12")];
        let result = ExtractionResult::matched(QueryKind::Ticket, rows[1].clone(), rows);
        let text = render_human(&result);
        assert!(text.starts_with("[OK] latest ticket: 3302"), "{text}");
        assert!(text.contains("2 ticket(s) found"));
        assert!(text.contains("1. ticket 3301, modified 2024-01-10"));
        assert_eq!(exit_code(&result), 0);
    }

    #[test]
    fn no_data_exits_cleanly_with_failure_shape() {
        let result = ExtractionResult::no_data(QueryKind::Ticket, "no ticket for 国能e购");
        assert_eq!(exit_code(&result), 0);
        let json = render(&result, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["kind"], "NoMatchingData");
    }

    #[test]
    fn other_failures_exit_non_zero() {
        let failure = QueryFailure::new(FailureKind::FrameNotFound, "report frame missing").at(QueryStage::FrameReady);
        let result = ExtractionResult::failed(QueryKind::SuccessRate, failure).with_attempts(3);
        assert_eq!(exit_code(&result), 1);
        let text = render_human(&result);
        assert!(text.contains("FrameNotFound (stage frame_ready)"), "{text}");
        assert!(text.contains("attempts: 3"));
    }

    #[test]
    fn rate_rows_show_type_and_submissions() {
        let row = ResultRow::new(0)
            .with_sign_name("国能e购")
            .with_success_rate("97.5%")
            .with_field("sms_type", "验证码")
            .with_field("submit_count", "120");
        let result = ExtractionResult::matched(QueryKind::SuccessRate, row.clone(), vec![row]);
        let text = render(&result, OutputFormat::Human).unwrap();
        assert!(text.contains("[OK] success rate: 97.5%"));
        assert!(text.contains("sign 国能e购, rate 97.5%, type 验证码, submitted 120"), "{text}");
    }
}
