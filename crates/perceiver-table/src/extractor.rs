use std::sync::atomic::{AtomicUsize, Ordering};

use action_primitives::{StabilizingWaiter, WaitError};
use cdp_adapter::{AdapterError, BrowserPage, FrameRef};
use dashprobe_core_types::{ExtractionResult, QueryKind, QueryRequest, ResultRow};
use tracing::{info, instrument};

use crate::errors::ExtractError;
use crate::model::TableSpec;
use crate::reader::TableReader;
use crate::reduce::{reduce, RowFilter};

/// Row count seen by one readiness probe.
#[derive(Clone, Copy, Debug)]
pub struct RowCount {
    pub rows: usize,
    /// Same non-zero count as the previous probe.
    pub stable: bool,
}

/// Waits for the report table to settle, then reads and reduces it.
pub struct TableExtractor {
    reader: TableReader,
    waiter: StabilizingWaiter,
}

impl TableExtractor {
    pub fn new(spec: TableSpec, waiter: StabilizingWaiter) -> Self {
        Self {
            reader: TableReader::new(spec),
            waiter,
        }
    }

    pub fn reader(&self) -> &TableReader {
        &self.reader
    }

    /// Poll until the row count is non-zero and unchanged across two probes.
    ///
    /// A table that stays empty until the ceiling is an empty answer, `Ok(0)`;
    /// one that keeps changing is [`ExtractError::Unstable`].
    #[instrument(skip_all)]
    pub async fn wait_ready(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<usize, ExtractError> {
        let previous = AtomicUsize::new(0);
        let outcome = self
            .waiter
            .until(
                "table rows",
                || self.count_probe(page, frame, &previous),
                |seen: &RowCount| seen.stable,
            )
            .await;
        match outcome {
            Ok(seen) => {
                info!(target: "table", rows = seen.rows, "table ready");
                Ok(seen.rows)
            }
            Err(WaitError::Timeout { state, .. }) => match state.last {
                Some(RowCount { rows, .. }) if rows > 0 => Err(ExtractError::Unstable { rows }),
                _ => {
                    info!(target: "table", "table stayed empty");
                    Ok(0)
                }
            },
            Err(WaitError::Aborted { cause, .. }) => Err(cause.into()),
        }
    }

    async fn count_probe(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        previous: &AtomicUsize,
    ) -> Result<Option<RowCount>, AdapterError> {
        let rows = self.reader.row_count(page, frame).await?;
        let before = previous.swap(rows, Ordering::SeqCst);
        Ok(Some(RowCount {
            rows,
            stable: rows > 0 && rows == before,
        }))
    }

    /// Read the current rows and reduce them for `kind`. Stale handles from
    /// a repaint mid-read restart the read under the waiter's ceilings.
    #[instrument(skip_all, fields(kind = %kind, customer = %request.customer_id))]
    pub async fn extract(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        kind: QueryKind,
        request: &QueryRequest,
    ) -> Result<ExtractionResult, ExtractError> {
        let rows = match self
            .waiter
            .until_some("table read", || self.read_probe(page, frame))
            .await
        {
            Ok(rows) => rows,
            Err(WaitError::Timeout { state, .. }) => {
                return Err(ExtractError::Unstable {
                    rows: state.last.map(|rows| rows.len()).unwrap_or(0),
                })
            }
            Err(WaitError::Aborted { cause, .. }) => return Err(cause.into()),
        };
        let result = reduce(kind, rows, &RowFilter::for_request(kind, request));
        info!(
            target: "table",
            success = result.success,
            total = result.total_count,
            ticket = result.ticket_id().unwrap_or("-"),
            "table extracted"
        );
        Ok(result)
    }

    async fn read_probe(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<Option<Vec<ResultRow>>, AdapterError> {
        Ok(Some(self.reader.read_rows(page, frame).await?))
    }
}
