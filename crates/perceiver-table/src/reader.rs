use std::sync::OnceLock;

use cdp_adapter::{AdapterError, AnchorDescriptor, BrowserPage, ElementRef, FrameRef};
use dashprobe_core_types::ResultRow;
use regex::Regex;
use tracing::{debug, trace};

use crate::model::{ColumnRole, TableSpec};

/// First run of digits in a cell, e.g. `工单 20240112001 (已完成)`.
pub fn ticket_id(raw: &str) -> Option<String> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    DIGITS
        .get_or_init(|| Regex::new(r"\d+").ok())
        .as_ref()
        .and_then(|re| re.find(raw))
        .map(|found| found.as_str().to_string())
}

/// Reads the rendered rows of one table. Handles are re-resolved on every
/// call; nothing is cached between reads.
#[derive(Clone, Debug)]
pub struct TableReader {
    spec: TableSpec,
}

impl TableReader {
    pub fn new(spec: TableSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    /// Ancestor holding the titled chart, or `None` for an untitled table.
    /// A configured title that is not rendered yields an empty scope.
    async fn scope(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<Scope, AdapterError> {
        let Some(title) = &self.spec.title else {
            return Ok(Scope::Frame);
        };
        let anchor = AnchorDescriptor::css(title.selector.clone());
        for candidate in page.query(frame, None, &anchor).await? {
            let text = page.read_text(frame, &candidate).await?;
            if !text.contains(title.text.as_str()) {
                continue;
            }
            if let Some(container) = page.closest(frame, &candidate, &title.container_selector).await? {
                trace!(target: "table", title = %title.text, container = %container, "chart container found");
                return Ok(Scope::Element(container));
            }
        }
        Ok(Scope::Missing)
    }

    async fn row_elements(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<Vec<ElementRef>, AdapterError> {
        let anchor = AnchorDescriptor::css(self.spec.row_selector.clone());
        match self.scope(page, frame).await? {
            Scope::Frame => page.query(frame, None, &anchor).await,
            Scope::Element(container) => page.query(frame, Some(&container), &anchor).await,
            Scope::Missing => Ok(Vec::new()),
        }
    }

    /// Rendered rows, header rows included.
    pub async fn row_count(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<usize, AdapterError> {
        Ok(self.row_elements(page, frame).await?.len())
    }

    /// Parse every data row. Rows with too few cells and header rows are
    /// skipped; positions count parsed rows only.
    pub async fn read_rows(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<Vec<ResultRow>, AdapterError> {
        let cell_anchor = AnchorDescriptor::css(self.spec.cell_selector.clone());
        let required = self.spec.required_cells();
        let mut rows = Vec::new();
        for (index, element) in self.row_elements(page, frame).await?.into_iter().enumerate() {
            let cells = page.query(frame, Some(&element), &cell_anchor).await?;
            if cells.len() < required {
                debug!(target: "table", row = index, cells = cells.len(), required, "row skipped: too few cells");
                continue;
            }
            let mut texts = Vec::with_capacity(cells.len());
            for cell in &cells {
                texts.push(self.cell_text(page, frame, cell).await?);
            }
            if self.spec.is_header(&texts) {
                trace!(target: "table", row = index, "header row skipped");
                continue;
            }
            if let Some(row) = self.build_row(rows.len(), &texts) {
                rows.push(row);
            } else {
                debug!(target: "table", row = index, "row skipped: no ticket id");
            }
        }
        Ok(rows)
    }

    async fn cell_text(&self, page: &dyn BrowserPage, frame: &FrameRef, cell: &ElementRef) -> Result<String, AdapterError> {
        if let Some(selector) = &self.spec.cell_text_selector {
            let inner = page
                .query(frame, Some(cell), &AnchorDescriptor::css(selector.clone()))
                .await?;
            if let Some(first) = inner.first() {
                return Ok(page.read_text(frame, first).await?.trim().to_string());
            }
        }
        Ok(page.read_text(frame, cell).await?.trim().to_string())
    }

    /// `None` only when a ticket column is configured and holds no digits.
    fn build_row(&self, position: usize, texts: &[String]) -> Option<ResultRow> {
        let mut row = ResultRow::new(position);
        for (column, text) in self.spec.columns.iter().zip(texts) {
            row = match column.role {
                Some(ColumnRole::Ticket) => row.with_ticket(ticket_id(text)?),
                Some(ColumnRole::Modified) => row.with_modified(text.as_str()),
                Some(ColumnRole::SignName) => row.with_sign_name(text.as_str()),
                Some(ColumnRole::Customer) => row.with_customer(text.as_str()),
                Some(ColumnRole::SuccessRate) => row.with_success_rate(text.as_str()),
                None => row,
            };
            row = row.with_field(column.name.as_str(), text.as_str());
        }
        Some(row)
    }
}

enum Scope {
    Frame,
    Element(ElementRef),
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChartTitle, TableColumn};
    use cdp_adapter::fake::{FakeNode, FakePage};

    const ROW: &str = "div.obviz-base-easyTable-row";
    const CELL: &str = "div.obviz-base-easyTable-cell";
    const SPLIT: &str = "div.table-m__split-container span";

    fn rate_spec() -> TableSpec {
        TableSpec::new(
            ROW,
            CELL,
            vec![
                TableColumn::role("pid", ColumnRole::Customer),
                TableColumn::role("signname", ColumnRole::SignName),
                TableColumn::field("sms_type"),
                TableColumn::role("receipt_success_rate", ColumnRole::SuccessRate),
            ],
        )
        .under_title(ChartTitle {
            selector: "div.chart-title".into(),
            text: "客户签名视角".into(),
            container_selector: "div.sls-chart".into(),
        })
        .prefer_text_in(SPLIT)
        .header_when(0, &["pid", "客户pid"])
    }

    fn add_chart(page: &FakePage, title: &str, rows: &[&[&str]]) {
        page.with_dom(|dom| {
            let main = dom.main_frame();
            let chart = dom.add(&main, None, FakeNode::new("div").matches("div.sls-chart"));
            dom.add(&main, Some(&chart), FakeNode::new("div").matches("div.chart-title").text(title));
            for cells in rows {
                let row = dom.add(&main, Some(&chart), FakeNode::new("div").matches(ROW));
                for text in cells.iter() {
                    let cell = dom.add(&main, Some(&row), FakeNode::new("div").matches(CELL));
                    let split = dom.add(&main, Some(&cell), FakeNode::new("div"));
                    dom.add(&main, Some(&split), FakeNode::new("span").matches(SPLIT).text(*text));
                    dom.add(&main, Some(&cell), FakeNode::new("i").text("⇅"));
                }
            }
        });
    }

    #[test]
    fn ticket_id_is_first_digit_run() {
        assert_eq!(ticket_id("工单 20240112001 (v2)").as_deref(), Some("20240112001"));
        assert_eq!(ticket_id("—"), None);
    }

    #[tokio::test]
    async fn reads_titled_chart_only_and_skips_headers() {
        let page = FakePage::new("https://sls.example.com/dashboard");
        add_chart(&page, "渠道视角", &[&["999", "Other", "通知", "50.0"]]);
        add_chart(
            &page,
            "客户签名视角 -剔除重试过程",
            &[
                &["pid", "signname", "短信类型", "回执成功率"],
                &["100", "国能e购", "验证码", "97.31"],
                &["100", "国能e购"],
            ],
        );
        let reader = TableReader::new(rate_spec());
        let rows = reader.read_rows(&page, &page.main_frame()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.customer_id.as_deref(), Some("100"));
        assert_eq!(row.success_rate.as_deref(), Some("97.31"), "split container text preferred");
        assert_eq!(row.field("sms_type"), Some("验证码"));
        assert_eq!(reader.row_count(&page, &page.main_frame()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn missing_title_reads_nothing() {
        let page = FakePage::new("https://sls.example.com/dashboard");
        add_chart(&page, "渠道视角", &[&["100", "A", "通知", "50.0"]]);
        let reader = TableReader::new(rate_spec());
        assert!(reader.read_rows(&page, &page.main_frame()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ticket_rows_without_digits_are_dropped() {
        let page = FakePage::new("https://ops.example.com/sign");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            for cells in [["工单 42", "S", "2024-01-10"], ["暂无", "S", "2024-01-11"]] {
                let row = dom.add(&main, None, FakeNode::new("tr").matches("tr.row"));
                for text in cells {
                    dom.add(&main, Some(&row), FakeNode::new("td").text(text));
                }
            }
        });
        let reader = TableReader::new(TableSpec::new(
            "tr.row",
            "td",
            vec![
                TableColumn::role("ticket", ColumnRole::Ticket),
                TableColumn::role("sign_name", ColumnRole::SignName),
                TableColumn::role("modified", ColumnRole::Modified),
            ],
        ));
        let rows = reader.read_rows(&page, &page.main_frame()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ticket_id.as_deref(), Some("42"));
        assert_eq!(rows[0].modified_raw.as_deref(), Some("2024-01-10"));
    }
}
