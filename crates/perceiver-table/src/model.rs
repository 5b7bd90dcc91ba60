use serde::{Deserialize, Serialize};

/// What a column contributes to a [`ResultRow`](dashprobe_core_types::ResultRow).
///
/// Columns without a role only land in the row's display fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// First run of digits in the cell becomes the ticket id.
    Ticket,
    Modified,
    SignName,
    Customer,
    SuccessRate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ColumnRole>,
}

impl TableColumn {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
        }
    }

    pub fn role(name: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            role: Some(role),
        }
    }
}

/// Chart title used to pick one table out of several on the same frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartTitle {
    pub selector: String,
    /// Substring the title must contain.
    pub text: String,
    /// Ancestor of the title that also holds the table.
    pub container_selector: String,
}

/// Cell at `column` reading any of `texts` (case-insensitive) marks a header row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeaderMarker {
    pub column: usize,
    pub texts: Vec<String>,
}

/// Layout of one rendered result table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<ChartTitle>,
    pub row_selector: String,
    pub cell_selector: String,
    /// Inner element whose text is preferred over the whole cell's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_text_selector: Option<String>,
    pub columns: Vec<TableColumn>,
    /// Rows with fewer cells are skipped; defaults to the column count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cells: Option<usize>,
    #[serde(default)]
    pub header_markers: Vec<HeaderMarker>,
}

impl TableSpec {
    pub fn new(row_selector: impl Into<String>, cell_selector: impl Into<String>, columns: Vec<TableColumn>) -> Self {
        Self {
            title: None,
            row_selector: row_selector.into(),
            cell_selector: cell_selector.into(),
            cell_text_selector: None,
            columns,
            min_cells: None,
            header_markers: Vec::new(),
        }
    }

    pub fn under_title(mut self, title: ChartTitle) -> Self {
        self.title = Some(title);
        self
    }

    pub fn prefer_text_in(mut self, selector: impl Into<String>) -> Self {
        self.cell_text_selector = Some(selector.into());
        self
    }

    pub fn with_min_cells(mut self, min_cells: usize) -> Self {
        self.min_cells = Some(min_cells);
        self
    }

    pub fn header_when(mut self, column: usize, texts: &[&str]) -> Self {
        self.header_markers.push(HeaderMarker {
            column,
            texts: texts.iter().map(|text| text.to_string()).collect(),
        });
        self
    }

    pub fn required_cells(&self) -> usize {
        self.min_cells.unwrap_or(self.columns.len())
    }

    pub fn is_header(&self, cells: &[String]) -> bool {
        self.header_markers.iter().any(|marker| {
            cells
                .get(marker.column)
                .map(|cell| {
                    let cell = cell.trim().to_lowercase();
                    marker.texts.iter().any(|text| text.to_lowercase() == cell)
                })
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_detection_is_case_insensitive() {
        let spec = TableSpec::new("tr", "td", vec![TableColumn::field("pid"), TableColumn::field("signname")])
            .header_when(0, &["pid", "客户pid"])
            .header_when(1, &["signname", "签名"]);
        assert!(spec.is_header(&["PID".into(), "x".into()]));
        assert!(spec.is_header(&["100".into(), " 签名 ".into()]));
        assert!(!spec.is_header(&["100".into(), "国能e购".into()]));
        assert!(!spec.is_header(&[]));
    }

    #[test]
    fn spec_reads_from_yaml() {
        let spec: TableSpec = serde_yaml::from_str(
            r#"
row_selector: tr.row
cell_selector: td
columns:
  - { name: ticket, role: ticket }
  - { name: sign_name, role: sign_name }
  - { name: note }
"#,
        )
        .unwrap();
        assert_eq!(spec.columns[0].role, Some(ColumnRole::Ticket));
        assert_eq!(spec.columns[2].role, None);
        assert_eq!(spec.required_cells(), 3);
    }
}
