//! Result-table extraction: read the rendered rows, drop what does not
//! match the request, collapse duplicates and pick the answer.

pub mod errors;
pub mod extractor;
pub mod model;
pub mod reader;
pub mod reduce;

pub use errors::ExtractError;
pub use extractor::{RowCount, TableExtractor};
pub use model::{ChartTitle, ColumnRole, HeaderMarker, TableColumn, TableSpec};
pub use reader::{ticket_id, TableReader};
pub use reduce::{dedup, natural_key, reduce, select, RowFilter};
