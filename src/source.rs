//! Tabular data source seam.
//!
//! The batch reads its records from, and writes its links back to, a table
//! whose first row holds the column headers. [`TabularSource`] is the narrow
//! interface the batch needs; [`crate::google::sheets::SheetsClient`] is the
//! production implementation.

use crate::error::Sheet2PdfError;
use crate::record::SheetRow;
use async_trait::async_trait;
use serde::Serialize;

/// A non-empty header cell (row 1) with its 1-based coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

/// Orientation of a block of values being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MajorDimension {
    /// Each inner vector is one row.
    Rows,
    /// Each inner vector is one column.
    Columns,
}

#[async_trait]
pub trait TabularSource: Send + Sync {
    /// Every data row (sheet rows 2..) as ordered `(header, value)` pairs.
    async fn rows(&self) -> Result<Vec<SheetRow>, Sheet2PdfError>;

    /// Non-empty cells of the header row.
    async fn header_cells(&self) -> Result<Vec<HeaderCell>, Sheet2PdfError>;

    /// Write `values` starting at the A1-notation `anchor` cell.
    async fn write_block(
        &self,
        anchor: &str,
        values: Vec<Vec<String>>,
        major: MajorDimension,
    ) -> Result<(), Sheet2PdfError>;
}

/// Pair each data row with the header row.
///
/// Short rows are padded with empty strings, matching how the Sheets API
/// trims trailing blank cells.
pub fn rows_from_values(values: &[Vec<String>]) -> Vec<SheetRow> {
    let Some((headers, data)) = values.split_first() else {
        return Vec::new();
    };
    data.iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Header cells from the first row of a value grid.
pub fn header_cells_from_values(values: &[Vec<String>]) -> Vec<HeaderCell> {
    values
        .first()
        .map(|headers| {
            headers
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_empty())
                .map(|(i, value)| HeaderCell {
                    row: 1,
                    col: i as u32 + 1,
                    value: value.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}
