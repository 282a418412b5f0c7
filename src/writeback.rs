//! Writing published links back into the source table.
//!
//! The links go into the column whose header (row 1) is exactly `file`, as one
//! column-major block starting at row 2. Position `i` of the block is data row
//! `i`, so the block must be in record order.

use crate::error::Sheet2PdfError;
use crate::source::{HeaderCell, MajorDimension, TabularSource};
use tracing::{debug, info};

/// Header of the column that receives published links.
pub const REFERENCE_COLUMN: &str = "file";

/// Spreadsheet column letters for a 1-based column index (1 → `A`, 27 → `AA`).
///
/// Index 0 has no letters and yields an empty string.
pub fn column_letters(index: u32) -> String {
    let mut letters = Vec::new();
    let mut n = index;
    while n > 0 {
        let remainder = (n - 1) % 26;
        letters.push(b'A' + remainder as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// 1-based column of the first header cell equal to `name`.
pub fn resolve_column(cells: &[HeaderCell], name: &str) -> Result<u32, Sheet2PdfError> {
    cells
        .iter()
        .find(|cell| cell.row == 1 && cell.value == name)
        .map(|cell| cell.col)
        .ok_or_else(|| Sheet2PdfError::ColumnNotFound {
            name: name.to_string(),
        })
}

/// Write `references` down the `file` column from row 2.
///
/// Returns the anchor cell written, e.g. `"C2"`, or `None` when there was
/// nothing to write.
pub async fn write_references(
    source: &dyn TabularSource,
    references: &[String],
) -> Result<Option<String>, Sheet2PdfError> {
    let cells = source.header_cells().await?;
    let column = resolve_column(&cells, REFERENCE_COLUMN)?;
    if references.is_empty() {
        debug!("No references to write back");
        return Ok(None);
    }

    let anchor = format!("{}2", column_letters(column));
    source
        .write_block(&anchor, vec![references.to_vec()], MajorDimension::Columns)
        .await?;
    info!("Wrote {} links starting at {}", references.len(), anchor);
    Ok(Some(anchor))
}
