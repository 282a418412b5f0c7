//! Records: one validated unit of personalisation data per sheet row.
//!
//! A sheet row arrives as an ordered list of `(header, value)` pairs. Only two
//! kinds of columns matter: the `filename` column naming the output document,
//! and placeholder columns whose header is a bracket-delimited token such as
//! `<name>`. Everything else in the sheet (notes, the `file` link column,
//! helper formulas) is ignored.

use crate::error::{RecordError, Sheet2PdfError};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Header of the column holding each record's output base name.
pub const FILENAME_COLUMN: &str = "filename";

/// One ordered `(header, value)` row as returned by a tabular source.
pub type SheetRow = Vec<(String, String)>;

/// One data row: a record, or why the row cannot become one.
pub type RowOutcome = Result<Record, RecordError>;

/// A single literal substitution: every occurrence of `placeholder` becomes `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub placeholder: String,
    pub value: String,
}

impl Field {
    pub fn new(placeholder: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            value: value.into(),
        }
    }
}

/// Output filename plus ordered placeholder values for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    filename: String,
    fields: Vec<Field>,
}

impl Record {
    /// Construct a record, validating the filename.
    ///
    /// `row` is the 1-based data row number used in error messages.
    pub fn new(
        row: usize,
        filename: impl Into<String>,
        fields: Vec<Field>,
    ) -> Result<Self, Sheet2PdfError> {
        let filename = filename.into();
        validate_filename(row, &filename)?;
        Ok(Self { filename, fields })
    }

    /// Build a record from a sheet row, keeping only `filename` and `<...>` columns.
    pub fn from_row(row_number: usize, row: &[(String, String)]) -> Result<Self, Sheet2PdfError> {
        let filename = row
            .iter()
            .find(|(header, _)| header == FILENAME_COLUMN)
            .map(|(_, value)| value.trim().to_string())
            .ok_or(Sheet2PdfError::MissingFilenameColumn)?;

        let fields = row
            .iter()
            .filter(|(header, _)| is_placeholder(header))
            .map(|(header, value)| Field::new(header.clone(), value.clone()))
            .collect();

        Self::new(row_number, filename, fields)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Placeholder substitutions in source column order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// True when a column header is a bracket-delimited placeholder token.
pub fn is_placeholder(header: &str) -> bool {
    header.len() >= 3 && header.starts_with('<') && header.ends_with('>')
}

/// Turn every sheet row into a record, in row order.
///
/// Rows are numbered from 1 (the first data row, i.e. sheet row 2) and
/// outcome `i` always belongs to data row `i`, so write-back stays
/// positional. Blank rows and rows with an unusable filename become
/// [`RecordError::InvalidRow`] outcomes. A missing `filename` column and
/// duplicate filenames are fatal.
pub fn build_records(rows: &[SheetRow]) -> Result<Vec<RowOutcome>, Sheet2PdfError> {
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut outcomes = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let row_number = i + 1;
        if is_blank(row) {
            warn!("Row {} is blank, skipping it", row_number);
            outcomes.push(Err(RecordError::InvalidRow {
                row: row_number,
                filename: String::new(),
                reason: "row is blank".into(),
            }));
            continue;
        }

        let record = match Record::from_row(row_number, row) {
            Ok(record) => record,
            Err(Sheet2PdfError::InvalidRecord { row: n, reason }) => {
                warn!("Row {}: {}, skipping it", n, reason);
                outcomes.push(Err(RecordError::InvalidRow {
                    row: n,
                    filename: filename_cell(row),
                    reason,
                }));
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Some(&first) = seen.get(record.filename()) {
            return Err(Sheet2PdfError::DuplicateFilename {
                filename: record.filename().to_string(),
                first,
                second: row_number,
            });
        }
        seen.insert(record.filename().to_string(), row_number);
        outcomes.push(Ok(record));
    }

    Ok(outcomes)
}

/// True when every cell of the row is empty; the Sheets API returns a blank
/// spacer row as no cells at all.
fn is_blank(row: &[(String, String)]) -> bool {
    row.iter().all(|(_, value)| value.trim().is_empty())
}

fn filename_cell(row: &[(String, String)]) -> String {
    row.iter()
        .find(|(header, _)| header == FILENAME_COLUMN)
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}

fn validate_filename(row: usize, filename: &str) -> Result<(), Sheet2PdfError> {
    let reason = if filename.is_empty() {
        "filename is empty"
    } else if filename.contains(['/', '\\']) {
        "filename must not contain a path separator"
    } else if filename == "." || filename == ".." {
        "filename must not be '.' or '..'"
    } else {
        return Ok(());
    };
    Err(Sheet2PdfError::InvalidRecord {
        row,
        reason: format!("{reason} (got {filename:?})"),
    })
}
