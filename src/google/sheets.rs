//! Google Sheets v4 adapter for [`TabularSource`].

use super::{check_status, send_error, GoogleSession};
use crate::config::SheetLocator;
use crate::error::Sheet2PdfError;
use crate::record::SheetRow;
use crate::source::{
    header_cells_from_values, rows_from_values, HeaderCell, MajorDimension, TabularSource,
};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const SERVICE: &str = "Sheets";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// One worksheet, addressed by spreadsheet id and gid.
pub struct SheetsClient {
    session: GoogleSession,
    locator: SheetLocator,
    title: OnceCell<String>,
}

impl SheetsClient {
    pub fn new(session: GoogleSession, locator: SheetLocator) -> Self {
        Self {
            session,
            locator,
            title: OnceCell::new(),
        }
    }

    /// Worksheet title for the configured gid, looked up once.
    async fn title(&self) -> Result<&str, Sheet2PdfError> {
        let title = self
            .title
            .get_or_try_init(|| async {
                let url = self.url(&[], &[("fields", "sheets.properties(sheetId,title)")])?;
                let meta: SpreadsheetMeta = self.get_json(url).await?;
                let title = sheet_title(&meta, self.locator.gid)?;
                debug!("Worksheet gid {} is '{}'", self.locator.gid, title);
                Ok::<_, Sheet2PdfError>(title)
            })
            .await?;
        Ok(title.as_str())
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, Sheet2PdfError> {
        let url = self.url(
            &["values", range],
            &[("valueRenderOption", "FORMATTED_VALUE"), ("majorDimension", "ROWS")],
        )?;
        let body: ValueRange = self.get_json(url).await?;
        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, Sheet2PdfError> {
        let mut url = Url::parse(SHEETS_API)
            .and_then(|base| base.join(&self.locator.spreadsheet_id))
            .map_err(|e| Sheet2PdfError::Internal(format!("Sheets URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Sheet2PdfError::Internal("Sheets URL cannot be a base".into()))?
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url) -> Result<T, Sheet2PdfError>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.session.token().await?;
        let response = self
            .session
            .http()
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| send_error(SERVICE, e))
    }
}

#[async_trait]
impl TabularSource for SheetsClient {
    async fn rows(&self) -> Result<Vec<SheetRow>, Sheet2PdfError> {
        let range = quote_sheet(self.title().await?);
        let values = self.read_range(&range).await?;
        Ok(rows_from_values(&values))
    }

    async fn header_cells(&self) -> Result<Vec<HeaderCell>, Sheet2PdfError> {
        let range = format!("{}!1:1", quote_sheet(self.title().await?));
        let values = self.read_range(&range).await?;
        Ok(header_cells_from_values(&values))
    }

    async fn write_block(
        &self,
        anchor: &str,
        values: Vec<Vec<String>>,
        major: MajorDimension,
    ) -> Result<(), Sheet2PdfError> {
        let range = format!("{}!{}", quote_sheet(self.title().await?), anchor);
        let url = self.url(&["values", &range], &[("valueInputOption", "RAW")])?;
        let body = json!({
            "range": range,
            "majorDimension": major,
            "values": values,
        });

        let token = self.session.token().await?;
        let response = self
            .session
            .http()
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        check_status(SERVICE, response).await?;
        debug!("Updated {}", range);
        Ok(())
    }
}

fn sheet_title(meta: &SpreadsheetMeta, gid: u64) -> Result<String, Sheet2PdfError> {
    meta.sheets
        .iter()
        .find(|s| s.properties.sheet_id == gid)
        .map(|s| s.properties.title.clone())
        .ok_or_else(|| Sheet2PdfError::InvalidLocator {
            kind: "sheet",
            value: format!("gid={gid}"),
            reason: "no worksheet with this gid in the spreadsheet".into(),
        })
}

/// A1-notation sheet reference: `'Title'`, with embedded quotes doubled.
fn quote_sheet(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
