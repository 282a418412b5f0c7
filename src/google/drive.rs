//! Google Drive v3 adapters: template export and PDF publishing.

use super::{check_status, send_error, GoogleSession};
use crate::error::Sheet2PdfError;
use crate::pipeline::publish::{Publisher, TemplateStore};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files/";
const UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";
const SERVICE: &str = "Drive";

/// MIME type requested when exporting a hosted presentation.
pub const PPTX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    id: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl UploadedFile {
    /// The shareable link, or a constructed one when the field was omitted.
    fn reference(self) -> String {
        self.web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", self.id))
    }
}

/// Drive file operations shared by the template store and the publisher.
#[derive(Clone)]
pub struct DriveClient {
    session: GoogleSession,
}

impl DriveClient {
    pub fn new(session: GoogleSession) -> Self {
        Self { session }
    }

    fn file_url(
        &self,
        id: &str,
        tail: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url, Sheet2PdfError> {
        let mut url = Url::parse(DRIVE_API)
            .map_err(|e| Sheet2PdfError::Internal(format!("Drive URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Sheet2PdfError::Internal("Drive URL cannot be a base".into()))?
            .pop_if_empty()
            .push(id)
            .extend(tail);
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("supportsAllDrives", "true");
        Ok(url)
    }

    /// Upload `path` as a PDF named `title` into `folder_id`.
    pub async fn upload_pdf(
        &self,
        folder_id: &str,
        title: &str,
        path: &Path,
    ) -> Result<String, Sheet2PdfError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| Sheet2PdfError::io(path, e))?;
        let metadata = json!({
            "name": title,
            "parents": [folder_id],
            "mimeType": PDF_MIME,
        });
        let boundary = boundary_for(&content);
        let body = multipart_related(&boundary, &metadata, PDF_MIME, &content);

        let token = self.session.token().await?;
        let response = self
            .session
            .http()
            .post(UPLOAD_API)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id,webViewLink"),
                ("supportsAllDrives", "true"),
            ])
            .bearer_auth(token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let uploaded: UploadedFile = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        debug!("Uploaded {} as {}", path.display(), uploaded.id);
        Ok(uploaded.reference())
    }

    /// Grant anyone-with-the-link read access to a file or folder.
    pub async fn share_with_anyone(&self, id: &str) -> Result<(), Sheet2PdfError> {
        let url = self.file_url(id, &["permissions"], &[])?;
        let token = self.session.token().await?;
        let response = self
            .session
            .http()
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        check_status(SERVICE, response).await?;
        info!("Shared {} with anyone holding the link", id);
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for DriveClient {
    async fn export_presentation(&self, id: &str, dest: &Path) -> Result<(), Sheet2PdfError> {
        let url = self.file_url(id, &["export"], &[("mimeType", PPTX_MIME)])?;
        let token = self.session.token().await?;
        let response = self
            .session
            .http()
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let bytes = check_status(SERVICE, response)
            .await?
            .bytes()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| Sheet2PdfError::io(dest, e))?;
        info!("Exported presentation {} ({} bytes)", id, bytes.len());
        Ok(())
    }
}

/// Publishes PDFs into one Drive folder.
pub struct DrivePublisher {
    drive: DriveClient,
    folder_id: String,
}

impl DrivePublisher {
    pub fn new(drive: DriveClient, folder_id: impl Into<String>) -> Self {
        Self {
            drive,
            folder_id: folder_id.into(),
        }
    }
}

#[async_trait]
impl Publisher for DrivePublisher {
    async fn publish(&self, title: &str, path: &Path) -> Result<String, Sheet2PdfError> {
        self.drive.upload_pdf(&self.folder_id, title, path).await
    }

    async fn share_publicly(&self) -> Result<(), Sheet2PdfError> {
        self.drive.share_with_anyone(&self.folder_id).await
    }
}

/// A multipart boundary that does not occur in `content`.
fn boundary_for(content: &[u8]) -> String {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut n: u32 = 0;
    loop {
        let boundary = format!("sheet2pdf-{seed:x}-{n}");
        if !contains(content, boundary.as_bytes()) {
            return boundary;
        }
        n += 1;
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// `multipart/related` body: JSON metadata part, then the media part.
fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    media_type: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: {media_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::auth::Authenticator;

    #[test]
    fn multipart_body_layout() {
        let metadata = json!({ "name": "alice.pdf" });
        let body = multipart_related("B", &metadata, PDF_MIME, b"%PDF-1.7");
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            "--B\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"alice.pdf\"}\r\n\
             --B\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.7\r\n--B--\r\n"
        );
    }

    #[test]
    fn boundary_never_appears_in_content() {
        let content = b"abc sheet2pdf- xyz".to_vec();
        let boundary = boundary_for(&content);
        assert!(boundary.starts_with("sheet2pdf-"));
        assert!(!contains(&content, boundary.as_bytes()));
    }

    #[test]
    fn missing_web_view_link_falls_back_to_file_url() {
        let f: UploadedFile = serde_json::from_str(r#"{"id":"F1"}"#).unwrap();
        assert_eq!(f.reference(), "https://drive.google.com/file/d/F1/view");
        let f: UploadedFile =
            serde_json::from_str(r#"{"id":"F1","webViewLink":"https://x/view"}"#).unwrap();
        assert_eq!(f.reference(), "https://x/view");
    }

    #[test]
    fn export_url_carries_mime_type() {
        let drive = DriveClient::new(GoogleSession::new(Authenticator::from_token("t")).unwrap());
        let url = drive
            .file_url("PRES", &["export"], &[("mimeType", PPTX_MIME)])
            .unwrap();
        assert_eq!(url.path(), "/drive/v3/files/PRES/export");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("mimeType".to_string(), PPTX_MIME.to_string()),
                ("supportsAllDrives".to_string(), "true".to_string()),
            ]
        );
    }
}
