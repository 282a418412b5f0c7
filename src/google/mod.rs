//! Google Sheets and Google Drive adapters.
//!
//! The batch only talks to [`crate::source::TabularSource`],
//! [`crate::pipeline::publish::Publisher`] and
//! [`crate::pipeline::publish::TemplateStore`]; this module implements them on
//! top of the Sheets v4 and Drive v3 REST APIs with a shared `reqwest` client
//! and one [`auth::Authenticator`].
//!
//! Transport errors, timeouts, 408, 429, 5xx and 403 quota responses become
//! [`Sheet2PdfError::Remote`]; any other 4xx becomes
//! [`Sheet2PdfError::RemoteRejected`] so the status and message reach the
//! user. The remote retry policy retries both.

pub mod auth;
pub mod drive;
pub mod sheets;

use crate::config::SheetLocator;
use crate::error::Sheet2PdfError;
use auth::Authenticator;
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// `error.errors[].reason` values Google uses for quota refusals sent as 403.
const RATE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "sharingRateLimitExceeded",
    "quotaExceeded",
];

/// One authenticated HTTP session shared by every adapter.
#[derive(Clone)]
pub struct GoogleSession {
    http: reqwest::Client,
    auth: Arc<Authenticator>,
}

impl GoogleSession {
    pub fn new(auth: Authenticator) -> Result<Self, Sheet2PdfError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Sheet2PdfError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            auth: Arc::new(auth),
        })
    }

    pub fn sheets(&self, locator: SheetLocator) -> sheets::SheetsClient {
        sheets::SheetsClient::new(self.clone(), locator)
    }

    pub fn drive(&self) -> drive::DriveClient {
        drive::DriveClient::new(self.clone())
    }

    pub fn publisher(&self, folder_id: impl Into<String>) -> drive::DrivePublisher {
        drive::DrivePublisher::new(self.drive(), folder_id)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) async fn token(&self) -> Result<String, Sheet2PdfError> {
        self.auth.token(&self.http).await
    }
}

/// Map a transport-level failure.
pub(crate) fn send_error(service: &'static str, err: reqwest::Error) -> Sheet2PdfError {
    if err.is_timeout() {
        Sheet2PdfError::remote(service, format!("timed out: {err}"))
    } else {
        Sheet2PdfError::remote(service, err)
    }
}

/// Pass successful responses through; classify everything else.
pub(crate) async fn check_status(
    service: &'static str,
    response: Response,
) -> Result<Response, Sheet2PdfError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(service, status, &body))
}

fn status_error(service: &'static str, status: StatusCode, body: &str) -> Sheet2PdfError {
    let detail = error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    let transient = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && is_rate_limited(body));
    if transient {
        Sheet2PdfError::remote(service, format!("HTTP {}: {}", status.as_u16(), detail))
    } else {
        Sheet2PdfError::RemoteRejected {
            service,
            status: status.as_u16(),
            detail,
        }
    }
}

/// `error.message` from a Google API error body, if present.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// True when a Google error body carries a quota reason.
fn is_rate_limited(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    value
        .pointer("/error/errors")
        .and_then(|e| e.as_array())
        .into_iter()
        .flatten()
        .filter_map(|e| e.get("reason").and_then(|r| r.as_str()))
        .any(|reason| RATE_LIMIT_REASONS.contains(&reason))
}
