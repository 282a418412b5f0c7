//! OAuth access tokens for the Google APIs.
//!
//! Two sources are supported:
//!
//! * `SHEET2PDF_ACCESS_TOKEN`: a ready-made bearer token (for CI, or when
//!   another tool already holds one). Used as-is, never refreshed.
//! * An authorized-user credentials file (`credentials.json`), the format
//!   written by Google's client libraries after a consent flow: `client_id`,
//!   `client_secret`, `refresh_token` and optionally `token_uri`. The refresh
//!   token is exchanged for an access token, which is cached until shortly
//!   before it expires.

use super::send_error;
use crate::error::Sheet2PdfError;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Environment variable holding a raw access token.
pub const ACCESS_TOKEN_ENV: &str = "SHEET2PDF_ACCESS_TOKEN";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Contents of an authorized-user credentials file.
#[derive(Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.refresh_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug)]
enum TokenSource {
    Static,
    Refresh(AuthorizedUser),
}

/// Hands out bearer tokens, refreshing when needed.
#[derive(Debug)]
pub struct Authenticator {
    source: TokenSource,
    cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    /// Use a fixed token.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static,
            cached: Mutex::new(Some(CachedToken {
                value: token.into(),
                refresh_at: None,
            })),
        }
    }

    /// Refresh tokens from authorized-user credentials.
    pub fn from_authorized_user(user: AuthorizedUser) -> Self {
        Self {
            source: TokenSource::Refresh(user),
            cached: Mutex::new(None),
        }
    }

    /// Load an authorized-user credentials file.
    pub fn from_file(path: &Path) -> Result<Self, Sheet2PdfError> {
        let text = std::fs::read_to_string(path).map_err(|e| Sheet2PdfError::Credentials {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let user: AuthorizedUser =
            serde_json::from_str(&text).map_err(|e| Sheet2PdfError::Credentials {
                path: path.to_path_buf(),
                detail: format!("not an authorized-user credentials file: {e}"),
            })?;
        Ok(Self::from_authorized_user(user))
    }

    /// Prefer `SHEET2PDF_ACCESS_TOKEN`, falling back to the credentials file.
    pub fn from_env_or_file(path: &Path) -> Result<Self, Sheet2PdfError> {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => {
                debug!("Using access token from {}", ACCESS_TOKEN_ENV);
                Ok(Self::from_token(token.trim()))
            }
            _ => Self::from_file(path),
        }
    }

    /// A valid access token, refreshing it if the cached one is stale.
    pub async fn token(&self, http: &reqwest::Client) -> Result<String, Sheet2PdfError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }
        let TokenSource::Refresh(user) = &self.source else {
            return Err(Sheet2PdfError::InvalidConfig(format!(
                "the access token from {ACCESS_TOKEN_ENV} is no longer cached"
            )));
        };

        let fresh = refresh(http, user).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

async fn refresh(http: &reqwest::Client, user: &AuthorizedUser) -> Result<CachedToken, Sheet2PdfError> {
    let uri = user.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    debug!("Refreshing access token via {}", uri);

    let response = http
        .post(uri)
        .form(&[
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.as_str()),
            ("refresh_token", user.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| send_error("OAuth", e))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(Sheet2PdfError::remote("OAuth", format!("HTTP {status}")));
    }
    let body = response.text().await.map_err(|e| send_error("OAuth", e))?;
    if !status.is_success() {
        return Err(Sheet2PdfError::Auth(format!(
            "token refresh rejected (HTTP {}): {}",
            status.as_u16(),
            body.trim()
        )));
    }
    parse_token_response(&body, Instant::now())
}

fn parse_token_response(body: &str, now: Instant) -> Result<CachedToken, Sheet2PdfError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| Sheet2PdfError::Auth(format!("malformed token response: {e}")))?;
    let refresh_at = parsed
        .expires_in
        .map(|secs| now + Duration::from_secs(secs).saturating_sub(EXPIRY_MARGIN));
    Ok(CachedToken {
        value: parsed.access_token,
        refresh_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_sets_refresh_deadline_with_margin() {
        let now = Instant::now();
        let token =
            parse_token_response(r#"{"access_token":"ya29.x","expires_in":3599,"token_type":"Bearer"}"#, now)
                .unwrap();
        assert_eq!(token.value, "ya29.x");
        assert_eq!(token.refresh_at, Some(now + Duration::from_secs(3539)));
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::from_secs(3540)));
    }

    #[test]
    fn token_without_expiry_never_goes_stale() {
        let now = Instant::now();
        let token = parse_token_response(r#"{"access_token":"t"}"#, now).unwrap();
        assert!(token.is_fresh(now + Duration::from_secs(86_400)));
    }

    #[test]
    fn malformed_token_response_is_auth_error() {
        let err = parse_token_response("{}", Instant::now()).unwrap_err();
        assert!(matches!(err, Sheet2PdfError::Auth(_)));
    }

    #[tokio::test]
    async fn static_token_is_returned_without_network() {
        let auth = Authenticator::from_token("abc");
        let http = reqwest::Client::new();
        assert_eq!(auth.token(&http).await.unwrap(), "abc");
        assert_eq!(auth.token(&http).await.unwrap(), "abc");
    }

    #[test]
    fn credentials_file_is_parsed_and_extra_keys_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"client_id":"id","client_secret":"s","refresh_token":"r","scopes":["x"],"expiry":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let auth = Authenticator::from_file(&path).unwrap();
        match auth.source {
            TokenSource::Refresh(user) => {
                assert_eq!(user.client_id, "id");
                assert_eq!(user.token_uri, None);
            }
            TokenSource::Static => panic!("expected refresh source"),
        }
    }

    #[test]
    fn missing_credentials_file_names_the_env_var() {
        let err = Authenticator::from_file(Path::new("/nonexistent/credentials.json")).unwrap_err();
        assert!(err.to_string().contains(ACCESS_TOKEN_ENV), "{err}");
        assert!(matches!(err, Sheet2PdfError::Credentials { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let user = AuthorizedUser {
            client_id: "id".into(),
            client_secret: "very-secret".into(),
            refresh_token: "also-secret".into(),
            token_uri: None,
        };
        let shown = format!("{user:?}");
        assert!(!shown.contains("secret"), "{shown}");
    }
}
