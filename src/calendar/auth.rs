//! OAuth 2.0 for the installed-app flow.
//!
//! First run: [`OAuthClient::authorize_url`] → Google redirects the browser
//! to a loopback address where [`receive_code`] picks up the code (or the
//! user pastes the redirect URL) → [`OAuthClient::exchange_code`] →
//! [`TokenStore::save`]. Afterwards
//! [`TokenManager`] hands out access tokens, refreshing and rewriting the
//! token file when the stored one has expired.

use crate::error::Tt2CalError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
pub const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Default redirect. Google accepts any port on a loopback host for
/// installed-app clients.
pub const LOOPBACK_REDIRECT_URI: &str = "http://localhost:8085";
const LOOPBACK_DEFAULT_PORT: u16 = 8085;
/// Largest request head read from the browser redirect.
const MAX_REDIRECT_REQUEST: usize = 16 * 1024;

/// Tokens are refreshed this long before their nominal expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Anything that can produce a bearer token for the calendar API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, Tt2CalError>;
}

/// A fixed bearer token. Useful against mock servers.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, Tt2CalError> {
        Ok(self.0.clone())
    }
}

/// Contents of `token.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

/// The token file on disk.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no token has been saved yet.
    pub fn load(&self) -> Result<Option<StoredToken>, Tt2CalError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| self.error(e))
    }

    /// Write the token through a temp file in the same directory, then
    /// rename over the old one.
    pub fn save(&self, token: &StoredToken) -> Result<(), Tt2CalError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let json = serde_json::to_vec_pretty(token).map_err(|e| self.error(e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.error(e))?;
        tmp.write_all(&json).map_err(|e| self.error(e))?;
        tmp.persist(&self.path).map_err(|e| self.error(e.error))?;
        debug!("Saved token to {}", self.path.display());
        Ok(())
    }

    fn error(&self, e: impl std::fmt::Display) -> Tt2CalError {
        Tt2CalError::TokenStore {
            path: self.path.clone(),
            detail: e.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Debug, Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, fallback_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(fallback_refresh),
            expires_at: Utc::now() + ChronoDuration::seconds(self.expires_in),
            scope: self.scope,
            token_type: self.token_type,
        }
    }
}

/// OAuth client credentials plus the token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_endpoint: String,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        token_endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, Tt2CalError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Tt2CalError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            token_endpoint: token_endpoint.into(),
            http,
        })
    }

    /// Read credentials from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`,
    /// falling back to an installed-app `credentials.json`.
    pub fn from_env_or_file(
        credentials_path: &Path,
        token_endpoint: &str,
        timeout_secs: u64,
    ) -> Result<Self, Tt2CalError> {
        let redirect_env = std::env::var("GOOGLE_REDIRECT_URI").ok();
        if let (Ok(id), Ok(secret)) = (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
        ) {
            let redirect = resolve_redirect(redirect_env);
            return Self::new(id, secret, redirect, token_endpoint, timeout_secs);
        }

        let raw = std::fs::read_to_string(credentials_path).map_err(|e| Tt2CalError::Auth {
            detail: format!(
                "no GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET and cannot read '{}': {e}",
                credentials_path.display()
            ),
        })?;
        let file: CredentialsFile = serde_json::from_str(&raw).map_err(|e| Tt2CalError::Auth {
            detail: format!("malformed '{}': {e}", credentials_path.display()),
        })?;
        let creds = file.installed.or(file.web).ok_or_else(|| Tt2CalError::Auth {
            detail: format!(
                "'{}' has neither an \"installed\" nor a \"web\" section",
                credentials_path.display()
            ),
        })?;
        let redirect = resolve_redirect(redirect_env.or_else(|| creds.redirect_uris.first().cloned()));
        Self::new(
            creds.client_id,
            creds.client_secret,
            redirect,
            token_endpoint,
            timeout_secs,
        )
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Port to listen on when the redirect points at this machine.
    pub fn loopback_port(&self) -> Option<u16> {
        let rest = self.redirect_uri.strip_prefix("http://")?;
        let authority = rest.split('/').next()?;
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (authority, 80),
        };
        matches!(host, "localhost" | "127.0.0.1" | "[::1]").then_some(port)
    }

    /// URL the user opens to grant calendar access.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            AUTH_ENDPOINT,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(CALENDAR_SCOPE)
        )
    }

    /// Trade an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken, Tt2CalError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code.trim()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let token = self.post_token(&form, "Code exchange").await?;
        if token.refresh_token.is_none() {
            return Err(Tt2CalError::Auth {
                detail: "no refresh token in response".into(),
            });
        }
        Ok(token.into_stored(None))
    }

    /// Use a refresh token to obtain a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, Tt2CalError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let token = self.post_token(&form, "Token refresh").await?;
        Ok(token.into_stored(Some(refresh_token.to_string())))
    }

    async fn post_token(
        &self,
        form: &[(&str, &str)],
        what: &str,
    ) -> Result<TokenResponse, Tt2CalError> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| Tt2CalError::Auth {
                detail: format!("{what} request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Tt2CalError::Auth {
                detail: format!("{what} failed ({status}): {error_text}"),
            });
        }

        response.json().await.map_err(|e| Tt2CalError::Auth {
            detail: format!("Failed to parse token response: {e}"),
        })
    }
}

/// Pick the redirect URI. Unset or out-of-band values become
/// [`LOOPBACK_REDIRECT_URI`]; a port-less loopback URI gets the default port.
fn resolve_redirect(configured: Option<String>) -> String {
    let Some(uri) = configured.map(|u| u.trim().trim_end_matches('/').to_string()) else {
        return LOOPBACK_REDIRECT_URI.to_string();
    };
    if uri.is_empty() || uri.starts_with("urn:ietf:wg:oauth:2.0:oob") {
        if !uri.is_empty() {
            warn!("Out-of-band OAuth redirect is no longer supported, using {LOOPBACK_REDIRECT_URI}");
        }
        return LOOPBACK_REDIRECT_URI.to_string();
    }
    match uri.as_str() {
        "http://localhost" | "http://127.0.0.1" => format!("{uri}:{LOOPBACK_DEFAULT_PORT}"),
        _ => uri,
    }
}

/// Pull the authorization code out of what the user pasted: either the
/// bare code or the whole redirect URL (`http://localhost:8085/?code=...`).
pub fn code_from_redirect(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match input.split_once('?') {
        Some((_, query)) => query_value(query, "code"),
        None if input.contains("://") || input.contains(char::is_whitespace) => None,
        None => Some(input.to_string()),
    }
}

fn query_value(query: &str, key: &str) -> Option<String> {
    query
        .split(['&', '#'])
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| urlencoding::decode(&v.replace('+', " ")).ok().map(|v| v.into_owned()))
        .filter(|v| !v.is_empty())
}

/// Wait for Google to redirect the browser to `listener` and return the
/// authorization code. Requests without a `code` or `error` parameter (a
/// favicon fetch, say) get a 404 and the wait continues.
pub async fn receive_code(listener: &TcpListener) -> Result<String, Tt2CalError> {
    loop {
        let (mut stream, peer) = listener.accept().await.map_err(|e| Tt2CalError::Auth {
            detail: format!("loopback listener failed: {e}"),
        })?;
        debug!("Redirect connection from {}", peer);

        let mut head = Vec::new();
        let mut buf = [0u8; 2048];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_REDIRECT_REQUEST {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        let head = String::from_utf8_lossy(&head);
        let target = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default();
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();

        let (status, body, outcome) = if let Some(code) = query_value(query, "code") {
            ("200 OK", "Authorization complete. You can close this tab.", Some(Ok(code)))
        } else if let Some(error) = query_value(query, "error") {
            let err = Tt2CalError::Auth {
                detail: format!("authorization was refused: {error}"),
            };
            ("200 OK", "Authorization was refused. You can close this tab.", Some(Err(err)))
        } else {
            ("404 Not Found", "Not found", None)
        };

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;

        if let Some(outcome) = outcome {
            return outcome;
        }
    }
}

/// Hands out valid access tokens backed by `token.json`.
pub struct TokenManager {
    client: OAuthClient,
    store: TokenStore,
    current: Mutex<Option<StoredToken>>,
}

impl TokenManager {
    pub fn new(client: OAuthClient, store: TokenStore) -> Self {
        Self {
            client,
            store,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> Result<String, Tt2CalError> {
        let mut current = self.current.lock().await;
        if current.is_none() {
            *current = self.store.load()?;
        }

        let token = current.take().ok_or_else(|| Tt2CalError::Auth {
            detail: format!("no saved token at '{}'", self.store.path().display()),
        })?;

        if !token.is_expired(Utc::now()) {
            let access = token.access_token.clone();
            *current = Some(token);
            return Ok(access);
        }

        let refresh = token.refresh_token.clone().ok_or_else(|| Tt2CalError::Auth {
            detail: "token expired and no refresh token is stored".into(),
        })?;
        info!("Access token expired, refreshing");
        let fresh = self.client.refresh(&refresh).await?;
        self.store.save(&fresh)?;
        let access = fresh.access_token.clone();
        *current = Some(fresh);
        Ok(access)
    }
}
