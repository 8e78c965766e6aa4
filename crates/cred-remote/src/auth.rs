//! Credential providers.
//!
//! Clients never hold a bare token. They ask an injected
//! [`CredentialProvider`] for one per request:
//!
//! - [`StaticCredential`]: fixed API key (push network).
//! - [`CachedCredential`]: wraps a [`TokenSource`] and refreshes on demand
//!   once the monotonic expiry (minus `skew`) has passed. Concurrent callers
//!   serialize on one `tokio::sync::Mutex`, so at most one refresh is in flight.
//! - [`OAuthClientCredentials`]: reqwest-backed `client_credentials` grant.
//!
//! Token values are never logged and are redacted in `Debug`.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::RemoteError;

#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A bearer token valid for at least the next request.
    async fn bearer_token(&self) -> Result<String, RemoteError>;

    /// Drop any cached token. Called after the remote answers 401.
    async fn invalidate(&self) {}
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredential")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredential {
    async fn bearer_token(&self) -> Result<String, RemoteError> {
        Ok(self.token.clone())
    }
}

// ---------------------------------------------------------------------------
// Cached (refresh on demand)
// ---------------------------------------------------------------------------

/// A freshly issued token and its lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Duration,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"<REDACTED>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<IssuedToken, RemoteError>;
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct CachedCredential<S> {
    source: S,
    skew: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> CachedCredential<S> {
    pub const DEFAULT_SKEW: Duration = Duration::from_secs(30);

    pub fn new(source: S) -> Self {
        Self::with_skew(source, Self::DEFAULT_SKEW)
    }

    pub fn with_skew(source: S, skew: Duration) -> Self {
        Self {
            source,
            skew,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl<S: TokenSource> CredentialProvider for CachedCredential<S> {
    async fn bearer_token(&self) -> Result<String, RemoteError> {
        let mut guard = self.cached.lock().await;
        let now = Instant::now();
        if let Some(tok) = guard.as_ref() {
            if now + self.skew < tok.expires_at {
                return Ok(tok.value.clone());
            }
        }

        let issued = self.source.fetch_token().await?;
        tracing::debug!(
            expires_in_secs = issued.expires_in.as_secs(),
            "refreshed bearer token"
        );
        let value = issued.access_token.clone();
        *guard = Some(CachedToken {
            value: issued.access_token,
            expires_at: now + issued.expires_in,
        });
        Ok(value)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

// ---------------------------------------------------------------------------
// OAuth client-credentials grant
// ---------------------------------------------------------------------------

/// Client id and secret are resolved by the caller (CLI) and passed in; do
/// not log them.
#[derive(Clone)]
pub struct OAuthClientCredentials {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthClientCredentials {
    pub fn new(token_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url,
            client_id,
            client_secret,
        }
    }
}

impl fmt::Debug for OAuthClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &"<REDACTED>")
            .field("client_secret", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

#[async_trait::async_trait]
impl TokenSource for OAuthClientCredentials {
    async fn fetch_token(&self) -> Result<IssuedToken, RemoteError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RemoteError::Transport(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Auth(format!(
                "token endpoint returned status={}",
                status.as_u16()
            )));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("token response: {e}")))?;
        if body.access_token.trim().is_empty() {
            return Err(RemoteError::Auth("token endpoint returned empty token".into()));
        }

        Ok(IssuedToken {
            access_token: body.access_token,
            expires_in: Duration::from_secs(body.expires_in),
        })
    }
}
