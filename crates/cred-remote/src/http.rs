//! reqwest-backed clients for both remote systems.
//!
//! Shared request path: fetch a bearer token from the injected
//! [`CredentialProvider`], send, and on failure
//!
//! - 401: invalidate the cached token and retry once;
//! - 429 / 5xx / transport error: retry with exponential backoff up to
//!   [`RetryPolicy::max_attempts`];
//! - anything else non-2xx: [`RemoteError::Api`].
//!
//! Listing endpoints that the push pass needs complete are requested with a
//! large `page_size`; a partial answer is [`RemoteError::PaginationUnsupported`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::auth::CredentialProvider;
use crate::network::{
    Contract, ContractFields, CredentialingSpan, NetworkClient, NetworkProvider, Payer,
    ProviderFields, ProviderFilter, SpanFields,
};
use crate::verification::{
    VerificationClient, VerifiedBoardCertificate, VerifiedLicense, VerifiedProvider,
};
use crate::{Page, RemoteError};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

// ---------------------------------------------------------------------------
// Shared transport
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Transport {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryPolicy,
}

impl Transport {
    fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            retry: RetryPolicy::default(),
        }
    }

    async fn execute<F>(&self, build: F) -> Result<Response, RemoteError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let mut attempt: u32 = 0;
        let mut reauthenticated = false;

        loop {
            attempt += 1;
            let token = self.credentials.bearer_token().await?;
            let sent = build(&self.http).bearer_auth(token).send().await;

            let resp = match sent {
                Ok(r) => r,
                Err(e) => {
                    if attempt < self.retry.max_attempts {
                        tracing::warn!(attempt, error = %e, "remote transport error; retrying");
                        tokio::time::sleep(self.retry.delay(attempt)).await;
                        continue;
                    }
                    return Err(RemoteError::Transport(e.to_string()));
                }
            };

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                reauthenticated = true;
                attempt -= 1;
                tracing::info!("remote answered 401; refreshing credentials");
                self.credentials.invalidate().await;
                continue;
            }

            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.retry.max_attempts {
                tracing::warn!(attempt, status = status.as_u16(), "remote busy; retrying");
                tokio::time::sleep(self.retry.delay(attempt)).await;
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RemoteError::Auth(format!(
                    "status={} {}",
                    status.as_u16(),
                    message
                )));
            }
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message,
            });
        }
    }

    async fn json<T, F>(&self, build: F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let resp = self.execute(build).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(format!("reading body: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ---------------------------------------------------------------------------
// Push network
// ---------------------------------------------------------------------------

/// Push network over HTTP.
///
/// API key is resolved by the caller (CLI) and passed in as a credential
/// provider; do not log it.
#[derive(Clone)]
pub struct HttpNetworkClient {
    base_url: String,
    transport: Transport,
    page_size: u32,
}

impl HttpNetworkClient {
    pub const DEFAULT_PAGE_SIZE: u32 = 1000;

    pub fn new(base_url: String, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            base_url,
            transport: Transport::new(credentials),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.transport.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn url(&self, path: &str) -> String {
        join(&self.base_url, path)
    }

    async fn complete_listing<T: DeserializeOwned>(
        &self,
        resource: &str,
        path: &str,
    ) -> Result<Vec<T>, RemoteError> {
        let url = self.url(path);
        let page_size = self.page_size.to_string();
        let page: Page<T> = self
            .transport
            .json(|c| {
                c.get(&url)
                    .query(&[("page_size", page_size.as_str())])
            })
            .await?;
        if page.is_partial() {
            return Err(RemoteError::PaginationUnsupported {
                resource: resource.to_string(),
            });
        }
        Ok(page.results)
    }
}

#[async_trait::async_trait]
impl NetworkClient for HttpNetworkClient {
    async fn list_providers(
        &self,
        filter: &ProviderFilter,
    ) -> Result<Page<NetworkProvider>, RemoteError> {
        let url = self.url("providers/");
        let page_size = self.page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![("page_size", page_size.as_str())];
        if let Some(npi) = filter.npi.as_deref() {
            query.push(("npi", npi));
        }
        self.transport.json(|c| c.get(&url).query(&query)).await
    }

    async fn create_provider(
        &self,
        fields: &ProviderFields,
    ) -> Result<NetworkProvider, RemoteError> {
        let url = self.url("providers/");
        self.transport.json(|c| c.post(&url).json(fields)).await
    }

    async fn update_provider(
        &self,
        provider_id: &str,
        fields: &ProviderFields,
    ) -> Result<NetworkProvider, RemoteError> {
        let url = self.url(&format!("providers/{provider_id}/"));
        self.transport.json(|c| c.patch(&url).json(fields)).await
    }

    async fn list_credentialing_spans(
        &self,
        provider_id: &str,
    ) -> Result<Vec<CredentialingSpan>, RemoteError> {
        self.complete_listing(
            "credentialing_spans",
            &format!("providers/{provider_id}/credentialing-spans/"),
        )
        .await
    }

    async fn create_credentialing_span(
        &self,
        fields: &SpanFields,
    ) -> Result<CredentialingSpan, RemoteError> {
        let url = self.url("credentialing-spans/");
        self.transport.json(|c| c.post(&url).json(fields)).await
    }

    async fn update_credentialing_span(
        &self,
        span_id: &str,
        fields: &SpanFields,
    ) -> Result<CredentialingSpan, RemoteError> {
        let url = self.url(&format!("credentialing-spans/{span_id}/"));
        self.transport.json(|c| c.patch(&url).json(fields)).await
    }

    async fn delete_credentialing_span(&self, span_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("credentialing-spans/{span_id}/"));
        self.transport
            .execute(|c| c.request(Method::DELETE, &url))
            .await?;
        Ok(())
    }

    async fn search_payers(&self, term: &str) -> Result<Page<Payer>, RemoteError> {
        let url = self.url("payers/");
        self.transport
            .json(|c| c.get(&url).query(&[("search", term)]))
            .await
    }

    async fn list_contracts(&self) -> Result<Vec<Contract>, RemoteError> {
        self.complete_listing("contracts", "contracts/").await
    }

    async fn create_contract(&self, fields: &ContractFields) -> Result<Contract, RemoteError> {
        let url = self.url("contracts/");
        self.transport.json(|c| c.post(&url).json(fields)).await
    }

    async fn update_contract(
        &self,
        contract_id: &str,
        rendering_provider_ids: &[String],
    ) -> Result<Contract, RemoteError> {
        let url = self.url(&format!("contracts/{contract_id}/"));
        let body = serde_json::json!({ "rendering_provider_ids": rendering_provider_ids });
        self.transport.json(|c| c.patch(&url).json(&body)).await
    }
}

// ---------------------------------------------------------------------------
// Pull verification system
// ---------------------------------------------------------------------------

/// Verification system over HTTP.
///
/// `next` links are followed verbatim but only when they point at the same
/// origin as `base_url`; a token is never sent to another host.
#[derive(Clone)]
pub struct HttpVerificationClient {
    base_url: String,
    base: Url,
    transport: Transport,
    page_size: u32,
}

impl HttpVerificationClient {
    pub const DEFAULT_PAGE_SIZE: u32 = 500;

    pub fn new(
        base_url: String,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, RemoteError> {
        let base = Url::parse(&base_url)
            .map_err(|e| RemoteError::Config(format!("invalid base_url '{base_url}': {e}")))?;
        Ok(Self {
            base_url,
            base,
            transport: Transport::new(credentials),
            page_size: Self::DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.transport.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn page_url(&self, path: &str, cursor: Option<String>) -> Result<String, RemoteError> {
        match cursor {
            None => Ok(format!(
                "{}?page_size={}",
                join(&self.base_url, path),
                self.page_size
            )),
            Some(next) => {
                let url = Url::parse(&next)
                    .map_err(|e| RemoteError::Decode(format!("invalid next link: {e}")))?;
                if url.origin() != self.base.origin() {
                    return Err(RemoteError::Decode(format!(
                        "refusing cross-origin next link to {}",
                        url.origin().ascii_serialization()
                    )));
                }
                Ok(next)
            }
        }
    }

    async fn page<T: DeserializeOwned>(
        &self,
        path: &str,
        cursor: Option<String>,
    ) -> Result<Page<T>, RemoteError> {
        let url = self.page_url(path, cursor)?;
        self.transport.json(|c| c.get(&url)).await
    }
}

#[async_trait::async_trait]
impl VerificationClient for HttpVerificationClient {
    async fn providers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedProvider>, RemoteError> {
        self.page("providers/", cursor).await
    }

    async fn licenses_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedLicense>, RemoteError> {
        self.page("licenses/", cursor).await
    }

    async fn board_certificates_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedBoardCertificate>, RemoteError> {
        self.page("board-certificates/", cursor).await
    }
}
