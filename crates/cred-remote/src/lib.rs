//! cred-remote
//!
//! Boundary to the two third-party credentialing systems.
//!
//! - [`network::NetworkClient`]: push-style network. This engine is the writer
//!   for providers, credentialing spans and contracts.
//! - [`verification::VerificationClient`]: pull-style primary-source
//!   verification. The remote side is authoritative.
//!
//! Auth tokens, retry/backoff and page-link validation live beneath these
//! traits (see [`auth`] and [`http`]). Reconcilers only ever see typed pages
//! and [`RemoteError`].
//!
//! This crate does **not** touch the database.

pub mod auth;
pub mod http;
pub mod network;
pub mod verification;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use auth::{
    CachedCredential, CredentialProvider, IssuedToken, OAuthClientCredentials, StaticCredential,
    TokenSource,
};
pub use http::{HttpNetworkClient, HttpVerificationClient, RetryPolicy};
pub use network::{
    Contract, ContractFields, CredentialingSpan, NetworkClient, NetworkProvider, Payer,
    ProviderFields, ProviderFilter, SpanFields,
};
pub use verification::{
    VerificationClient, VerifiedBoardCertificate, VerifiedLicense, VerifiedProvider,
};

// ---------------------------------------------------------------------------
// Paging envelope
// ---------------------------------------------------------------------------

/// One page of a remote collection.
///
/// `count` is the remote-reported total across all pages; `next` is an
/// opaque cursor (a URL for the HTTP clients) or `None` on the last page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// A complete single page (no `next`, `count == results.len()`).
    pub fn single(results: Vec<T>) -> Self {
        Self {
            count: results.len() as u64,
            next: None,
            results,
        }
    }

    /// True when the page claims more rows exist than it carries.
    pub fn is_partial(&self) -> bool {
        self.next.is_some() || self.count > self.results.len() as u64
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a remote client may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or transport failure.
    Transport(String),
    /// The remote API answered with a non-success status.
    Api { status: u16, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// A client was constructed with an invalid base URL or similar.
    Config(String),
    /// Token acquisition failed or the remote rejected our credentials.
    Auth(String),
    /// The endpoint returned more than one page where the caller requires a
    /// complete listing.
    PaginationUnsupported { resource: String },
}

impl RemoteError {
    /// HTTP status for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transport(msg) => write!(f, "transport error: {msg}"),
            RemoteError::Api { status, message } => {
                write!(f, "remote api error status={status}: {message}")
            }
            RemoteError::Decode(msg) => write!(f, "decode error: {msg}"),
            RemoteError::Config(msg) => write!(f, "config error: {msg}"),
            RemoteError::Auth(msg) => write!(f, "auth error: {msg}"),
            RemoteError::PaginationUnsupported { resource } => {
                write!(f, "pagination required but unsupported for {resource}")
            }
        }
    }
}

impl std::error::Error for RemoteError {}
