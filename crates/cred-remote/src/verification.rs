//! Pull-style primary-source verification system.
//!
//! Enum-like fields (`state`, `status`) stay raw strings here; mapping to
//! local variants happens in the pull reconciler.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Page, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedProvider {
    pub id: String,
    #[serde(default)]
    pub npi: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedLicense {
    pub id: String,
    /// Verification-system provider id (not a local key).
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedBoardCertificate {
    pub id: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub board_name: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Verification-system client.
///
/// `cursor` is `None` for the first page, otherwise the previous page's
/// `next`. Callers follow `next` until it is `None`.
#[async_trait::async_trait]
pub trait VerificationClient: Send + Sync {
    async fn providers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedProvider>, RemoteError>;

    async fn licenses_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedLicense>, RemoteError>;

    async fn board_certificates_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<VerifiedBoardCertificate>, RemoteError>;
}
