//! Push-style credentialing network.
//!
//! Providers, credentialing spans, payers and contracts as the network models
//! them. Field projections (`ProviderFields`, `SpanFields`) are what the push
//! reconciler compares to decide whether an update is a no-op.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Page, RemoteError};

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProvider {
    pub id: String,
    #[serde(default)]
    pub npi: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
}

impl NetworkProvider {
    /// Normalized projection of the mutable fields.
    pub fn fields(&self) -> ProviderFields {
        ProviderFields {
            npi: self.npi.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            organization_name: self.organization_name.clone(),
        }
        .normalized()
    }
}

/// Writable provider fields. Sent as the create/update body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFields {
    pub npi: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization_name: Option<String>,
}

impl ProviderFields {
    pub fn individual(npi: &str, first_name: Option<&str>, last_name: Option<&str>) -> Self {
        Self {
            npi: Some(npi.to_string()),
            first_name: first_name.map(str::to_string),
            last_name: last_name.map(str::to_string),
            organization_name: None,
        }
        .normalized()
    }

    pub fn organization(npi: &str, organization_name: &str) -> Self {
        Self {
            npi: Some(npi.to_string()),
            first_name: None,
            last_name: None,
            organization_name: Some(organization_name.to_string()),
        }
        .normalized()
    }

    /// Trim every field; blank becomes `None`.
    pub fn normalized(self) -> Self {
        Self {
            npi: norm(self.npi),
            first_name: norm(self.first_name),
            last_name: norm(self.last_name),
            organization_name: norm(self.organization_name),
        }
    }
}

fn norm(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Server-side filter for provider listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFilter {
    pub npi: Option<String>,
}

impl ProviderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_npi(npi: &str) -> Self {
        Self {
            npi: Some(npi.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Credentialing spans
// ---------------------------------------------------------------------------

/// "Rendering provider is credentialed with payer, via contracting provider,
/// in region, for this period."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialingSpan {
    pub id: String,
    pub rendering_provider_id: String,
    pub contracting_provider_id: String,
    pub payer_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub region: Option<String>,
}

impl CredentialingSpan {
    pub fn fields(&self) -> SpanFields {
        SpanFields {
            rendering_provider_id: self.rendering_provider_id.clone(),
            contracting_provider_id: self.contracting_provider_id.clone(),
            payer_id: self.payer_id.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            region: self.region.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanFields {
    pub rendering_provider_id: String,
    pub contracting_provider_id: String,
    pub payer_id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub region: Option<String>,
}

impl SpanFields {
    /// The part of a span the push pass owns: date range and region.
    /// Region comparison ignores case.
    pub fn same_coverage(&self, other: &SpanFields) -> bool {
        self.start_date == other.start_date
            && self.end_date == other.end_date
            && self.region.as_deref().map(str::to_ascii_uppercase)
                == other.region.as_deref().map(str::to_ascii_uppercase)
    }
}

// ---------------------------------------------------------------------------
// Payers and contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub contracting_provider_id: String,
    pub payer_id: String,
    #[serde(default)]
    pub rendering_provider_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractFields {
    pub contracting_provider_id: String,
    pub payer_id: String,
    pub rendering_provider_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Push-style network client.
///
/// Listing calls return a [`Page`]; the caller decides whether a partial page
/// is acceptable. Implementations must be `Send + Sync` so a pass can hold an
/// `Arc<dyn NetworkClient>`.
#[async_trait::async_trait]
pub trait NetworkClient: Send + Sync {
    async fn list_providers(
        &self,
        filter: &ProviderFilter,
    ) -> Result<Page<NetworkProvider>, RemoteError>;

    async fn create_provider(&self, fields: &ProviderFields)
        -> Result<NetworkProvider, RemoteError>;

    async fn update_provider(
        &self,
        provider_id: &str,
        fields: &ProviderFields,
    ) -> Result<NetworkProvider, RemoteError>;

    /// All spans where `provider_id` is the rendering provider.
    async fn list_credentialing_spans(
        &self,
        provider_id: &str,
    ) -> Result<Vec<CredentialingSpan>, RemoteError>;

    async fn create_credentialing_span(
        &self,
        fields: &SpanFields,
    ) -> Result<CredentialingSpan, RemoteError>;

    async fn update_credentialing_span(
        &self,
        span_id: &str,
        fields: &SpanFields,
    ) -> Result<CredentialingSpan, RemoteError>;

    async fn delete_credentialing_span(&self, span_id: &str) -> Result<(), RemoteError>;

    async fn search_payers(&self, term: &str) -> Result<Page<Payer>, RemoteError>;

    async fn list_contracts(&self) -> Result<Vec<Contract>, RemoteError>;

    async fn create_contract(&self, fields: &ContractFields) -> Result<Contract, RemoteError>;

    async fn update_contract(
        &self,
        contract_id: &str,
        rendering_provider_ids: &[String],
    ) -> Result<Contract, RemoteError>;
}
