//! Row types shared by every `Store` implementation.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRow {
    pub id: Uuid,
    pub npi: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub network_provider_id: Option<String>,
    pub verification_provider_id: Option<String>,
    pub verification_status: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseSource {
    Manual,
    Verification,
}

impl LicenseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseSource::Manual => "manual",
            LicenseSource::Verification => "verification",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(LicenseSource::Manual),
            "verification" => Ok(LicenseSource::Verification),
            other => Err(anyhow!("invalid license source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRow {
    pub id: Uuid,
    pub provider_id: Option<Uuid>,
    /// Two-letter region code.
    pub state: Option<String>,
    pub license_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub source: LicenseSource,
    pub verification_license_id: Option<String>,
    /// Push-network credentialing span mirroring this license.
    pub network_span_id: Option<String>,
}

/// A provider with its licenses eagerly loaded (push pass input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderWithLicenses {
    pub provider: ProviderRow,
    pub licenses: Vec<LicenseRow>,
}

/// Last-known verification state written onto a local provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderVerification {
    pub provider_id: Uuid,
    pub verification_provider_id: String,
    pub status: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Sync runs (lease + audit row)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRunStatus {
    Running,
    Succeeded,
    Failed,
    Abandoned,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Running => "RUNNING",
            SyncRunStatus::Succeeded => "SUCCEEDED",
            SyncRunStatus::Failed => "FAILED",
            SyncRunStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(SyncRunStatus::Running),
            "SUCCEEDED" => Ok(SyncRunStatus::Succeeded),
            "FAILED" => Ok(SyncRunStatus::Failed),
            "ABANDONED" => Ok(SyncRunStatus::Abandoned),
            other => Err(anyhow!("invalid sync run status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunRow {
    pub run_id: Uuid,
    pub system: String,
    pub status: SyncRunStatus,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: Option<DateTime<Utc>>,
    pub report: Option<Value>,
    pub error: Option<String>,
}

/// Result of trying to take the per-system lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginRun {
    Started(Uuid),
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunFinish {
    pub status: SyncRunStatus,
    pub report: Option<Value>,
    pub error: Option<String>,
}

impl RunFinish {
    pub fn succeeded(report: Value) -> Self {
        Self {
            status: SyncRunStatus::Succeeded,
            report: Some(report),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SyncRunStatus::Failed,
            report: None,
            error: Some(error.into()),
        }
    }
}
