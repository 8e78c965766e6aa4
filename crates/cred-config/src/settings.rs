//! Typed view of the `/sync` config section.
//!
//! Every magnitude ceiling is a named field with a default so deployments can
//! override it per environment layer.

use anyhow::{bail, Context, Result};
use cred_reconcile::GuardrailLimits;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    #[serde(default)]
    pub push: Option<PushSettings>,
    #[serde(default)]
    pub pull: Option<PullSettings>,
    #[serde(default)]
    pub lease: LeaseSettings,
}

impl SyncSettings {
    /// Read `/sync` from a merged config document. A missing section yields
    /// defaults with neither pass configured.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        match config_json.pointer("/sync") {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => {
                let s: SyncSettings =
                    serde_json::from_value(v.clone()).context("invalid /sync config section")?;
                s.validate()?;
                Ok(s)
            }
        }
    }

    pub fn push(&self) -> Result<&PushSettings> {
        self.push
            .as_ref()
            .context("CONFIG_MISSING: /sync/push is required for a push pass")
    }

    pub fn pull(&self) -> Result<&PullSettings> {
        self.pull
            .as_ref()
            .context("CONFIG_MISSING: /sync/pull is required for a pull pass")
    }

    fn validate(&self) -> Result<()> {
        if let Some(p) = &self.push {
            if p.max_provider_operations == 0 || p.max_span_operations_per_provider == 0 {
                bail!("CONFIG_INVALID: push operation ceilings must be > 0");
            }
            if p.contracting_provider.npi.trim().is_empty() {
                bail!("CONFIG_INVALID: /sync/push/contracting_provider/npi is empty");
            }
        }
        if let Some(p) = &self.pull {
            if p.upsert_chunk_size == 0 {
                bail!("CONFIG_INVALID: /sync/pull/upsert_chunk_size must be > 0");
            }
            if p.max_pages == 0 || p.max_operations == 0 {
                bail!("CONFIG_INVALID: pull page/operation ceilings must be > 0");
            }
        }
        if self.lease.ttl_seconds <= 0 {
            bail!("CONFIG_INVALID: /sync/lease/ttl_seconds must be > 0");
        }
        Ok(())
    }
}

/// Push system: this engine is the writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushSettings {
    pub base_url: String,
    #[serde(default)]
    pub keys_env: PushKeysEnv,
    pub contracting_provider: ContractingProviderSettings,
    /// Search term that must resolve to exactly one payer.
    pub payer_search: String,
    /// Ceiling on the provider plan. Every matched provider counts as an
    /// update, including ones already in sync, so this must exceed the
    /// roster size plus expected creates.
    #[serde(default = "default_max_provider_operations")]
    pub max_provider_operations: usize,
    #[serde(default = "default_max_span_operations")]
    pub max_span_operations_per_provider: usize,
}

impl PushSettings {
    pub fn provider_limits(&self) -> GuardrailLimits {
        GuardrailLimits::new(self.max_provider_operations)
    }

    pub fn span_limits(&self) -> GuardrailLimits {
        GuardrailLimits::new(self.max_span_operations_per_provider)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushKeysEnv {
    /// Env var NAME holding the push-system API key.
    pub api_key: String,
}

impl Default for PushKeysEnv {
    fn default() -> Self {
        Self {
            api_key: "CRED_PUSH_API_KEY".to_string(),
        }
    }
}

/// The organization-level record that contracts on behalf of every rendering
/// provider in the push system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractingProviderSettings {
    pub npi: String,
    pub organization_name: String,
}

/// Pull system: the remote side is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullSettings {
    pub base_url: String,
    pub token_url: String,
    #[serde(default)]
    pub keys_env: PullKeysEnv,
    /// Allowed |reported count - accumulated count| after paging.
    #[serde(default = "default_page_count_tolerance")]
    pub page_count_tolerance: u64,
    #[serde(default = "default_upsert_chunk_size")]
    pub upsert_chunk_size: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_pull_max_operations")]
    pub max_operations: usize,
}

impl PullSettings {
    pub fn limits(&self) -> GuardrailLimits {
        GuardrailLimits::new(self.max_operations)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullKeysEnv {
    pub client_id: String,
    pub client_secret: String,
}

impl Default for PullKeysEnv {
    fn default() -> Self {
        Self {
            client_id: "CRED_PULL_CLIENT_ID".to_string(),
            client_secret: "CRED_PULL_CLIENT_SECRET".to_string(),
        }
    }
}

/// At-most-one-in-flight lease per sync system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseSettings {
    /// RUNNING rows older than this are considered abandoned.
    #[serde(default = "default_lease_ttl_seconds")]
    pub ttl_seconds: i64,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_lease_ttl_seconds(),
        }
    }
}

// Sized for rosters of up to 250 providers; larger rosters must raise it.
fn default_max_provider_operations() -> usize {
    250
}

fn default_max_span_operations() -> usize {
    50
}

fn default_page_count_tolerance() -> u64 {
    2
}

fn default_upsert_chunk_size() -> usize {
    500
}

fn default_max_pages() -> usize {
    10_000
}

fn default_pull_max_operations() -> usize {
    50_000
}

fn default_lease_ttl_seconds() -> i64 {
    3600
}
