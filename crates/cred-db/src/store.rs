//! Store boundary consumed by the reconcilers.
//!
//! Every method is a single statement (or a short fixed sequence) against the
//! local database. No transaction ever spans a remote call: reconcilers write
//! immediately after each remote acknowledgement instead.

use anyhow::Result;
use uuid::Uuid;

use crate::model::{
    BeginRun, ProviderRow, ProviderVerification, ProviderWithLicenses, RunFinish, SyncRunRow,
};
use crate::upsert::{UpsertOutcome, UpsertRow, UpsertSpec};

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // --- push pass ---------------------------------------------------------

    /// Providers with a non-blank NPI, each with all of its licenses. A blank
    /// NPI cannot key a remote provider and is treated as absent.
    async fn load_providers_with_licenses(&self) -> Result<Vec<ProviderWithLicenses>>;

    async fn set_network_provider_id(
        &self,
        provider_id: Uuid,
        network_provider_id: &str,
    ) -> Result<()>;

    /// `None` clears the correlation (span deleted remotely).
    async fn set_license_span_id(&self, license_id: Uuid, span_id: Option<&str>) -> Result<()>;

    // --- pull pass ---------------------------------------------------------

    async fn load_providers(&self) -> Result<Vec<ProviderRow>>;

    /// Conflict-key values currently stored for `spec` (scoped by its source tag).
    async fn pulled_remote_ids(&self, spec: &UpsertSpec) -> Result<Vec<String>>;

    /// Upsert one chunk. Returns one outcome per input row.
    async fn upsert_rows(&self, spec: &UpsertSpec, rows: &[UpsertRow])
        -> Result<Vec<UpsertOutcome>>;

    /// Delete rows of `spec` (scoped by its source tag) whose id is not in
    /// `keep_ids`. Returns the number deleted.
    async fn delete_stale(&self, spec: &UpsertSpec, keep_ids: &[Uuid]) -> Result<u64>;

    async fn refresh_provider_verification(&self, updates: &[ProviderVerification])
        -> Result<u64>;

    /// Null the last-known verification fields on every provider not in `keep`.
    async fn clear_provider_verification_except(&self, keep: &[Uuid]) -> Result<u64>;

    // --- lease -------------------------------------------------------------

    /// Mark RUNNING rows older than `ttl_seconds` ABANDONED, then try to
    /// insert a RUNNING row for `system`.
    async fn begin_sync_run(&self, system: &str, ttl_seconds: i64) -> Result<BeginRun>;

    async fn finish_sync_run(&self, run_id: Uuid, finish: &RunFinish) -> Result<()>;

    async fn latest_sync_run(&self, system: &str) -> Result<Option<SyncRunRow>>;
}
