//! Pull reconciler: verification-system collections mirrored locally.
//!
//! One pass handles one [`Collection`]:
//! 1. Collect every page (aborts before any write on inconsistency).
//! 2. Correlate to local providers; uncorrelated rows keep a null FK.
//! 3. Map enum-like fields; unmapped values become NULL and are counted.
//! 4. Plan against the stored remote ids and run the guardrail.
//! 5. Upsert in chunks (first failure aborts), then delete rows of this
//!    source that were not written.
//! 6. Providers only: refresh last-known verification state on correlated
//!    local providers and clear it everywhere else.

use std::collections::HashMap;

use cred_config::PullSettings;
use cred_db::upsert::{BOARD_CERTIFICATES, LICENSES, VERIFIED_PROVIDERS};
use cred_db::{
    ColumnValue, ProviderRow, ProviderVerification, Store, UpsertOutcome, UpsertRow, UpsertSpec,
};
use cred_reconcile::{check_plan, diff_by_key, OpOutcome, ReportAggregator, SyncReport};
use cred_remote::{
    VerificationClient, VerifiedBoardCertificate, VerifiedLicense, VerifiedProvider,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::mapping::{map_certificate_status, map_license_status, map_region, Mapped};
use crate::paginate::{collect_pages, PageLimits};

const SECTION_PROVIDER_VERIFICATION: &str = "provider_verification";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Providers,
    Licenses,
    BoardCertificates,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Providers,
        Collection::Licenses,
        Collection::BoardCertificates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Providers => "providers",
            Collection::Licenses => "licenses",
            Collection::BoardCertificates => "board_certificates",
        }
    }

    /// Lease / audit system name.
    pub fn system(&self) -> &'static str {
        match self {
            Collection::Providers => "pull-providers",
            Collection::Licenses => "pull-licenses",
            Collection::BoardCertificates => "pull-board-certificates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "providers" => Some(Collection::Providers),
            "licenses" => Some(Collection::Licenses),
            "board-certificates" | "board_certificates" => Some(Collection::BoardCertificates),
            _ => None,
        }
    }

    fn spec(&self) -> &'static UpsertSpec {
        match self {
            Collection::Providers => &VERIFIED_PROVIDERS,
            Collection::Licenses => &LICENSES,
            Collection::BoardCertificates => &BOARD_CERTIFICATES,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct PullReconciler<'a> {
    client: &'a dyn VerificationClient,
    store: &'a dyn Store,
    settings: &'a PullSettings,
}

impl<'a> PullReconciler<'a> {
    pub fn new(
        client: &'a dyn VerificationClient,
        store: &'a dyn Store,
        settings: &'a PullSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub async fn run(&self, collection: Collection) -> Result<SyncReport, SyncError> {
        let mut report = ReportAggregator::new(collection.system());
        let limits = PageLimits::new(self.settings.page_count_tolerance, self.settings.max_pages);
        let name = collection.as_str();

        match collection {
            Collection::Providers => {
                let remote =
                    collect_pages(name, &limits, |c| self.client.providers_page(c)).await?;
                self.pull_providers(remote, &mut report).await?;
            }
            Collection::Licenses => {
                let remote = collect_pages(name, &limits, |c| self.client.licenses_page(c)).await?;
                let rows = self.license_rows(&remote, &mut report).await?;
                self.apply(collection, rows, &mut report).await?;
            }
            Collection::BoardCertificates => {
                let remote =
                    collect_pages(name, &limits, |c| self.client.board_certificates_page(c))
                        .await?;
                let rows = self.certificate_rows(&remote, &mut report).await?;
                self.apply(collection, rows, &mut report).await?;
            }
        }

        let report = report.finish();
        info!(
            collection = name,
            created = report.totals.created,
            updated = report.totals.updated,
            deleted = report.totals.deleted,
            coerced = report.coerced_values,
            "pull pass finished"
        );
        Ok(report)
    }

    async fn pull_providers(
        &self,
        remote: Vec<VerifiedProvider>,
        report: &mut ReportAggregator,
    ) -> Result<(), SyncError> {
        let locals = self.store.load_providers().await?;
        let by_npi: HashMap<String, &ProviderRow> = locals
            .iter()
            .filter_map(|p| {
                let npi = p.npi.as_deref()?.trim();
                (!npi.is_empty()).then(|| (npi.to_string(), p))
            })
            .collect();

        let mut rows = Vec::with_capacity(remote.len());
        let mut verifications = Vec::new();
        let mut uncorrelated = 0usize;
        for r in &remote {
            let local = r
                .npi
                .as_deref()
                .map(str::trim)
                .and_then(|npi| by_npi.get(npi));
            let provider_id = local.map(|p| p.id);
            match provider_id {
                Some(id) => verifications.push(ProviderVerification {
                    provider_id: id,
                    verification_provider_id: r.id.clone(),
                    status: r.status.clone(),
                    verified_at: r.verified_at,
                }),
                None => uncorrelated += 1,
            }
            rows.push(UpsertRow {
                key: r.id.clone(),
                values: vec![
                    ColumnValue::Uuid(provider_id),
                    ColumnValue::Text(r.npi.clone()),
                    ColumnValue::Text(r.first_name.clone()),
                    ColumnValue::Text(r.last_name.clone()),
                    ColumnValue::Text(r.status.clone()),
                    ColumnValue::Timestamp(r.verified_at),
                ],
            });
        }
        if uncorrelated > 0 {
            debug!(uncorrelated, "verified providers with no local npi match");
        }

        self.apply(Collection::Providers, rows, report).await?;

        let refreshed = self
            .store
            .refresh_provider_verification(&verifications)
            .await?;
        let keep: Vec<Uuid> = verifications.iter().map(|v| v.provider_id).collect();
        let cleared = self.store.clear_provider_verification_except(&keep).await?;
        if cleared > 0 {
            info!(cleared, "cleared stale verification state on local providers");
        }
        report.record_n(SECTION_PROVIDER_VERIFICATION, OpOutcome::Updated, refreshed);
        report.record_n(SECTION_PROVIDER_VERIFICATION, OpOutcome::Deleted, cleared);
        Ok(())
    }

    /// verification provider id -> local provider id
    async fn provider_index(&self) -> Result<HashMap<String, Uuid>, SyncError> {
        let locals = self.store.load_providers().await?;
        Ok(locals
            .into_iter()
            .filter_map(|p| Some((p.verification_provider_id?, p.id)))
            .collect())
    }

    async fn license_rows(
        &self,
        remote: &[VerifiedLicense],
        report: &mut ReportAggregator,
    ) -> Result<Vec<UpsertRow>, SyncError> {
        let index = self.provider_index().await?;
        let mut coerced = 0u64;

        let rows = remote
            .iter()
            .map(|r| {
                let provider_id = r.provider_id.as_deref().and_then(|id| index.get(id)).copied();
                let state = coerce(map_region(r.state.as_deref()), "state", &r.id, &mut coerced);
                let status = coerce(
                    map_license_status(r.status.as_deref()),
                    "status",
                    &r.id,
                    &mut coerced,
                );
                UpsertRow {
                    key: r.id.clone(),
                    values: vec![
                        ColumnValue::Uuid(provider_id),
                        ColumnValue::Text(state.map(str::to_string)),
                        ColumnValue::Text(r.license_number.clone()),
                        ColumnValue::Date(r.issue_date),
                        ColumnValue::Date(r.expiration_date),
                        ColumnValue::Text(status.map(|s| s.as_str().to_string())),
                    ],
                }
            })
            .collect();

        report.note_coerced(coerced);
        Ok(rows)
    }

    async fn certificate_rows(
        &self,
        remote: &[VerifiedBoardCertificate],
        report: &mut ReportAggregator,
    ) -> Result<Vec<UpsertRow>, SyncError> {
        let index = self.provider_index().await?;
        let mut coerced = 0u64;

        let rows = remote
            .iter()
            .map(|r| {
                let provider_id = r.provider_id.as_deref().and_then(|id| index.get(id)).copied();
                let status = coerce(
                    map_certificate_status(r.status.as_deref()),
                    "status",
                    &r.id,
                    &mut coerced,
                );
                UpsertRow {
                    key: r.id.clone(),
                    values: vec![
                        ColumnValue::Uuid(provider_id),
                        ColumnValue::Text(r.board_name.clone()),
                        ColumnValue::Text(r.specialty.clone()),
                        ColumnValue::Date(r.issue_date),
                        ColumnValue::Date(r.expiration_date),
                        ColumnValue::Text(status.map(|s| s.as_str().to_string())),
                    ],
                }
            })
            .collect();

        report.note_coerced(coerced);
        Ok(rows)
    }

    /// Plan, guardrail, chunked upsert, stale delete.
    async fn apply(
        &self,
        collection: Collection,
        rows: Vec<UpsertRow>,
        report: &mut ReportAggregator,
    ) -> Result<Vec<UpsertOutcome>, SyncError> {
        let spec = collection.spec();
        let section = collection.as_str();

        let stored = self.store.pulled_remote_ids(spec).await?;
        let plan = diff_by_key(
            rows.iter(),
            stored.iter(),
            |r: &&UpsertRow| r.key.clone(),
            |k: &&String| (*k).clone(),
        )?;
        let summary = check_plan(&plan, &self.settings.limits()).map_err(|v| {
            warn!(collection = section, violation = %v, "pull plan rejected; nothing written");
            v
        })?;
        info!(
            collection = section,
            creates = summary.creates,
            updates = summary.updates,
            deletes = summary.deletes,
            "pull plan accepted"
        );

        let chunk_size = self.settings.upsert_chunk_size.max(1);
        let mut written: Vec<UpsertOutcome> = Vec::with_capacity(rows.len());
        for (i, chunk) in rows.chunks(chunk_size).enumerate() {
            let out = self.store.upsert_rows(spec, chunk).await.map_err(|e| {
                error!(collection = section, chunk = i, error = %e, "upsert chunk failed; aborting pull");
                SyncError::Store(e.context(format!("upsert {section} chunk {i}")))
            })?;
            written.extend(out);
        }

        for o in &written {
            let outcome = if o.inserted {
                OpOutcome::Created
            } else {
                OpOutcome::Updated
            };
            report.record(section, outcome);
        }

        let keep: Vec<Uuid> = written.iter().map(|o| o.id).collect();
        let deleted = self.store.delete_stale(spec, &keep).await?;
        if deleted > 0 {
            info!(collection = section, deleted, "deleted rows that disappeared upstream");
        }
        report.record_n(section, OpOutcome::Deleted, deleted);

        Ok(written)
    }
}

fn coerce<T>(mapped: Mapped<T>, field: &'static str, remote_id: &str, coerced: &mut u64) -> Option<T> {
    match mapped {
        Mapped::Known(v) => Some(v),
        Mapped::Unmapped(raw) => {
            warn!(field, remote_id, raw = %raw, "unmapped remote value coerced to null");
            *coerced += 1;
            None
        }
        Mapped::Absent => None,
    }
}
