//! In-memory `Store`.
//!
//! Upserts go through the same [`UpsertSpec`] the Postgres store renders, so
//! column policy (`PreserveOnNull` / `Overwrite`) and source-tag scoping
//! behave identically. Unique constraints the schema declares
//! (`network_span_id`, one RUNNING run per system) are enforced too.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use chrono::{Duration, NaiveDate, Utc};
use cred_db::upsert::LICENSES;
use cred_db::{
    BeginRun, ColumnValue, LicenseRow, LicenseSource, ProviderRow, ProviderVerification,
    ProviderWithLicenses, RunFinish, Store, SyncRunRow, SyncRunStatus, UpsertOutcome, UpsertRow,
    UpsertSpec,
};
use uuid::Uuid;

/// A row of a pulled mirror table (`verified_providers`, `board_certificates`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRow {
    pub id: Uuid,
    pub key: String,
    pub values: Vec<ColumnValue>,
}

impl MirrorRow {
    pub fn value(&self, spec: &UpsertSpec, column: &str) -> Option<&ColumnValue> {
        let idx = spec.columns.iter().position(|(c, _)| *c == column)?;
        self.values.get(idx)
    }
}

#[derive(Default)]
struct Inner {
    providers: Vec<ProviderRow>,
    licenses: Vec<LicenseRow>,
    mirrors: BTreeMap<&'static str, Vec<MirrorRow>>,
    runs: Vec<SyncRunRow>,
    writes: usize,
    upsert_calls: usize,
    fail_upsert_call: Option<usize>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    // --- seeding -----------------------------------------------------------

    pub fn add_provider(&self, npi: &str, first_name: &str, last_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.insert_provider(ProviderRow {
            id,
            npi: Some(npi.to_string()),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            network_provider_id: None,
            verification_provider_id: None,
            verification_status: None,
            verified_at: None,
        });
        id
    }

    pub fn insert_provider(&self, row: ProviderRow) {
        self.lock().providers.push(row);
    }

    /// A manually entered license.
    pub fn add_license(
        &self,
        provider_id: Uuid,
        state: &str,
        issue_date: Option<NaiveDate>,
        expiration_date: Option<NaiveDate>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.insert_license(LicenseRow {
            id,
            provider_id: Some(provider_id),
            state: Some(state.to_string()),
            license_number: None,
            issue_date,
            expiration_date,
            status: None,
            source: LicenseSource::Manual,
            verification_license_id: None,
            network_span_id: None,
        });
        id
    }

    pub fn insert_license(&self, row: LicenseRow) {
        self.lock().licenses.push(row);
    }

    /// Make the `n`th `upsert_rows` call (1-based) fail.
    pub fn fail_upsert_call(&self, n: usize) {
        self.lock().fail_upsert_call = Some(n);
    }

    /// Seed a RUNNING row as if another pass held the lease since `started_secs_ago`.
    pub fn hold_lease(&self, system: &str, started_secs_ago: i64) -> Uuid {
        let run_id = Uuid::new_v4();
        self.lock().runs.push(SyncRunRow {
            run_id,
            system: system.to_string(),
            status: SyncRunStatus::Running,
            started_at_utc: Utc::now() - Duration::seconds(started_secs_ago),
            finished_at_utc: None,
            report: None,
            error: None,
        });
        run_id
    }

    // --- inspection --------------------------------------------------------

    pub fn provider(&self, id: Uuid) -> Option<ProviderRow> {
        self.lock().providers.iter().find(|p| p.id == id).cloned()
    }

    pub fn license(&self, id: Uuid) -> Option<LicenseRow> {
        self.lock().licenses.iter().find(|l| l.id == id).cloned()
    }

    pub fn licenses(&self) -> Vec<LicenseRow> {
        self.lock().licenses.clone()
    }

    pub fn mirror_rows(&self, spec: &UpsertSpec) -> Vec<MirrorRow> {
        self.lock()
            .mirrors
            .get(spec.table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn sync_runs(&self) -> Vec<SyncRunRow> {
        self.lock().runs.clone()
    }

    /// Number of mutating store calls so far (lease bookkeeping excluded).
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Number of `upsert_rows` calls so far, failed ones included.
    pub fn upsert_call_count(&self) -> usize {
        self.lock().upsert_calls
    }
}

fn license_image(l: &LicenseRow) -> Vec<ColumnValue> {
    vec![
        ColumnValue::Uuid(l.provider_id),
        ColumnValue::Text(l.state.clone()),
        ColumnValue::Text(l.license_number.clone()),
        ColumnValue::Date(l.issue_date),
        ColumnValue::Date(l.expiration_date),
        ColumnValue::Text(l.status.clone()),
    ]
}

fn apply_license_image(l: &mut LicenseRow, values: &[ColumnValue]) -> Result<()> {
    match values {
        [ColumnValue::Uuid(provider_id), ColumnValue::Text(state), ColumnValue::Text(number), ColumnValue::Date(issue), ColumnValue::Date(expiration), ColumnValue::Text(status)] =>
        {
            l.provider_id = *provider_id;
            l.state = state.clone();
            l.license_number = number.clone();
            l.issue_date = *issue;
            l.expiration_date = *expiration;
            l.status = status.clone();
            Ok(())
        }
        _ => bail!("license row image does not match the licenses upsert columns"),
    }
}

fn is_licenses(spec: &UpsertSpec) -> bool {
    spec.table == LICENSES.table
}

fn source_matches(spec: &UpsertSpec, l: &LicenseRow) -> bool {
    match spec.source_tag {
        Some((_, tag)) => l.source.as_str() == tag,
        None => true,
    }
}

#[async_trait::async_trait]
impl Store for MemStore {
    async fn load_providers_with_licenses(&self) -> Result<Vec<ProviderWithLicenses>> {
        let inner = self.lock();
        let mut out: Vec<ProviderWithLicenses> = inner
            .providers
            .iter()
            .filter(|p| p.npi.as_deref().is_some_and(|n| !n.trim().is_empty()))
            .map(|p| ProviderWithLicenses {
                provider: p.clone(),
                licenses: inner
                    .licenses
                    .iter()
                    .filter(|l| l.provider_id == Some(p.id))
                    .cloned()
                    .collect(),
            })
            .collect();
        out.sort_by(|a, b| a.provider.npi.cmp(&b.provider.npi));
        Ok(out)
    }

    async fn set_network_provider_id(
        &self,
        provider_id: Uuid,
        network_provider_id: &str,
    ) -> Result<()> {
        let mut inner = self.lock();
        let p = inner
            .providers
            .iter_mut()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| anyhow!("provider {provider_id} not found"))?;
        p.network_provider_id = Some(network_provider_id.to_string());
        inner.writes += 1;
        Ok(())
    }

    async fn set_license_span_id(&self, license_id: Uuid, span_id: Option<&str>) -> Result<()> {
        let mut inner = self.lock();
        if let Some(span) = span_id {
            if inner
                .licenses
                .iter()
                .any(|l| l.id != license_id && l.network_span_id.as_deref() == Some(span))
            {
                bail!("duplicate key value violates unique constraint on network_span_id ({span})");
            }
        }
        let l = inner
            .licenses
            .iter_mut()
            .find(|l| l.id == license_id)
            .ok_or_else(|| anyhow!("license {license_id} not found"))?;
        l.network_span_id = span_id.map(str::to_string);
        inner.writes += 1;
        Ok(())
    }

    async fn load_providers(&self) -> Result<Vec<ProviderRow>> {
        Ok(self.lock().providers.clone())
    }

    async fn pulled_remote_ids(&self, spec: &UpsertSpec) -> Result<Vec<String>> {
        let inner = self.lock();
        if is_licenses(spec) {
            return Ok(inner
                .licenses
                .iter()
                .filter(|l| source_matches(spec, l))
                .filter_map(|l| l.verification_license_id.clone())
                .collect());
        }
        Ok(inner
            .mirrors
            .get(spec.table)
            .map(|rows| rows.iter().map(|r| r.key.clone()).collect())
            .unwrap_or_default())
    }

    async fn upsert_rows(
        &self,
        spec: &UpsertSpec,
        rows: &[UpsertRow],
    ) -> Result<Vec<UpsertOutcome>> {
        let mut inner = self.lock();
        inner.upsert_calls += 1;
        if inner.fail_upsert_call == Some(inner.upsert_calls) {
            bail!("injected failure on upsert call {}", inner.upsert_calls);
        }
        for row in rows {
            spec.check_row(row)?;
        }

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if is_licenses(spec) {
                let existing = inner
                    .licenses
                    .iter_mut()
                    .find(|l| l.verification_license_id.as_deref() == Some(row.key.as_str()));
                match existing {
                    Some(l) => {
                        let mut image = license_image(l);
                        spec.merge_into(&mut image, &row.values);
                        apply_license_image(l, &image)?;
                        l.source = LicenseSource::Verification;
                        out.push(UpsertOutcome {
                            id: l.id,
                            key: row.key.clone(),
                            inserted: false,
                        });
                    }
                    None => {
                        let mut l = LicenseRow {
                            id: Uuid::new_v4(),
                            provider_id: None,
                            state: None,
                            license_number: None,
                            issue_date: None,
                            expiration_date: None,
                            status: None,
                            source: LicenseSource::Verification,
                            verification_license_id: Some(row.key.clone()),
                            network_span_id: None,
                        };
                        apply_license_image(&mut l, &row.values)?;
                        out.push(UpsertOutcome {
                            id: l.id,
                            key: row.key.clone(),
                            inserted: true,
                        });
                        inner.licenses.push(l);
                    }
                }
                continue;
            }

            let table = inner.mirrors.entry(spec.table).or_default();
            match table.iter_mut().find(|r| r.key == row.key) {
                Some(r) => {
                    spec.merge_into(&mut r.values, &row.values);
                    out.push(UpsertOutcome {
                        id: r.id,
                        key: row.key.clone(),
                        inserted: false,
                    });
                }
                None => {
                    let r = MirrorRow {
                        id: Uuid::new_v4(),
                        key: row.key.clone(),
                        values: row.values.clone(),
                    };
                    out.push(UpsertOutcome {
                        id: r.id,
                        key: row.key.clone(),
                        inserted: true,
                    });
                    table.push(r);
                }
            }
        }
        inner.writes += 1;
        Ok(out)
    }

    async fn delete_stale(&self, spec: &UpsertSpec, keep_ids: &[Uuid]) -> Result<u64> {
        let mut inner = self.lock();
        let removed = if is_licenses(spec) {
            let before = inner.licenses.len();
            inner
                .licenses
                .retain(|l| !source_matches(spec, l) || keep_ids.contains(&l.id));
            before - inner.licenses.len()
        } else {
            let table = inner.mirrors.entry(spec.table).or_default();
            let before = table.len();
            table.retain(|r| keep_ids.contains(&r.id));
            before - table.len()
        };
        inner.writes += 1;
        Ok(removed as u64)
    }

    async fn refresh_provider_verification(
        &self,
        updates: &[ProviderVerification],
    ) -> Result<u64> {
        let mut inner = self.lock();
        let mut n = 0;
        for u in updates {
            if let Some(p) = inner.providers.iter_mut().find(|p| p.id == u.provider_id) {
                p.verification_provider_id = Some(u.verification_provider_id.clone());
                p.verification_status = u.status.clone();
                p.verified_at = u.verified_at;
                n += 1;
            }
        }
        inner.writes += 1;
        Ok(n)
    }

    async fn clear_provider_verification_except(&self, keep: &[Uuid]) -> Result<u64> {
        let mut inner = self.lock();
        let mut n = 0;
        for p in inner.providers.iter_mut().filter(|p| !keep.contains(&p.id)) {
            if p.verification_provider_id.is_some()
                || p.verification_status.is_some()
                || p.verified_at.is_some()
            {
                p.verification_provider_id = None;
                p.verification_status = None;
                p.verified_at = None;
                n += 1;
            }
        }
        inner.writes += 1;
        Ok(n)
    }

    async fn begin_sync_run(&self, system: &str, ttl_seconds: i64) -> Result<BeginRun> {
        if ttl_seconds <= 0 {
            bail!("lease ttl_seconds must be > 0");
        }
        let mut inner = self.lock();
        let now = Utc::now();
        let cutoff = now - Duration::seconds(ttl_seconds);
        for r in inner.runs.iter_mut().filter(|r| {
            r.system == system && r.status == SyncRunStatus::Running && r.started_at_utc < cutoff
        }) {
            r.status = SyncRunStatus::Abandoned;
            r.finished_at_utc = Some(now);
            r.error = Some("lease expired".to_string());
        }

        if inner
            .runs
            .iter()
            .any(|r| r.system == system && r.status == SyncRunStatus::Running)
        {
            return Ok(BeginRun::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        inner.runs.push(SyncRunRow {
            run_id,
            system: system.to_string(),
            status: SyncRunStatus::Running,
            started_at_utc: now,
            finished_at_utc: None,
            report: None,
            error: None,
        });
        Ok(BeginRun::Started(run_id))
    }

    async fn finish_sync_run(&self, run_id: Uuid, finish: &RunFinish) -> Result<()> {
        let mut inner = self.lock();
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id && r.status == SyncRunStatus::Running)
            .ok_or_else(|| {
                anyhow!("finish_sync_run: run {run_id} is not RUNNING (lease expired?)")
            })?;
        run.status = finish.status;
        run.finished_at_utc = Some(Utc::now());
        run.report = finish.report.clone();
        run.error = finish.error.clone();
        Ok(())
    }

    async fn latest_sync_run(&self, system: &str) -> Result<Option<SyncRunRow>> {
        Ok(self
            .lock()
            .runs
            .iter()
            .filter(|r| r.system == system)
            .max_by_key(|r| r.started_at_utc)
            .cloned())
    }
}
