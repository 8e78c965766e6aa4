//! Push reconciler: local providers and licenses mirrored into the network.
//!
//! Pass order:
//! 1. Reads: contracting provider (by NPI), full provider listing, payer,
//!    contracts, local providers with licenses.
//! 2. Diff providers on NPI (contracting provider excluded) and run the
//!    guardrail. Nothing has been written remotely yet, so a rejection leaves
//!    zero partial state.
//! 3. Create or update the contracting provider.
//! 4. Provider updates, then creates; each followed by license sync for that
//!    provider. Remote-only providers are counted as unsupported.
//! 5. Contract maintenance: matched and created providers are added to the
//!    payer contract; members the pass does not manage are never removed.
//!
//! Per-entity remote failures are logged and counted; the loop continues.
//! Failures of the reads in step 1, of the contracting provider write, and of
//! any local store write abort the pass.

use std::collections::HashSet;

use chrono::NaiveDate;
use cred_config::PushSettings;
use cred_db::{LicenseRow, ProviderWithLicenses, Store};
use cred_reconcile::{
    check_plan, diff_by_key, exclude_overlaps, Interval, OpOutcome, ReportAggregator, SyncCounts,
    SyncReport,
};
use cred_remote::{
    Contract, ContractFields, CredentialingSpan, NetworkClient, NetworkProvider, Payer,
    ProviderFields, ProviderFilter, SpanFields,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;

pub const SYSTEM: &str = "push";

const SECTION_CONTRACTING: &str = "contracting_provider";
const SECTION_PROVIDERS: &str = "providers";
const SECTION_LICENSES: &str = "licenses";
const SECTION_CONTRACTS: &str = "contracts";

pub struct PushReconciler<'a> {
    network: &'a dyn NetworkClient,
    store: &'a dyn Store,
    settings: &'a PushSettings,
}

/// Identifiers every span of this pass is written under.
struct SpanScope<'s> {
    contracting_provider_id: &'s str,
    payer_id: &'s str,
}

impl<'a> PushReconciler<'a> {
    pub fn new(
        network: &'a dyn NetworkClient,
        store: &'a dyn Store,
        settings: &'a PushSettings,
    ) -> Self {
        Self {
            network,
            store,
            settings,
        }
    }

    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let mut report = ReportAggregator::new(SYSTEM);
        let contracting_npi = self.settings.contracting_provider.npi.trim().to_string();

        // --- reads -----------------------------------------------------------
        let existing_contracting = self.find_contracting_provider(&contracting_npi).await?;
        let remote_providers = self.list_all_providers().await?;
        let payer = self.resolve_payer().await?;
        let contracts = self
            .network
            .list_contracts()
            .await
            .map_err(|e| SyncError::remote("list contracts", e))?;
        let local = self.store.load_providers_with_licenses().await?;

        // --- plan ------------------------------------------------------------
        let (keyed_remote, unkeyed): (Vec<NetworkProvider>, Vec<NetworkProvider>) =
            remote_providers
                .into_iter()
                .partition(|p| p.fields().npi.is_some());
        if !unkeyed.is_empty() {
            warn!(
                count = unkeyed.len(),
                "network providers without an NPI cannot be correlated; ignored"
            );
        }

        let mut plan = diff_by_key(
            local,
            keyed_remote,
            |l: &ProviderWithLicenses| l.provider.npi.as_deref().unwrap_or("").trim().to_string(),
            |r: &NetworkProvider| r.fields().npi.unwrap_or_default(),
        )?;
        plan.exclude_keys(|npi| *npi == contracting_npi);

        let summary = check_plan(&plan, &self.settings.provider_limits()).map_err(|v| {
            warn!(violation = %v, "provider plan rejected; no remote writes performed");
            v
        })?;
        info!(
            creates = summary.creates,
            updates = summary.updates,
            remote_only = summary.deletes,
            "provider plan accepted"
        );

        // --- writes ----------------------------------------------------------
        let contracting_id = self
            .ensure_contracting_provider(existing_contracting, &contracting_npi, &mut report)
            .await?;
        let scope = SpanScope {
            contracting_provider_id: &contracting_id,
            payer_id: &payer.id,
        };

        let mut rendering_ids: Vec<String> = Vec::new();

        for (npi, local, remote) in plan.to_update {
            rendering_ids.push(remote.id.clone());
            let desired = desired_provider_fields(&npi, &local);

            if remote.fields() == desired {
                report.record(SECTION_PROVIDERS, OpOutcome::AlreadyInSync);
            } else {
                match self.network.update_provider(&remote.id, &desired).await {
                    Ok(_) => {
                        debug!(npi = %npi, provider_id = %remote.id, "provider updated");
                        report.record(SECTION_PROVIDERS, OpOutcome::Updated);
                    }
                    Err(e) => {
                        warn!(npi = %npi, provider_id = %remote.id, error = %e, "provider update failed");
                        report.record(SECTION_PROVIDERS, OpOutcome::Failed);
                        continue;
                    }
                }
            }

            if local.provider.network_provider_id.as_deref() != Some(remote.id.as_str()) {
                self.store
                    .set_network_provider_id(local.provider.id, &remote.id)
                    .await?;
            }
            self.sync_licenses(&scope, &remote.id, &local.licenses, &mut report)
                .await?;
        }

        for (npi, local) in plan.to_create {
            let desired = desired_provider_fields(&npi, &local);
            let created = match self.network.create_provider(&desired).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(npi = %npi, error = %e, "provider create failed");
                    report.record(SECTION_PROVIDERS, OpOutcome::Failed);
                    continue;
                }
            };
            debug!(npi = %npi, provider_id = %created.id, "provider created");
            report.record(SECTION_PROVIDERS, OpOutcome::Created);

            self.store
                .set_network_provider_id(local.provider.id, &created.id)
                .await?;
            rendering_ids.push(created.id.clone());
            self.sync_licenses(&scope, &created.id, &local.licenses, &mut report)
                .await?;
        }

        for (npi, remote) in &plan.to_delete {
            warn!(
                npi = %npi,
                provider_id = %remote.id,
                "network provider has no local counterpart; deletion unsupported"
            );
            report.record(SECTION_PROVIDERS, OpOutcome::Unsupported);
        }

        self.maintain_contract(&scope, &contracts, rendering_ids, &mut report)
            .await;

        let report = report.finish();
        info!(
            attempted = report.totals.attempted,
            failed = report.totals.failed,
            "push pass finished"
        );
        Ok(report)
    }

    async fn find_contracting_provider(
        &self,
        npi: &str,
    ) -> Result<Option<NetworkProvider>, SyncError> {
        let page = self
            .network
            .list_providers(&ProviderFilter::by_npi(npi))
            .await
            .map_err(|e| SyncError::remote("resolve contracting provider", e))?;
        if page.is_partial() {
            return Err(SyncError::Consistency(format!(
                "contracting provider lookup for npi {npi} returned a partial page"
            )));
        }

        let mut matches: Vec<NetworkProvider> = page
            .results
            .into_iter()
            .filter(|p| p.fields().npi.as_deref() == Some(npi))
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(SyncError::Consistency(format!(
                "{n} network providers share contracting npi {npi}"
            ))),
        }
    }

    async fn list_all_providers(&self) -> Result<Vec<NetworkProvider>, SyncError> {
        let page = self
            .network
            .list_providers(&ProviderFilter::all())
            .await
            .map_err(|e| SyncError::remote("list network providers", e))?;
        if page.is_partial() {
            warn!(
                count = page.count,
                returned = page.results.len(),
                "provider listing needs pagination the network does not support"
            );
            return Err(SyncError::Consistency(format!(
                "provider listing is partial: {} of {} rows",
                page.results.len(),
                page.count
            )));
        }
        Ok(page.results)
    }

    async fn resolve_payer(&self) -> Result<Payer, SyncError> {
        let term = &self.settings.payer_search;
        let mut page = self
            .network
            .search_payers(term)
            .await
            .map_err(|e| SyncError::remote("search payers", e))?;
        if page.results.len() != 1 || page.is_partial() {
            return Err(SyncError::Consistency(format!(
                "payer search {term:?} must match exactly one payer, matched {}",
                page.count.max(page.results.len() as u64)
            )));
        }
        page.results
            .pop()
            .ok_or_else(|| SyncError::Consistency(format!("payer search {term:?} returned no rows")))
    }

    async fn ensure_contracting_provider(
        &self,
        existing: Option<NetworkProvider>,
        npi: &str,
        report: &mut ReportAggregator,
    ) -> Result<String, SyncError> {
        let desired =
            ProviderFields::organization(npi, &self.settings.contracting_provider.organization_name);

        match existing {
            Some(p) if p.fields() == desired => {
                report.record(SECTION_CONTRACTING, OpOutcome::AlreadyInSync);
                Ok(p.id)
            }
            Some(p) => {
                let updated = self
                    .network
                    .update_provider(&p.id, &desired)
                    .await
                    .map_err(|e| SyncError::remote("update contracting provider", e))?;
                info!(provider_id = %updated.id, "contracting provider updated");
                report.record(SECTION_CONTRACTING, OpOutcome::Updated);
                Ok(updated.id)
            }
            None => {
                let created = self
                    .network
                    .create_provider(&desired)
                    .await
                    .map_err(|e| SyncError::remote("create contracting provider", e))?;
                info!(provider_id = %created.id, "contracting provider created");
                report.record(SECTION_CONTRACTING, OpOutcome::Created);
                Ok(created.id)
            }
        }
    }

    /// Mirror one provider's licenses as credentialing spans.
    ///
    /// Remote failures are counted under `licenses`; only store failures
    /// propagate.
    async fn sync_licenses(
        &self,
        scope: &SpanScope<'_>,
        network_provider_id: &str,
        licenses: &[LicenseRow],
        report: &mut ReportAggregator,
    ) -> Result<(), SyncError> {
        let mut counts = SyncCounts::default();
        let result = self
            .sync_licenses_inner(scope, network_provider_id, licenses, report, &mut counts)
            .await;
        report.absorb(SECTION_LICENSES, &counts);
        result
    }

    async fn sync_licenses_inner(
        &self,
        scope: &SpanScope<'_>,
        network_provider_id: &str,
        licenses: &[LicenseRow],
        report: &mut ReportAggregator,
        counts: &mut SyncCounts,
    ) -> Result<(), SyncError> {
        let candidates: Vec<Candidate<'_>> = licenses.iter().filter_map(Candidate::new).collect();
        let outcome = exclude_overlaps(candidates);
        for ex in &outcome.excluded {
            info!(
                license_id = %ex.item.license.id,
                state = %ex.item.group,
                envelope_start = %ex.envelope.start,
                envelope_end = %ex.envelope.end,
                "license excluded: overlaps a longer-lived license in the same state"
            );
        }
        report.note_overlap_excluded(outcome.excluded.len() as u64);

        let spans = match self
            .network
            .list_credentialing_spans(network_provider_id)
            .await
        {
            Ok(spans) => spans,
            Err(e) => {
                warn!(provider_id = %network_provider_id, error = %e, "listing credentialing spans failed");
                counts.record(OpOutcome::Failed);
                return Ok(());
            }
        };
        let spans: Vec<CredentialingSpan> = spans
            .into_iter()
            .filter(|s| {
                s.contracting_provider_id == scope.contracting_provider_id
                    && s.payer_id == scope.payer_id
            })
            .collect();
        let remote_ids: HashSet<&str> = spans.iter().map(|s| s.id.as_str()).collect();

        let plan = diff_by_key(
            outcome.kept,
            spans.iter().cloned(),
            |c: &Candidate<'_>| match c.license.network_span_id.as_deref() {
                Some(id) if remote_ids.contains(id) => SpanKey::Remote(id.to_string()),
                _ => SpanKey::Pending(c.license.id),
            },
            |s: &CredentialingSpan| SpanKey::Remote(s.id.clone()),
        );
        let plan = match plan {
            Ok(p) => p,
            Err(e) => {
                warn!(provider_id = %network_provider_id, error = %e, "span plan rejected");
                report.note_guardrail_rejection();
                counts.record(OpOutcome::Failed);
                return Ok(());
            }
        };
        if let Err(v) = check_plan(&plan, &self.settings.span_limits()) {
            warn!(provider_id = %network_provider_id, violation = %v, "span plan rejected");
            report.note_guardrail_rejection();
            counts.record(OpOutcome::Failed);
            return Ok(());
        }

        for (_, span) in &plan.to_delete {
            match self.network.delete_credentialing_span(&span.id).await {
                Ok(()) => {
                    debug!(span_id = %span.id, "orphan span deleted");
                    counts.record(OpOutcome::Deleted);
                    for l in licenses
                        .iter()
                        .filter(|l| l.network_span_id.as_deref() == Some(span.id.as_str()))
                    {
                        self.store.set_license_span_id(l.id, None).await?;
                    }
                }
                Err(e) => {
                    warn!(span_id = %span.id, error = %e, "span delete failed");
                    counts.record(OpOutcome::Failed);
                }
            }
        }

        for (_, cand, span) in &plan.to_update {
            let desired = cand.desired_span(scope, network_provider_id);
            if span.fields().same_coverage(&desired) {
                counts.record(OpOutcome::AlreadyInSync);
                continue;
            }
            match self
                .network
                .update_credentialing_span(&span.id, &desired)
                .await
            {
                Ok(_) => counts.record(OpOutcome::Updated),
                Err(e) => {
                    warn!(span_id = %span.id, license_id = %cand.license.id, error = %e, "span update failed");
                    counts.record(OpOutcome::Failed);
                }
            }
        }

        for (_, cand) in &plan.to_create {
            let desired = cand.desired_span(scope, network_provider_id);
            match self.network.create_credentialing_span(&desired).await {
                Ok(span) => {
                    self.store
                        .set_license_span_id(cand.license.id, Some(&span.id))
                        .await?;
                    debug!(span_id = %span.id, license_id = %cand.license.id, "span created");
                    counts.record(OpOutcome::Created);
                }
                Err(e) => {
                    warn!(license_id = %cand.license.id, error = %e, "span create failed");
                    counts.record(OpOutcome::Failed);
                }
            }
        }

        Ok(())
    }

    async fn maintain_contract(
        &self,
        scope: &SpanScope<'_>,
        contracts: &[Contract],
        mut rendering_ids: Vec<String>,
        report: &mut ReportAggregator,
    ) {
        rendering_ids.sort();
        rendering_ids.dedup();

        let existing = contracts.iter().find(|c| {
            c.contracting_provider_id == scope.contracting_provider_id
                && c.payer_id == scope.payer_id
        });

        match existing {
            None => {
                let fields = ContractFields {
                    contracting_provider_id: scope.contracting_provider_id.to_string(),
                    payer_id: scope.payer_id.to_string(),
                    rendering_provider_ids: rendering_ids,
                };
                match self.network.create_contract(&fields).await {
                    Ok(c) => {
                        info!(contract_id = %c.id, "contract created");
                        report.record(SECTION_CONTRACTS, OpOutcome::Created);
                    }
                    Err(e) => {
                        warn!(error = %e, "contract create failed");
                        report.record(SECTION_CONTRACTS, OpOutcome::Failed);
                    }
                }
            }
            Some(contract) => {
                let mut current = contract.rendering_provider_ids.clone();
                current.sort();
                current.dedup();

                // Existing members this pass does not manage stay listed.
                let mut desired = current.clone();
                desired.extend(rendering_ids);
                desired.sort();
                desired.dedup();
                if current == desired {
                    report.record(SECTION_CONTRACTS, OpOutcome::AlreadyInSync);
                    return;
                }
                match self.network.update_contract(&contract.id, &desired).await {
                    Ok(_) => {
                        info!(
                            contract_id = %contract.id,
                            rendering_providers = desired.len(),
                            "contract updated"
                        );
                        report.record(SECTION_CONTRACTS, OpOutcome::Updated);
                    }
                    Err(e) => {
                        warn!(contract_id = %contract.id, error = %e, "contract update failed");
                        report.record(SECTION_CONTRACTS, OpOutcome::Failed);
                    }
                }
            }
        }
    }
}

fn desired_provider_fields(npi: &str, local: &ProviderWithLicenses) -> ProviderFields {
    ProviderFields::individual(
        npi,
        local.provider.first_name.as_deref(),
        local.provider.last_name.as_deref(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SpanKey {
    Remote(String),
    /// License with no live span yet.
    Pending(Uuid),
}

/// A license eligible for a span, grouped by its upper-cased state.
struct Candidate<'l> {
    license: &'l LicenseRow,
    group: String,
}

impl<'l> Candidate<'l> {
    fn new(license: &'l LicenseRow) -> Option<Self> {
        let group = license.state.as_deref()?.trim().to_ascii_uppercase();
        if group.is_empty() {
            return None;
        }
        Some(Self { license, group })
    }

    fn desired_span(&self, scope: &SpanScope<'_>, rendering_provider_id: &str) -> SpanFields {
        SpanFields {
            rendering_provider_id: rendering_provider_id.to_string(),
            contracting_provider_id: scope.contracting_provider_id.to_string(),
            payer_id: scope.payer_id.to_string(),
            start_date: self.license.issue_date,
            end_date: self.license.expiration_date,
            region: Some(self.group.clone()),
        }
    }
}

impl Interval for Candidate<'_> {
    type Id = Uuid;

    fn interval_id(&self) -> Uuid {
        self.license.id
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn start(&self) -> Option<NaiveDate> {
        self.license.issue_date
    }

    fn end(&self) -> Option<NaiveDate> {
        self.license.expiration_date
    }
}
