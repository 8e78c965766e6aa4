//! Scripted in-memory credentialing network.
//!
//! Holds providers, spans, payers and contracts; every call is logged as
//! `(NetOp, subject)`. Failures are injected per operation and subject.

use std::sync::{Mutex, MutexGuard};

use cred_remote::{
    Contract, ContractFields, CredentialingSpan, NetworkClient, NetworkProvider, Page, Payer,
    ProviderFields, ProviderFilter, RemoteError, SpanFields,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetOp {
    ListProviders,
    CreateProvider,
    UpdateProvider,
    ListSpans,
    CreateSpan,
    UpdateSpan,
    DeleteSpan,
    SearchPayers,
    ListContracts,
    CreateContract,
    UpdateContract,
}

impl NetOp {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            NetOp::CreateProvider
                | NetOp::UpdateProvider
                | NetOp::CreateSpan
                | NetOp::UpdateSpan
                | NetOp::DeleteSpan
                | NetOp::CreateContract
                | NetOp::UpdateContract
        )
    }
}

/// Matches any subject in [`FakeNetwork::fail`].
pub const ANY: &str = "*";

#[derive(Default)]
struct State {
    providers: Vec<NetworkProvider>,
    spans: Vec<CredentialingSpan>,
    payers: Vec<Payer>,
    contracts: Vec<Contract>,
    calls: Vec<(NetOp, String)>,
    failures: Vec<(NetOp, String, RemoteError)>,
    /// When set, unfiltered listings return at most this many rows.
    listing_page_size: Option<usize>,
    next_id: u64,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn call(&mut self, op: NetOp, subject: &str) -> Result<(), RemoteError> {
        self.calls.push((op, subject.to_string()));
        match self
            .failures
            .iter()
            .find(|(o, s, _)| *o == op && (s == ANY || s == subject))
        {
            Some((_, _, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeNetwork {
    state: Mutex<State>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // --- seeding -----------------------------------------------------------

    pub fn add_provider(&self, fields: ProviderFields) -> String {
        let mut s = self.lock();
        let id = s.id("np");
        s.providers.push(provider(id.clone(), fields));
        id
    }

    pub fn add_payer(&self, name: &str) -> String {
        let mut s = self.lock();
        let id = s.id("payer");
        s.payers.push(Payer {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn add_span(&self, fields: SpanFields) -> String {
        let mut s = self.lock();
        let id = s.id("span");
        s.spans.push(span(id.clone(), fields));
        id
    }

    pub fn add_contract(&self, fields: ContractFields) -> String {
        let mut s = self.lock();
        let id = s.id("contract");
        s.contracts.push(contract(id.clone(), fields));
        id
    }

    /// Fail every `op` call whose subject equals `subject` (or any, with [`ANY`]).
    ///
    /// Subjects: NPI for `CreateProvider`, provider id for `UpdateProvider`
    /// and `ListSpans`, rendering provider id for `CreateSpan`, span id for
    /// `UpdateSpan` / `DeleteSpan`, the filter NPI (or `""`) for
    /// `ListProviders`, the term for `SearchPayers`.
    pub fn fail(&self, op: NetOp, subject: &str, err: RemoteError) {
        self.lock()
            .failures
            .push((op, subject.to_string(), err));
    }

    /// Unfiltered provider listings become partial beyond `n` rows.
    pub fn limit_listing(&self, n: usize) {
        self.lock().listing_page_size = Some(n);
    }

    // --- inspection --------------------------------------------------------

    pub fn providers(&self) -> Vec<NetworkProvider> {
        self.lock().providers.clone()
    }

    pub fn provider_by_npi(&self, npi: &str) -> Option<NetworkProvider> {
        self.lock()
            .providers
            .iter()
            .find(|p| p.npi.as_deref() == Some(npi))
            .cloned()
    }

    pub fn spans(&self) -> Vec<CredentialingSpan> {
        self.lock().spans.clone()
    }

    pub fn spans_for(&self, rendering_provider_id: &str) -> Vec<CredentialingSpan> {
        self.lock()
            .spans
            .iter()
            .filter(|s| s.rendering_provider_id == rendering_provider_id)
            .cloned()
            .collect()
    }

    pub fn contracts(&self) -> Vec<Contract> {
        self.lock().contracts.clone()
    }

    pub fn calls(&self) -> Vec<(NetOp, String)> {
        self.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<(NetOp, String)> {
        self.calls()
            .into_iter()
            .filter(|(op, _)| op.is_mutation())
            .collect()
    }

    pub fn count(&self, op: NetOp) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }
}

fn provider(id: String, f: ProviderFields) -> NetworkProvider {
    NetworkProvider {
        id,
        npi: f.npi,
        first_name: f.first_name,
        last_name: f.last_name,
        organization_name: f.organization_name,
    }
}

fn span(id: String, f: SpanFields) -> CredentialingSpan {
    CredentialingSpan {
        id,
        rendering_provider_id: f.rendering_provider_id,
        contracting_provider_id: f.contracting_provider_id,
        payer_id: f.payer_id,
        start_date: f.start_date,
        end_date: f.end_date,
        region: f.region,
    }
}

fn contract(id: String, f: ContractFields) -> Contract {
    Contract {
        id,
        contracting_provider_id: f.contracting_provider_id,
        payer_id: f.payer_id,
        rendering_provider_ids: f.rendering_provider_ids,
    }
}

fn not_found(what: &str, id: &str) -> RemoteError {
    RemoteError::Api {
        status: 404,
        message: format!("{what} {id} not found"),
    }
}

#[async_trait::async_trait]
impl NetworkClient for FakeNetwork {
    async fn list_providers(
        &self,
        filter: &ProviderFilter,
    ) -> Result<Page<NetworkProvider>, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::ListProviders, filter.npi.as_deref().unwrap_or(""))?;
        let all: Vec<NetworkProvider> = s
            .providers
            .iter()
            .filter(|p| match &filter.npi {
                Some(npi) => p.npi.as_deref() == Some(npi.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        let total = all.len();
        match (filter.npi.as_ref(), s.listing_page_size) {
            (None, Some(n)) if total > n => Ok(Page {
                count: total as u64,
                next: Some("providers/?page=2".to_string()),
                results: all.into_iter().take(n).collect(),
            }),
            _ => Ok(Page::single(all)),
        }
    }

    async fn create_provider(
        &self,
        fields: &ProviderFields,
    ) -> Result<NetworkProvider, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::CreateProvider, fields.npi.as_deref().unwrap_or(""))?;
        let id = s.id("np");
        let p = provider(id, fields.clone());
        s.providers.push(p.clone());
        Ok(p)
    }

    async fn update_provider(
        &self,
        provider_id: &str,
        fields: &ProviderFields,
    ) -> Result<NetworkProvider, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::UpdateProvider, provider_id)?;
        let slot = s
            .providers
            .iter_mut()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| not_found("provider", provider_id))?;
        *slot = provider(provider_id.to_string(), fields.clone());
        Ok(slot.clone())
    }

    async fn list_credentialing_spans(
        &self,
        provider_id: &str,
    ) -> Result<Vec<CredentialingSpan>, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::ListSpans, provider_id)?;
        Ok(s.spans
            .iter()
            .filter(|sp| sp.rendering_provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn create_credentialing_span(
        &self,
        fields: &SpanFields,
    ) -> Result<CredentialingSpan, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::CreateSpan, &fields.rendering_provider_id)?;
        let id = s.id("span");
        let sp = span(id, fields.clone());
        s.spans.push(sp.clone());
        Ok(sp)
    }

    async fn update_credentialing_span(
        &self,
        span_id: &str,
        fields: &SpanFields,
    ) -> Result<CredentialingSpan, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::UpdateSpan, span_id)?;
        let slot = s
            .spans
            .iter_mut()
            .find(|sp| sp.id == span_id)
            .ok_or_else(|| not_found("span", span_id))?;
        *slot = span(span_id.to_string(), fields.clone());
        Ok(slot.clone())
    }

    async fn delete_credentialing_span(&self, span_id: &str) -> Result<(), RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::DeleteSpan, span_id)?;
        let before = s.spans.len();
        s.spans.retain(|sp| sp.id != span_id);
        if s.spans.len() == before {
            return Err(not_found("span", span_id));
        }
        Ok(())
    }

    async fn search_payers(&self, term: &str) -> Result<Page<Payer>, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::SearchPayers, term)?;
        let needle = term.to_ascii_lowercase();
        Ok(Page::single(
            s.payers
                .iter()
                .filter(|p| p.name.to_ascii_lowercase().contains(&needle))
                .cloned()
                .collect(),
        ))
    }

    async fn list_contracts(&self) -> Result<Vec<Contract>, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::ListContracts, "")?;
        Ok(s.contracts.clone())
    }

    async fn create_contract(&self, fields: &ContractFields) -> Result<Contract, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::CreateContract, &fields.payer_id)?;
        let id = s.id("contract");
        let c = contract(id, fields.clone());
        s.contracts.push(c.clone());
        Ok(c)
    }

    async fn update_contract(
        &self,
        contract_id: &str,
        rendering_provider_ids: &[String],
    ) -> Result<Contract, RemoteError> {
        let mut s = self.lock();
        s.call(NetOp::UpdateContract, contract_id)?;
        let slot = s
            .contracts
            .iter_mut()
            .find(|c| c.id == contract_id)
            .ok_or_else(|| not_found("contract", contract_id))?;
        slot.rendering_provider_ids = rendering_provider_ids.to_vec();
        Ok(slot.clone())
    }
}
