//! Scenario: push pass failure semantics.
//!
//! # Invariants under test
//!
//! 1. A provider plan above the operation ceiling aborts the pass with zero
//!    remote mutations and zero local writes (the contracting provider is
//!    not touched either).
//! 2. One failing provider create mid-pass is counted; every other provider
//!    and its licenses still sync, and the pass succeeds.
//! 3. A failing span listing for one provider counts one license failure for
//!    that provider only.
//! 4. A span plan above the per-provider ceiling is rejected for that
//!    provider only and counted as a guardrail rejection.
//! 5. Failures of the reads the pass depends on are fatal: partial provider
//!    listing, ambiguous payer, contract listing, contracting provider write.
//! 6. A failing provider update is counted; that provider's licenses are not
//!    synced and every other provider still is.
//! 7. Contract maintenance never drops members it does not manage, such as
//!    remote-only providers.
//! 8. A local provider with a blank NPI is never pushed, so repeated passes
//!    do not pile up unkeyed remote providers.
//! 9. Matched providers count toward the provider ceiling even when already
//!    in sync.

use cred_config::{ContractingProviderSettings, PushSettings};
use cred_reconcile::GuardrailViolation;
use cred_remote::{ContractFields, ProviderFields, RemoteError};
use cred_sync::{PushReconciler, SyncError};
use cred_testkit::{date, FakeNetwork, MemStore, NetOp, ANY};

const CONTRACTING_NPI: &str = "1999999999";

fn push_settings(max_provider_operations: usize, max_span_operations: usize) -> PushSettings {
    PushSettings {
        base_url: "http://network.invalid/api/".to_string(),
        keys_env: Default::default(),
        contracting_provider: ContractingProviderSettings {
            npi: CONTRACTING_NPI.to_string(),
            organization_name: "Acme Health Group".to_string(),
        },
        payer_search: "Blue Shield".to_string(),
        max_provider_operations,
        max_span_operations_per_provider: max_span_operations,
    }
}

fn server_error() -> RemoteError {
    RemoteError::Api {
        status: 500,
        message: "internal error".to_string(),
    }
}

/// Three local providers, one license each, nothing remote but the payer.
fn three_new_providers() -> (MemStore, FakeNetwork) {
    let store = MemStore::new();
    for (i, state) in ["FL", "GA", "TX"].iter().enumerate() {
        let id = store.add_provider(&format!("100000000{}", i + 1), "First", "Last");
        store.add_license(id, state, date("2020-01-01"), date("2022-01-01"));
    }
    let net = FakeNetwork::new();
    net.add_payer("Blue Shield of California");
    (store, net)
}

// ---------------------------------------------------------------------------
// 1
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provider_ceiling_aborts_before_any_mutation() {
    let (store, net) = three_new_providers();
    let settings = push_settings(2, 50);

    let err = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            SyncError::Guardrail(GuardrailViolation::TooManyOperations {
                planned: 3,
                ceiling: 2
            })
        ),
        "got {err:?}"
    );
    assert!(net.mutation_calls().is_empty());
    assert!(net.providers().is_empty());
    assert_eq!(store.write_count(), 0);
}

// ---------------------------------------------------------------------------
// 2
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_provider_create_does_not_stop_the_pass() {
    let (store, net) = three_new_providers();
    net.fail(NetOp::CreateProvider, "1000000002", server_error());
    let settings = push_settings(250, 50);

    let report = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("pass succeeds with a counted failure");

    let providers = report.section("providers");
    assert_eq!(providers.attempted, 3);
    assert_eq!(providers.created, 2);
    assert_eq!(providers.failed, 1);
    assert_eq!(report.section("licenses").created, 2);
    assert!(!report.is_clean());

    assert!(net.provider_by_npi("1000000001").is_some());
    assert!(net.provider_by_npi("1000000002").is_none());
    assert!(net.provider_by_npi("1000000003").is_some());

    let pending: Vec<_> = store
        .licenses()
        .into_iter()
        .filter(|l| l.network_span_id.is_none())
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].state.as_deref(), Some("GA"));

    assert_eq!(net.contracts()[0].rendering_provider_ids.len(), 2);
}

// ---------------------------------------------------------------------------
// 3
// ---------------------------------------------------------------------------

#[tokio::test]
async fn span_listing_failure_is_scoped_to_one_provider() {
    let store = MemStore::new();
    let ada = store.add_provider("1000000001", "Ada", "Lovelace");
    store.add_license(ada, "FL", date("2020-01-01"), date("2022-01-01"));
    let grace = store.add_provider("1000000002", "Grace", "Hopper");
    store.add_license(grace, "GA", date("2020-01-01"), date("2022-01-01"));

    let net = FakeNetwork::new();
    net.add_payer("Blue Shield of California");
    let grace_remote = net.add_provider(ProviderFields::individual(
        "1000000002",
        Some("Grace"),
        Some("Hopper"),
    ));
    net.fail(NetOp::ListSpans, &grace_remote, server_error());

    let settings = push_settings(250, 50);
    let report = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("push pass");

    let licenses = report.section("licenses");
    assert_eq!(licenses.created, 1);
    assert_eq!(licenses.failed, 1);
    assert!(net.spans_for(&grace_remote).is_empty());
}

// ---------------------------------------------------------------------------
// 4
// ---------------------------------------------------------------------------

#[tokio::test]
async fn span_ceiling_rejects_one_provider_only() {
    let store = MemStore::new();
    let ada = store.add_provider("1000000001", "Ada", "Lovelace");
    store.add_license(ada, "FL", date("2020-01-01"), date("2022-01-01"));
    store.add_license(ada, "GA", date("2020-01-01"), date("2022-01-01"));
    let grace = store.add_provider("1000000002", "Grace", "Hopper");
    store.add_license(grace, "TX", date("2020-01-01"), date("2022-01-01"));

    let net = FakeNetwork::new();
    net.add_payer("Blue Shield of California");
    let settings = push_settings(250, 1);

    let report = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("push pass");

    assert_eq!(report.guardrail_rejections, 1);
    assert_eq!(report.section("providers").created, 2);
    let licenses = report.section("licenses");
    assert_eq!(licenses.failed, 1);
    assert_eq!(licenses.created, 1);

    let ada_remote = net.provider_by_npi("1000000001").expect("ada created");
    assert!(net.spans_for(&ada_remote.id).is_empty());
    assert_eq!(net.count(NetOp::CreateSpan), 1);
}

// ---------------------------------------------------------------------------
// 5
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_provider_listing_is_fatal() {
    let (store, net) = three_new_providers();
    for npi in ["2000000001", "2000000002", "2000000003"] {
        net.add_provider(ProviderFields::individual(npi, Some("R"), Some("Emote")));
    }
    net.limit_listing(2);
    let settings = push_settings(250, 50);

    let err = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Consistency(ref m) if m.contains("partial")), "got {err:?}");
    assert!(net.mutation_calls().is_empty());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn ambiguous_payer_is_fatal() {
    let (store, net) = three_new_providers();
    net.add_payer("Blue Shield of Oregon");
    let settings = push_settings(250, 50);

    let err = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Consistency(ref m) if m.contains("exactly one")), "got {err:?}");
    assert!(net.mutation_calls().is_empty());
}

#[tokio::test]
async fn contract_listing_failure_is_fatal() {
    let (store, net) = three_new_providers();
    net.fail(NetOp::ListContracts, ANY, server_error());
    let settings = push_settings(250, 50);

    let err = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .unwrap_err();
    match err {
        SyncError::Remote { context, source } => {
            assert_eq!(context, "list contracts");
            assert_eq!(source.status(), Some(500));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(net.mutation_calls().is_empty());
}

#[tokio::test]
async fn contracting_provider_write_failure_is_fatal() {
    let (store, net) = three_new_providers();
    net.fail(NetOp::CreateProvider, CONTRACTING_NPI, server_error());
    let settings = push_settings(250, 50);

    let err = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .unwrap_err();
    assert!(
        matches!(err, SyncError::Remote { ref context, .. } if context == "create contracting provider"),
        "got {err:?}"
    );
    assert_eq!(net.count(NetOp::CreateProvider), 1);
    assert_eq!(store.write_count(), 0);
}

// ---------------------------------------------------------------------------
// 6
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_provider_update_skips_only_that_providers_licenses() {
    let store = MemStore::new();
    let ada = store.add_provider("1000000001", "Ada", "Lovelace");
    store.add_license(ada, "FL", date("2020-01-01"), date("2022-01-01"));
    let grace = store.add_provider("1000000002", "Grace", "Hopper");
    store.add_license(grace, "GA", date("2020-01-01"), date("2022-01-01"));
    let alan = store.add_provider("1000000003", "Alan", "Turing");
    store.add_license(alan, "TX", date("2020-01-01"), date("2022-01-01"));

    let net = FakeNetwork::new();
    net.add_payer("Blue Shield of California");
    let ada_remote = net.add_provider(ProviderFields::individual(
        "1000000001",
        Some("Ada"),
        Some("Byron"),
    ));
    let grace_remote = net.add_provider(ProviderFields::individual(
        "1000000002",
        Some("Grace"),
        Some("Murray"),
    ));
    net.fail(NetOp::UpdateProvider, &ada_remote, server_error());

    let settings = push_settings(250, 50);
    let report = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("pass succeeds with a counted failure");

    let providers = report.section("providers");
    assert_eq!(providers.attempted, 3);
    assert_eq!(providers.updated, 1);
    assert_eq!(providers.created, 1);
    assert_eq!(providers.failed, 1);
    assert_eq!(providers.already_in_sync, 0);
    assert_eq!(providers.unsupported, 0);

    let licenses = report.section("licenses");
    assert_eq!(licenses.created, 2);
    assert_eq!(licenses.failed, 0);
    assert!(report.totals.is_consistent());
    assert!(!report.is_clean());

    assert!(net.spans_for(&ada_remote).is_empty());
    assert_eq!(net.spans_for(&grace_remote).len(), 1);
    assert!(!net
        .calls()
        .iter()
        .any(|(op, subject)| *op == NetOp::ListSpans && *subject == ada_remote));
    assert_eq!(
        net.provider_by_npi("1000000001").and_then(|p| p.last_name),
        Some("Byron".to_string())
    );
    assert!(store.provider(ada).and_then(|p| p.network_provider_id).is_none());
    assert_eq!(
        store.provider(grace).and_then(|p| p.network_provider_id),
        Some(grace_remote.clone())
    );

    // Still known remotely, so still a contract member.
    assert!(net.contracts()[0].rendering_provider_ids.contains(&ada_remote));
}

// ---------------------------------------------------------------------------
// 7
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contract_keeps_remote_only_members() {
    let store = MemStore::new();
    store.add_provider("1000000003", "Alan", "Turing");
    store.add_provider("1000000001", "Ada", "Lovelace");

    let net = FakeNetwork::new();
    let payer_id = net.add_payer("Blue Shield of California");
    let contracting = net.add_provider(ProviderFields::organization(
        CONTRACTING_NPI,
        "Acme Health Group",
    ));
    let alan_remote = net.add_provider(ProviderFields::individual(
        "1000000003",
        Some("Alan"),
        Some("Turing"),
    ));
    let old_remote = net.add_provider(ProviderFields::individual(
        "1000000009",
        Some("Old"),
        Some("Timer"),
    ));
    net.add_contract(ContractFields {
        contracting_provider_id: contracting,
        payer_id,
        rendering_provider_ids: vec![alan_remote.clone(), old_remote.clone()],
    });

    let settings = push_settings(250, 50);
    let report = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("push pass");

    assert_eq!(report.section("providers").unsupported, 1);
    assert_eq!(report.section("contracts").updated, 1);

    let ada_remote = net.provider_by_npi("1000000001").expect("ada created");
    let contracts = net.contracts();
    assert_eq!(contracts.len(), 1);
    let mut listed = contracts[0].rendering_provider_ids.clone();
    listed.sort();
    let mut expected = vec![alan_remote, old_remote, ada_remote.id];
    expected.sort();
    assert_eq!(listed, expected);

    let again = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("second push pass");
    assert_eq!(again.section("contracts").already_in_sync, 1);
    assert_eq!(net.count(NetOp::UpdateContract), 1);
}

// ---------------------------------------------------------------------------
// 8
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blank_npi_is_never_pushed() {
    let store = MemStore::new();
    let blank = store.add_provider("", "No", "Number");
    store.add_license(blank, "FL", date("2020-01-01"), date("2022-01-01"));
    store.add_provider("   ", "Only", "Spaces");
    store.add_provider("1000000001", "Ada", "Lovelace");

    let net = FakeNetwork::new();
    net.add_payer("Blue Shield of California");
    let settings = push_settings(250, 50);

    for _ in 0..3 {
        let report = PushReconciler::new(&net, &store, &settings)
            .run()
            .await
            .expect("push pass");
        assert_eq!(report.section("providers").attempted, 1);
    }

    assert!(net.providers().iter().all(|p| p.npi.is_some()));
    assert_eq!(net.providers().len(), 2);
    assert_eq!(net.count(NetOp::CreateProvider), 2);
    assert!(net.spans().is_empty());
    assert!(store.provider(blank).and_then(|p| p.network_provider_id).is_none());
}

// ---------------------------------------------------------------------------
// 9
// ---------------------------------------------------------------------------

#[tokio::test]
async fn in_sync_providers_count_toward_the_ceiling() {
    let store = MemStore::new();
    let net = FakeNetwork::new();
    net.add_payer("Blue Shield of California");
    for i in 1..=3 {
        let npi = format!("100000000{i}");
        store.add_provider(&npi, "First", "Last");
        net.add_provider(ProviderFields::individual(&npi, Some("First"), Some("Last")));
    }

    let err = PushReconciler::new(&net, &store, &push_settings(2, 50))
        .run()
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            SyncError::Guardrail(GuardrailViolation::TooManyOperations {
                planned: 3,
                ceiling: 2
            })
        ),
        "got {err:?}"
    );
    assert!(net.mutation_calls().is_empty());
}
