//! Scenario: full push pass against an in-memory network.
//!
//! # Invariants under test
//!
//! 1. Providers are correlated by NPI: matching-but-different providers are
//!    updated, matching-and-equal are counted already-in-sync, local-only are
//!    created, remote-only are counted unsupported and left untouched.
//! 2. The contracting provider is created once and never diffed as a
//!    rendering provider.
//! 3. Overlapping same-state licenses are reduced before spans are created:
//!    FL A(2000..2009), B(2008..2011), C(2009..2010) yield exactly one span (B).
//! 4. Each created span id is persisted on its license.
//! 5. The contract lists every rendering provider known remotely.
//! 6. A second pass over unchanged data performs zero remote mutations.

use cred_config::{ContractingProviderSettings, PushSettings};
use cred_reconcile::SyncCounts;
use cred_remote::ProviderFields;
use cred_sync::PushReconciler;
use cred_testkit::{date, FakeNetwork, MemStore};

const CONTRACTING_NPI: &str = "1999999999";

fn push_settings() -> PushSettings {
    PushSettings {
        base_url: "http://network.invalid/api/".to_string(),
        keys_env: Default::default(),
        contracting_provider: ContractingProviderSettings {
            npi: CONTRACTING_NPI.to_string(),
            organization_name: "Acme Health Group".to_string(),
        },
        payer_search: "Blue Shield".to_string(),
        max_provider_operations: 250,
        max_span_operations_per_provider: 50,
    }
}

#[tokio::test]
async fn push_pass_reconciles_providers_spans_and_contract() {
    let store = MemStore::new();
    let ada = store.add_provider("1000000001", "Ada", "Lovelace");
    let lic_a = store.add_license(ada, "FL", date("2000-01-01"), date("2009-01-01"));
    let lic_b = store.add_license(ada, "FL", date("2008-01-01"), date("2011-01-01"));
    let lic_c = store.add_license(ada, "FL", date("2009-01-01"), date("2010-01-01"));
    let lic_ga = store.add_license(ada, "ga", date("2015-01-01"), None);

    let grace = store.add_provider("1000000002", "Grace", "Hopper");
    let lic_tx = store.add_license(grace, "TX", date("2019-01-01"), date("2025-01-01"));

    store.add_provider("1000000003", "Alan", "Turing");

    let net = FakeNetwork::new();
    let payer_id = net.add_payer("Blue Shield of California");
    let grace_remote = net.add_provider(ProviderFields::individual(
        "1000000002",
        Some("Grace"),
        Some("Hoper"),
    ));
    let alan_remote = net.add_provider(ProviderFields::individual(
        "1000000003",
        Some("Alan"),
        Some("Turing"),
    ));
    net.add_provider(ProviderFields::individual(
        "1000000009",
        Some("Old"),
        Some("Timer"),
    ));

    let settings = push_settings();
    let report = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("push pass");

    // 1
    assert_eq!(
        report.section("providers"),
        SyncCounts {
            attempted: 4,
            created: 1,
            updated: 1,
            deleted: 0,
            already_in_sync: 1,
            failed: 0,
            unsupported: 1,
        }
    );
    assert_eq!(
        net.provider_by_npi("1000000002").and_then(|p| p.last_name),
        Some("Hopper".to_string())
    );
    assert!(net.provider_by_npi("1000000009").is_some());

    let ada_remote = net.provider_by_npi("1000000001").expect("ada created remotely");
    assert_eq!(
        store.provider(ada).and_then(|p| p.network_provider_id),
        Some(ada_remote.id.clone())
    );
    assert_eq!(
        store.provider(grace).and_then(|p| p.network_provider_id),
        Some(grace_remote.clone())
    );

    // 2
    let contracting = net
        .provider_by_npi(CONTRACTING_NPI)
        .expect("contracting provider created");
    assert_eq!(
        contracting.organization_name.as_deref(),
        Some("Acme Health Group")
    );
    assert_eq!(report.section("contracting_provider").created, 1);

    // 3 + 4
    assert_eq!(report.overlap_excluded, 2);
    assert_eq!(report.section("licenses").created, 3);

    let ada_spans = net.spans_for(&ada_remote.id);
    assert_eq!(ada_spans.len(), 2);
    let fl = ada_spans
        .iter()
        .find(|s| s.region.as_deref() == Some("FL"))
        .expect("FL span");
    assert_eq!(fl.start_date, date("2008-01-01"));
    assert_eq!(fl.end_date, date("2011-01-01"));
    assert_eq!(fl.contracting_provider_id, contracting.id);
    assert_eq!(fl.payer_id, payer_id);
    assert!(ada_spans
        .iter()
        .any(|s| s.region.as_deref() == Some("GA") && s.end_date.is_none()));

    assert_eq!(
        store.license(lic_b).and_then(|l| l.network_span_id),
        Some(fl.id.clone())
    );
    assert!(store.license(lic_ga).and_then(|l| l.network_span_id).is_some());
    assert!(store.license(lic_a).and_then(|l| l.network_span_id).is_none());
    assert!(store.license(lic_c).and_then(|l| l.network_span_id).is_none());
    assert!(store.license(lic_tx).and_then(|l| l.network_span_id).is_some());

    // 5
    let contracts = net.contracts();
    assert_eq!(contracts.len(), 1);
    let mut expected = vec![ada_remote.id.clone(), grace_remote, alan_remote];
    expected.sort();
    let mut listed = contracts[0].rendering_provider_ids.clone();
    listed.sort();
    assert_eq!(listed, expected);
    assert_eq!(report.section("contracts").created, 1);

    assert_eq!(report.totals.attempted, 9);
    assert!(report.totals.is_consistent());
    assert!(report.is_clean());

    // 6
    let mutations_before = net.mutation_calls().len();
    let again = PushReconciler::new(&net, &store, &settings)
        .run()
        .await
        .expect("second push pass");
    assert_eq!(net.mutation_calls().len(), mutations_before);
    assert_eq!(again.section("providers").already_in_sync, 3);
    assert_eq!(again.section("providers").unsupported, 1);
    assert_eq!(again.section("licenses").already_in_sync, 3);
    assert_eq!(again.section("contracting_provider").already_in_sync, 1);
    assert_eq!(again.section("contracts").already_in_sync, 1);
    assert_eq!(again.overlap_excluded, 2);
}
