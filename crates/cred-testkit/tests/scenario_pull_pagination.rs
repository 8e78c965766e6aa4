//! Scenario: pull pass paging and fail-fast writes.
//!
//! # Invariants under test
//!
//! 1. Following `next` to the end accumulates exactly the concatenation of
//!    every page.
//! 2. A reported count that drifts beyond tolerance aborts before any local
//!    write.
//! 3. An empty remote collection is an error, never "synced to empty".
//! 4. A failed upsert chunk aborts the pass before the stale-row delete.
//! 5. Rows that disappear upstream are deleted on the next pass; manual rows
//!    in the same table survive.
//! 6. A plan above `max_operations` is rejected before any upsert or delete;
//!    the previously mirrored rows stay as they were.

use cred_config::PullSettings;
use cred_db::upsert::VERIFIED_PROVIDERS;
use cred_reconcile::GuardrailViolation;
use cred_remote::{Page, VerifiedLicense, VerifiedProvider};
use cred_sync::{Collection, PullReconciler, SyncError};
use cred_testkit::{date, paged, FakeVerification, MemStore};

fn pull_settings(chunk: usize) -> PullSettings {
    capped_pull_settings(chunk, 1000)
}

fn capped_pull_settings(chunk: usize, max_operations: usize) -> PullSettings {
    PullSettings {
        base_url: "http://verify.invalid/v1/".to_string(),
        token_url: "http://verify.invalid/oauth/token".to_string(),
        keys_env: Default::default(),
        page_count_tolerance: 2,
        upsert_chunk_size: chunk,
        max_pages: 100,
        max_operations,
    }
}

fn verified_provider(i: usize) -> VerifiedProvider {
    VerifiedProvider {
        id: format!("VP-{i}"),
        npi: Some(format!("20000000{i:02}")),
        first_name: Some("First".to_string()),
        last_name: Some(format!("Last{i}")),
        status: Some("verified".to_string()),
        verified_at: None,
    }
}

fn verified_license(i: usize) -> VerifiedLicense {
    VerifiedLicense {
        id: format!("VL-{i}"),
        provider_id: None,
        state: Some("FL".to_string()),
        license_number: Some(format!("ME{i}")),
        issue_date: date("2020-01-01"),
        expiration_date: date("2024-01-01"),
        status: Some("active".to_string()),
    }
}

// ---------------------------------------------------------------------------
// 1
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pages_are_concatenated() {
    let store = MemStore::new();
    let remote = FakeVerification::new();
    remote.set_provider_pages(paged((1..=5).map(verified_provider).collect(), 2));
    let settings = pull_settings(500);

    let report = PullReconciler::new(&remote, &store, &settings)
        .run(Collection::Providers)
        .await
        .expect("pull pass");

    assert_eq!(report.system, "pull-providers");
    assert_eq!(report.section("providers").created, 5);
    assert_eq!(
        remote.provider_cursors(),
        vec![None, Some("page-1".to_string()), Some("page-2".to_string())]
    );

    let mut keys: Vec<String> = store
        .mirror_rows(&VERIFIED_PROVIDERS)
        .into_iter()
        .map(|r| r.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["VP-1", "VP-2", "VP-3", "VP-4", "VP-5"]);
}

// ---------------------------------------------------------------------------
// 2
// ---------------------------------------------------------------------------

#[tokio::test]
async fn count_drift_aborts_before_any_write() {
    let store = MemStore::new();
    let remote = FakeVerification::new();
    let pages: Vec<Page<VerifiedLicense>> = paged((1..=4).map(verified_license).collect(), 2)
        .into_iter()
        .map(|mut p| {
            p.count = 9;
            p
        })
        .collect();
    remote.set_license_pages(pages);
    let settings = pull_settings(500);

    let err = PullReconciler::new(&remote, &store, &settings)
        .run(Collection::Licenses)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Consistency(ref m) if m.contains("reported 9")), "got {err:?}");
    assert_eq!(store.write_count(), 0);
    assert!(store.licenses().is_empty());
}

// ---------------------------------------------------------------------------
// 3
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_collection_is_an_error() {
    let store = MemStore::new();
    let remote = FakeVerification::new();
    remote.set_license_pages(paged(Vec::new(), 2));
    let settings = pull_settings(500);

    let err = PullReconciler::new(&remote, &store, &settings)
        .run(Collection::Licenses)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Consistency(ref m) if m.contains("no rows")), "got {err:?}");
    assert_eq!(store.write_count(), 0);
}

// ---------------------------------------------------------------------------
// 4
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_chunk_skips_stale_delete() {
    let store = MemStore::new();
    let remote = FakeVerification::new();

    remote.set_license_pages(vec![Page::single(vec![verified_license(99)])]);
    let settings = pull_settings(2);
    PullReconciler::new(&remote, &store, &settings)
        .run(Collection::Licenses)
        .await
        .expect("seed pull");

    remote.set_license_pages(paged((1..=5).map(verified_license).collect(), 5));
    store.fail_upsert_call(3);

    let err = PullReconciler::new(&remote, &store, &settings)
        .run(Collection::Licenses)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Store(_)), "got {err:?}");
    assert!(err.to_string().contains("chunk 1"), "got {err}");

    let keys: Vec<String> = store
        .licenses()
        .into_iter()
        .filter_map(|l| l.verification_license_id)
        .collect();
    assert!(keys.contains(&"VL-99".to_string()));
    assert!(keys.contains(&"VL-2".to_string()));
    assert!(!keys.contains(&"VL-3".to_string()));
}

// ---------------------------------------------------------------------------
// 5
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disappeared_rows_are_deleted_and_manual_rows_survive() {
    let store = MemStore::new();
    let ada = store.add_provider("1000000001", "Ada", "Lovelace");
    let manual = store.add_license(ada, "GA", date("2010-01-01"), None);

    let remote = FakeVerification::new();
    remote.set_license_pages(paged((1..=3).map(verified_license).collect(), 10));
    let settings = pull_settings(500);
    PullReconciler::new(&remote, &store, &settings)
        .run(Collection::Licenses)
        .await
        .expect("first pull");

    remote.set_license_pages(paged(vec![verified_license(1), verified_license(3)], 10));
    let report = PullReconciler::new(&remote, &store, &settings)
        .run(Collection::Licenses)
        .await
        .expect("second pull");

    let counts = report.section("licenses");
    assert_eq!(counts.updated, 2);
    assert_eq!(counts.deleted, 1);
    assert_eq!(counts.created, 0);

    assert!(store.license(manual).is_some());
    let pulled: Vec<String> = store
        .licenses()
        .into_iter()
        .filter_map(|l| l.verification_license_id)
        .collect();
    assert_eq!(pulled.len(), 2);
    assert!(!pulled.contains(&"VL-2".to_string()));
}

// ---------------------------------------------------------------------------
// 6
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_plan_writes_nothing() {
    let store = MemStore::new();
    let remote = FakeVerification::new();
    remote.set_license_pages(paged((1..=3).map(verified_license).collect(), 10));
    PullReconciler::new(&remote, &store, &pull_settings(500))
        .run(Collection::Licenses)
        .await
        .expect("seed pull");
    let writes_before = store.write_count();
    let upserts_before = store.upsert_call_count();

    // Three creates plus three stale deletes against a ceiling of five.
    remote.set_license_pages(paged((4..=6).map(verified_license).collect(), 10));
    let err = PullReconciler::new(&remote, &store, &capped_pull_settings(500, 5))
        .run(Collection::Licenses)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            SyncError::Guardrail(GuardrailViolation::TooManyOperations {
                planned: 6,
                ceiling: 5
            })
        ),
        "got {err:?}"
    );
    assert_eq!(store.upsert_call_count(), upserts_before);
    assert_eq!(store.write_count(), writes_before);

    let mut keys: Vec<String> = store
        .licenses()
        .into_iter()
        .filter_map(|l| l.verification_license_id)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["VL-1", "VL-2", "VL-3"]);
}
