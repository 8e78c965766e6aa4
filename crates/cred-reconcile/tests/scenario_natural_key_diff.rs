//! Scenario: Natural-Key Differ + Guardrail
//!
//! # Invariants under test
//!
//! 1. Every local-only key lands in `to_create`, every remote-only key in
//!    `to_delete`, every shared key in `to_update`, each exactly once.
//! 2. Holds for disjoint, overlapping, identical and empty key sets.
//! 3. Any plan produced by the differ passes the shape checks of the guardrail.
//! 4. The guardrail rejects plans above the ceiling and reports both numbers.
//!
//! All tests are pure in-process; no DB or network required.

use std::collections::BTreeSet;

use cred_reconcile::{check_plan, diff_by_key, GuardrailLimits, GuardrailViolation};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Local {
    npi: String,
    name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Remote {
    id: String,
    npi: String,
}

fn locals(npis: &[&str]) -> Vec<Local> {
    npis.iter()
        .map(|n| Local {
            npi: n.to_string(),
            name: format!("local-{n}"),
        })
        .collect()
}

fn remotes(npis: &[&str]) -> Vec<Remote> {
    npis.iter()
        .map(|n| Remote {
            id: format!("r-{n}"),
            npi: n.to_string(),
        })
        .collect()
}

fn assert_partition(local: &[&str], remote: &[&str]) {
    let plan = diff_by_key(
        locals(local),
        remotes(remote),
        |l| l.npi.clone(),
        |r| r.npi.clone(),
    )
    .expect("no duplicate keys");

    let l: BTreeSet<&str> = local.iter().copied().collect();
    let r: BTreeSet<&str> = remote.iter().copied().collect();

    let creates: BTreeSet<&str> = plan.to_create.iter().map(|(k, _)| k.as_str()).collect();
    let updates: BTreeSet<&str> = plan.to_update.iter().map(|(k, _, _)| k.as_str()).collect();
    let deletes: BTreeSet<&str> = plan.to_delete.iter().map(|(k, _)| k.as_str()).collect();

    assert_eq!(creates, l.difference(&r).copied().collect());
    assert_eq!(updates, l.intersection(&r).copied().collect());
    assert_eq!(deletes, r.difference(&l).copied().collect());
    assert_eq!(plan.op_count(), l.union(&r).count());

    for (k, local, remote) in &plan.to_update {
        assert_eq!(&local.npi, k);
        assert_eq!(&remote.npi, k);
    }

    let summary = check_plan(&plan, &GuardrailLimits::new(usize::MAX)).expect("shape ok");
    assert_eq!(summary.distinct_keys, plan.op_count());
}

#[test]
fn disjoint_keys() {
    assert_partition(&["1", "2"], &["3", "4", "5"]);
}

#[test]
fn overlapping_keys() {
    assert_partition(&["1", "2", "3"], &["2", "3", "4"]);
}

#[test]
fn identical_keys() {
    assert_partition(&["1", "2", "3"], &["3", "2", "1"]);
}

#[test]
fn one_side_empty() {
    assert_partition(&[], &["1", "2"]);
    assert_partition(&["1", "2"], &[]);
    assert_partition(&[], &[]);
}

#[test]
fn ordering_follows_input() {
    let plan = diff_by_key(
        locals(&["9", "1", "5"]),
        remotes(&["7", "5", "3"]),
        |l| l.npi.clone(),
        |r| r.npi.clone(),
    )
    .unwrap();

    let creates: Vec<&str> = plan.to_create.iter().map(|(k, _)| k.as_str()).collect();
    let deletes: Vec<&str> = plan.to_delete.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(creates, vec!["9", "1"]);
    assert_eq!(deletes, vec!["7", "3"]);
}

#[test]
fn guardrail_rejects_plan_above_ceiling() {
    let plan = diff_by_key(
        locals(&["1", "2", "3", "4"]),
        remotes(&["5", "6"]),
        |l| l.npi.clone(),
        |r| r.npi.clone(),
    )
    .unwrap();

    let err = check_plan(&plan, &GuardrailLimits::new(5)).unwrap_err();
    assert_eq!(
        err,
        GuardrailViolation::TooManyOperations {
            planned: 6,
            ceiling: 5,
        }
    );
}
