//! Sync guardrail.
//!
//! Validates the magnitude and shape of a planned [`DiffSet`] before any remote
//! mutation. A rejected plan performs zero remote calls; there is no partial
//! application.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::DiffSet;

/// Named, overridable ceiling for one guardrail check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailLimits {
    pub max_operations: usize,
}

impl GuardrailLimits {
    pub fn new(max_operations: usize) -> Self {
        Self { max_operations }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailViolation {
    /// create + update + delete exceeds the configured ceiling.
    TooManyOperations { planned: usize, ceiling: usize },
    /// The same key appears in more than one slot of the plan.
    DuplicateKey { key: String },
    /// Distinct keys do not match the operation count.
    KeyCountMismatch {
        distinct_keys: usize,
        operations: usize,
    },
    /// More updates than distinct keys.
    UpdatesExceedKeys { updates: usize, distinct_keys: usize },
}

impl std::fmt::Display for GuardrailViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyOperations { planned, ceiling } => write!(
                f,
                "sync plan rejected: {planned} operations exceeds ceiling {ceiling}"
            ),
            Self::DuplicateKey { key } => {
                write!(f, "sync plan rejected: key {key} planned more than once")
            }
            Self::KeyCountMismatch {
                distinct_keys,
                operations,
            } => write!(
                f,
                "sync plan rejected: {distinct_keys} distinct keys for {operations} operations"
            ),
            Self::UpdatesExceedKeys {
                updates,
                distinct_keys,
            } => write!(
                f,
                "sync plan rejected: {updates} updates exceed {distinct_keys} distinct keys"
            ),
        }
    }
}

impl std::error::Error for GuardrailViolation {}

/// Shape of an accepted plan, for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub distinct_keys: usize,
}

/// Validate `plan` against `limits`.
///
/// Checks, in order:
/// 1. total operations <= ceiling
/// 2. no key appears twice across create/update/delete, and distinct keys == op count
/// 3. updates <= distinct keys
pub fn check_plan<K, L, R>(
    plan: &DiffSet<K, L, R>,
    limits: &GuardrailLimits,
) -> Result<PlanSummary, GuardrailViolation>
where
    K: Eq + Hash + Debug,
{
    let operations = plan.op_count();
    if operations > limits.max_operations {
        return Err(GuardrailViolation::TooManyOperations {
            planned: operations,
            ceiling: limits.max_operations,
        });
    }

    let mut seen: HashSet<&K> = HashSet::with_capacity(operations);
    for k in plan.keys() {
        if !seen.insert(k) {
            return Err(GuardrailViolation::DuplicateKey {
                key: format!("{k:?}"),
            });
        }
    }

    let distinct_keys = seen.len();
    if distinct_keys != operations {
        return Err(GuardrailViolation::KeyCountMismatch {
            distinct_keys,
            operations,
        });
    }

    let updates = plan.to_update.len();
    if updates > distinct_keys {
        return Err(GuardrailViolation::UpdatesExceedKeys {
            updates,
            distinct_keys,
        });
    }

    Ok(PlanSummary {
        creates: plan.to_create.len(),
        updates,
        deletes: plan.to_delete.len(),
        distinct_keys,
    })
}
