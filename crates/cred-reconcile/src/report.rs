//! Report aggregation.
//!
//! A pass records one [`OpOutcome`] per entity into a named section
//! (`providers`, `licenses`, ...). [`ReportAggregator::finish`] rolls the
//! sections up into totals. Sections merge additively, so per-provider license
//! counters can be folded in one provider at a time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result of reconciling one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpOutcome {
    Created,
    Updated,
    Deleted,
    AlreadyInSync,
    Failed,
    /// The remote system cannot perform the operation; counted, not acted upon.
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub attempted: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub already_in_sync: u64,
    pub failed: u64,
    pub unsupported: u64,
}

impl SyncCounts {
    pub fn record(&mut self, outcome: OpOutcome) {
        self.record_n(outcome, 1);
    }

    pub fn record_n(&mut self, outcome: OpOutcome, n: u64) {
        self.attempted += n;
        match outcome {
            OpOutcome::Created => self.created += n,
            OpOutcome::Updated => self.updated += n,
            OpOutcome::Deleted => self.deleted += n,
            OpOutcome::AlreadyInSync => self.already_in_sync += n,
            OpOutcome::Failed => self.failed += n,
            OpOutcome::Unsupported => self.unsupported += n,
        }
    }

    pub fn merge(&mut self, other: &SyncCounts) {
        self.attempted += other.attempted;
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.already_in_sync += other.already_in_sync;
        self.failed += other.failed;
        self.unsupported += other.unsupported;
    }

    /// `attempted` equals the sum of every outcome counter.
    pub fn is_consistent(&self) -> bool {
        self.attempted
            == self.created
                + self.updated
                + self.deleted
                + self.already_in_sync
                + self.failed
                + self.unsupported
    }
}

/// Final report of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub system: String,
    pub totals: SyncCounts,
    pub sections: BTreeMap<String, SyncCounts>,
    /// Records dropped by overlap exclusion before remote sync.
    pub overlap_excluded: u64,
    /// Remote enum-like values coerced to null because no local mapping exists.
    pub coerced_values: u64,
    /// Plans refused by the guardrail at a finer grain than the whole pass.
    pub guardrail_rejections: u64,
}

impl SyncReport {
    pub fn section(&self, name: &str) -> SyncCounts {
        self.sections.get(name).cloned().unwrap_or_default()
    }

    /// `true` when no entity failed.
    pub fn is_clean(&self) -> bool {
        self.totals.failed == 0 && self.guardrail_rejections == 0
    }
}

/// Accumulates counters over a pass.
#[derive(Clone, Debug)]
pub struct ReportAggregator {
    system: String,
    sections: BTreeMap<String, SyncCounts>,
    overlap_excluded: u64,
    coerced_values: u64,
    guardrail_rejections: u64,
}

impl ReportAggregator {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            sections: BTreeMap::new(),
            overlap_excluded: 0,
            coerced_values: 0,
            guardrail_rejections: 0,
        }
    }

    pub fn record(&mut self, section: &str, outcome: OpOutcome) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .record(outcome);
    }

    pub fn record_n(&mut self, section: &str, outcome: OpOutcome, n: u64) {
        if n == 0 {
            return;
        }
        self.sections
            .entry(section.to_string())
            .or_default()
            .record_n(outcome, n);
    }

    /// Fold a sub-pass's counters into `section`.
    pub fn absorb(&mut self, section: &str, counts: &SyncCounts) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .merge(counts);
    }

    pub fn note_overlap_excluded(&mut self, n: u64) {
        self.overlap_excluded += n;
    }

    pub fn note_coerced(&mut self, n: u64) {
        self.coerced_values += n;
    }

    pub fn note_guardrail_rejection(&mut self) {
        self.guardrail_rejections += 1;
    }

    pub fn finish(self) -> SyncReport {
        let mut totals = SyncCounts::default();
        for counts in self.sections.values() {
            totals.merge(counts);
        }
        SyncReport {
            system: self.system,
            totals,
            sections: self.sections,
            overlap_excluded: self.overlap_excluded,
            coerced_values: self.coerced_values,
            guardrail_rejections: self.guardrail_rejections,
        }
    }
}
