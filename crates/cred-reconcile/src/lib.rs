//! cred-reconcile
//!
//! Reconciliation primitives shared by the push and pull passes.
//!
//! Architectural decisions:
//! - Entities are correlated across systems by a natural key, never by either
//!   side's primary key.
//! - Time-bounded records are reduced to a non-overlapping subset per region
//!   before anything is mirrored remotely.
//! - Every planned mutation set passes the guardrail before the first remote call.
//! - Per-entity outcomes are counted, never thrown; the report is the only output.
//!
//! Deterministic, pure logic. No IO. No remote calls. No logging.

mod diff;
mod guardrail;
mod overlap;
mod report;

pub use diff::{diff_by_key, DiffError, DiffSet};
pub use guardrail::{check_plan, GuardrailLimits, GuardrailViolation, PlanSummary};
pub use overlap::{exclude_overlaps, Envelope, Excluded, Interval, OverlapOutcome};
pub use report::{OpOutcome, ReportAggregator, SyncCounts, SyncReport};
