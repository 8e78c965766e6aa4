//! cred-sync
//!
//! The two reconciliation passes and what they share:
//!
//! - [`push::PushReconciler`]: local providers and licenses mirrored into
//!   the credentialing network (providers, spans, contract).
//! - [`pull::PullReconciler`]: verification-system collections mirrored
//!   into local tables.
//! - [`runner::run_exclusive`]: per-system lease plus the `sync_runs` record.
//!
//! Every pass returns one `SyncReport` or one [`SyncError`]. Per-entity
//! failures live in the report; only pass-level failures are errors.

pub mod error;
pub mod mapping;
pub mod paginate;
pub mod pull;
pub mod push;
pub mod runner;

pub use error::SyncError;
pub use mapping::{CertificateStatus, LicenseStatus, Mapped};
pub use paginate::{collect_pages, PageLimits};
pub use pull::{Collection, PullReconciler};
pub use push::PushReconciler;
pub use runner::run_exclusive;

pub use cred_reconcile::SyncReport;
