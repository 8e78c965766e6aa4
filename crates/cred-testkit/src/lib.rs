//! cred-testkit
//!
//! In-memory doubles for the store and both remote systems, plus the
//! cross-crate scenario tests under `tests/`.

mod fake_network;
mod fake_verification;
mod mem_store;

pub use fake_network::{FakeNetwork, NetOp, ANY};
pub use fake_verification::{paged, FakeVerification};
pub use mem_store::{MemStore, MirrorRow};

use chrono::NaiveDate;

/// `YYYY-MM-DD`, `None` when malformed.
pub fn date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
