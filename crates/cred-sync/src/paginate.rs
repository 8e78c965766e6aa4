//! Page collector for pull-style collections.
//!
//! Follows `next` until it is `None`, then checks the accumulated rows
//! against the remote-reported total. Nothing is written locally until this
//! returns `Ok`, so every consistency failure aborts before any write.

use std::collections::HashSet;
use std::future::Future;

use cred_remote::{Page, RemoteError};
use tracing::{debug, warn};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Allowed |reported count - accumulated count|.
    pub tolerance: u64,
    pub max_pages: usize,
}

impl PageLimits {
    pub fn new(tolerance: u64, max_pages: usize) -> Self {
        Self {
            tolerance,
            max_pages,
        }
    }
}

/// Fetch every page of `collection`.
///
/// Fails with [`SyncError::Consistency`] on a repeated cursor, more than
/// `max_pages` pages, a count drift beyond `tolerance` (against the last
/// reported count), or an empty result.
pub async fn collect_pages<T, F, Fut>(
    collection: &str,
    limits: &PageLimits,
    mut fetch: F,
) -> Result<Vec<T>, SyncError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, RemoteError>>,
{
    let mut rows: Vec<T> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut seen: HashSet<String> = HashSet::new();
    let mut reported: u64 = 0;
    let mut pages = 0usize;

    loop {
        if pages >= limits.max_pages {
            warn!(collection, pages, "page ceiling reached; aborting pull");
            return Err(SyncError::Consistency(format!(
                "{collection}: more than {} pages",
                limits.max_pages
            )));
        }

        let page = fetch(cursor.clone())
            .await
            .map_err(|e| SyncError::remote(format!("fetch {collection} page {}", pages + 1), e))?;
        pages += 1;
        reported = page.count;
        debug!(
            collection,
            page = pages,
            rows = page.results.len(),
            count = page.count,
            "page fetched"
        );
        rows.extend(page.results);

        match page.next {
            None => break,
            Some(next) => {
                if !seen.insert(next.clone()) {
                    warn!(collection, next = %next, "next pointer repeated; aborting pull");
                    return Err(SyncError::Consistency(format!(
                        "{collection}: next pointer repeated ({next})"
                    )));
                }
                cursor = Some(next);
            }
        }
    }

    let accumulated = rows.len() as u64;
    if reported.abs_diff(accumulated) > limits.tolerance {
        warn!(
            collection,
            reported, accumulated, tolerance = limits.tolerance,
            "remote count drifted during paging; aborting pull"
        );
        return Err(SyncError::Consistency(format!(
            "{collection}: remote reported {reported} rows, collected {accumulated} (tolerance {})",
            limits.tolerance
        )));
    }

    if rows.is_empty() {
        warn!(collection, "remote returned an empty collection; refusing to sync to empty");
        return Err(SyncError::Consistency(format!(
            "{collection}: remote returned no rows"
        )));
    }

    Ok(rows)
}
