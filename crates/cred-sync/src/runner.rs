//! At-most-one-in-flight wrapper around a pass.

use std::future::Future;

use cred_db::{BeginRun, RunFinish, Store};
use cred_reconcile::SyncReport;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::SyncError;

/// Run `pass` under the `system` lease and record its outcome in `sync_runs`.
///
/// A held lease returns [`SyncError::AlreadyRunning`] without polling `pass`.
/// When recording the outcome of a failed pass also fails, the pass error
/// wins; the recording error is logged.
pub async fn run_exclusive<F>(
    store: &dyn Store,
    system: &str,
    lease_ttl_seconds: i64,
    pass: F,
) -> Result<(Uuid, SyncReport), SyncError>
where
    F: Future<Output = Result<SyncReport, SyncError>>,
{
    let run_id = match store.begin_sync_run(system, lease_ttl_seconds).await? {
        BeginRun::Started(id) => id,
        BeginRun::AlreadyRunning => {
            warn!(system, "lease held by another pass; skipping");
            return Err(SyncError::AlreadyRunning {
                system: system.to_string(),
            });
        }
    };
    info!(system, %run_id, "sync run started");

    match pass.await {
        Ok(report) => {
            let json = serde_json::to_value(&report)
                .map_err(|e| SyncError::Store(anyhow::Error::new(e).context("serialize report")))?;
            store
                .finish_sync_run(run_id, &RunFinish::succeeded(json))
                .await?;
            info!(system, %run_id, "sync run succeeded");
            Ok((run_id, report))
        }
        Err(e) => {
            error!(system, %run_id, kind = e.kind(), error = %e, "sync run failed");
            if let Err(finish_err) = store
                .finish_sync_run(run_id, &RunFinish::failed(e.to_string()))
                .await
            {
                error!(system, %run_id, error = %finish_err, "recording failed run also failed");
            }
            Err(e)
        }
    }
}
