//! cred-db
//!
//! Local persistence for the credentialing sync engine.
//!
//! - [`Store`] is the boundary the reconcilers consume; [`PgStore`] is the
//!   Postgres implementation.
//! - [`upsert`] makes the on-conflict behaviour of every pulled column
//!   explicit.
//! - `sync_runs` doubles as the per-system lease and the audit row of each
//!   finished pass.

pub mod model;
pub mod pg;
pub mod store;
pub mod upsert;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub use model::{
    BeginRun, LicenseRow, LicenseSource, ProviderRow, ProviderVerification, ProviderWithLicenses,
    RunFinish, SyncRunRow, SyncRunStatus,
};
pub use pg::PgStore;
pub use store::Store;
pub use upsert::{ColumnPolicy, ColumnValue, UpsertOutcome, UpsertRow, UpsertSpec};

pub const ENV_DB_URL: &str = "CRED_DATABASE_URL";

/// Connect to Postgres using CRED_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='sync_runs'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_sync_runs_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_sync_runs_table: bool,
}

/// Count sync passes currently holding a lease.
/// Used by the CLI to refuse migrations under a live pass.
pub async fn count_running_sync_runs(pool: &PgPool) -> Result<i64> {
    // No schema yet means nothing can be running.
    let st = status(pool).await?;
    if !st.has_sync_runs_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        "select count(*)::bigint from sync_runs where status = 'RUNNING'",
    )
    .fetch_one(pool)
    .await
    .context("count_running_sync_runs failed")?;

    Ok(n)
}

/// Detect a Postgres unique constraint violation by name.
/// For a unique index the reported constraint is the index name.
pub(crate) fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
