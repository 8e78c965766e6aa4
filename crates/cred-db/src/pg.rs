//! Postgres-backed [`Store`].

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::is_unique_constraint_violation;
use crate::model::{
    BeginRun, LicenseRow, LicenseSource, ProviderRow, ProviderVerification, ProviderWithLicenses,
    RunFinish, SyncRunRow, SyncRunStatus,
};
use crate::store::Store;
use crate::upsert::{ColumnValue, UpsertOutcome, UpsertRow, UpsertSpec};

const LEASE_INDEX: &str = "uq_sync_runs_one_running";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn provider_from_row(row: &PgRow) -> Result<ProviderRow> {
    Ok(ProviderRow {
        id: row.try_get("id")?,
        npi: row.try_get("npi")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        network_provider_id: row.try_get("network_provider_id")?,
        verification_provider_id: row.try_get("verification_provider_id")?,
        verification_status: row.try_get("verification_status")?,
        verified_at: row.try_get("verified_at")?,
    })
}

fn license_from_row(row: &PgRow) -> Result<LicenseRow> {
    Ok(LicenseRow {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        state: row.try_get("state")?,
        license_number: row.try_get("license_number")?,
        issue_date: row.try_get("issue_date")?,
        expiration_date: row.try_get("expiration_date")?,
        status: row.try_get("status")?,
        source: LicenseSource::parse(&row.try_get::<String, _>("source")?)?,
        verification_license_id: row.try_get("verification_license_id")?,
        network_span_id: row.try_get("network_span_id")?,
    })
}

fn sync_run_from_row(row: &PgRow) -> Result<SyncRunRow> {
    Ok(SyncRunRow {
        run_id: row.try_get("run_id")?,
        system: row.try_get("system")?,
        status: SyncRunStatus::parse(&row.try_get::<String, _>("status")?)?,
        started_at_utc: row.try_get("started_at_utc")?,
        finished_at_utc: row.try_get("finished_at_utc")?,
        report: row.try_get("report")?,
        error: row.try_get("error")?,
    })
}

const PROVIDER_COLUMNS: &str = "id, npi, first_name, last_name, network_provider_id, \
     verification_provider_id, verification_status, verified_at";

#[async_trait::async_trait]
impl Store for PgStore {
    async fn load_providers_with_licenses(&self) -> Result<Vec<ProviderWithLicenses>> {
        let provider_rows = sqlx::query(&format!(
            "select {PROVIDER_COLUMNS} from providers where btrim(coalesce(npi, '')) <> '' order by npi"
        ))
        .fetch_all(&self.pool)
        .await
        .context("load providers failed")?;

        let providers = provider_rows
            .iter()
            .map(provider_from_row)
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<Uuid> = providers.iter().map(|p| p.id).collect();

        let license_rows = sqlx::query(
            r#"
            select id, provider_id, state, license_number, issue_date, expiration_date,
                   status, source, verification_license_id, network_span_id
            from licenses
            where provider_id = any($1)
            order by created_at_utc, id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .context("load licenses failed")?;

        let mut by_provider: HashMap<Uuid, Vec<LicenseRow>> = HashMap::new();
        for row in &license_rows {
            let lic = license_from_row(row)?;
            if let Some(pid) = lic.provider_id {
                by_provider.entry(pid).or_default().push(lic);
            }
        }

        Ok(providers
            .into_iter()
            .map(|p| {
                let licenses = by_provider.remove(&p.id).unwrap_or_default();
                ProviderWithLicenses {
                    provider: p,
                    licenses,
                }
            })
            .collect())
    }

    async fn set_network_provider_id(
        &self,
        provider_id: Uuid,
        network_provider_id: &str,
    ) -> Result<()> {
        sqlx::query("update providers set network_provider_id = $2 where id = $1")
            .bind(provider_id)
            .bind(network_provider_id)
            .execute(&self.pool)
            .await
            .context("set_network_provider_id failed")?;
        Ok(())
    }

    async fn set_license_span_id(&self, license_id: Uuid, span_id: Option<&str>) -> Result<()> {
        sqlx::query("update licenses set network_span_id = $2 where id = $1")
            .bind(license_id)
            .bind(span_id)
            .execute(&self.pool)
            .await
            .context("set_license_span_id failed")?;
        Ok(())
    }

    async fn load_providers(&self) -> Result<Vec<ProviderRow>> {
        let rows = sqlx::query(&format!(
            "select {PROVIDER_COLUMNS} from providers order by id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("load_providers failed")?;
        rows.iter().map(provider_from_row).collect()
    }

    async fn pulled_remote_ids(&self, spec: &UpsertSpec) -> Result<Vec<String>> {
        let rows = match spec.source_tag {
            Some((col, value)) => {
                sqlx::query(&format!(
                    "select {} as key from {} where {col} = $1",
                    spec.conflict_key, spec.table
                ))
                .bind(value)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "select {} as key from {} where {} is not null",
                    spec.conflict_key, spec.table, spec.conflict_key
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .with_context(|| format!("pulled_remote_ids failed for {}", spec.table))?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("key").map_err(anyhow::Error::from))
            .collect()
    }

    async fn upsert_rows(
        &self,
        spec: &UpsertSpec,
        rows: &[UpsertRow],
    ) -> Result<Vec<UpsertOutcome>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        for row in rows {
            spec.check_row(row)?;
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "insert into {} ({}) ",
            spec.table,
            spec.insert_columns().join(", ")
        ));
        qb.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.key.clone());
            for v in &row.values {
                match v {
                    ColumnValue::Text(x) => {
                        b.push_bind(x.clone());
                    }
                    ColumnValue::Date(x) => {
                        b.push_bind(*x);
                    }
                    ColumnValue::Timestamp(x) => {
                        b.push_bind(*x);
                    }
                    ColumnValue::Uuid(x) => {
                        b.push_bind(*x);
                    }
                }
            }
            if let Some((_, tag)) = spec.source_tag {
                b.push_bind(tag);
            }
        });
        qb.push(" ");
        qb.push(spec.render_conflict_clause());
        qb.push(format!(
            " returning id, {} as key, (xmax = 0) as inserted",
            spec.conflict_key
        ));

        let written = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("upsert into {} failed", spec.table))?;

        written
            .iter()
            .map(|r| -> Result<UpsertOutcome> {
                Ok(UpsertOutcome {
                    id: r.try_get("id")?,
                    key: r.try_get("key")?,
                    inserted: r.try_get("inserted")?,
                })
            })
            .collect()
    }

    async fn delete_stale(&self, spec: &UpsertSpec, keep_ids: &[Uuid]) -> Result<u64> {
        let res = match spec.source_tag {
            Some((col, value)) => {
                sqlx::query(&format!(
                    "delete from {} where {col} = $2 and not (id = any($1))",
                    spec.table
                ))
                .bind(keep_ids)
                .bind(value)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "delete from {} where not (id = any($1))",
                    spec.table
                ))
                .bind(keep_ids)
                .execute(&self.pool)
                .await
            }
        }
        .with_context(|| format!("delete_stale failed for {}", spec.table))?;
        Ok(res.rows_affected())
    }

    async fn refresh_provider_verification(
        &self,
        updates: &[ProviderVerification],
    ) -> Result<u64> {
        let mut n = 0;
        for u in updates {
            let res = sqlx::query(
                r#"
                update providers
                set verification_provider_id = $2,
                    verification_status = $3,
                    verified_at = $4
                where id = $1
                "#,
            )
            .bind(u.provider_id)
            .bind(&u.verification_provider_id)
            .bind(&u.status)
            .bind(u.verified_at)
            .execute(&self.pool)
            .await
            .context("refresh_provider_verification failed")?;
            n += res.rows_affected();
        }
        Ok(n)
    }

    async fn clear_provider_verification_except(&self, keep: &[Uuid]) -> Result<u64> {
        let res = sqlx::query(
            r#"
            update providers
            set verification_provider_id = null,
                verification_status = null,
                verified_at = null
            where not (id = any($1))
              and (verification_provider_id is not null
                   or verification_status is not null
                   or verified_at is not null)
            "#,
        )
        .bind(keep)
        .execute(&self.pool)
        .await
        .context("clear_provider_verification_except failed")?;
        Ok(res.rows_affected())
    }

    async fn begin_sync_run(&self, system: &str, ttl_seconds: i64) -> Result<BeginRun> {
        if ttl_seconds <= 0 {
            return Err(anyhow!("lease ttl_seconds must be > 0"));
        }

        sqlx::query(
            r#"
            update sync_runs
            set status = 'ABANDONED',
                finished_at_utc = now(),
                error = 'lease expired'
            where system = $1
              and status = 'RUNNING'
              and started_at_utc < now() - make_interval(secs => $2)
            "#,
        )
        .bind(system)
        .bind(ttl_seconds as f64)
        .execute(&self.pool)
        .await
        .context("expire stale sync runs failed")?;

        let run_id = Uuid::new_v4();
        let res = sqlx::query(
            r#"
            insert into sync_runs (run_id, system, status, started_at_utc)
            values ($1, $2, 'RUNNING', now())
            "#,
        )
        .bind(run_id)
        .bind(system)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(BeginRun::Started(run_id)),
            Err(e) => {
                if is_unique_constraint_violation(&e, LEASE_INDEX) {
                    return Ok(BeginRun::AlreadyRunning);
                }
                Err(anyhow::Error::new(e).context("begin_sync_run insert failed"))
            }
        }
    }

    async fn finish_sync_run(&self, run_id: Uuid, finish: &RunFinish) -> Result<()> {
        let res = sqlx::query(
            r#"
            update sync_runs
            set status = $2,
                finished_at_utc = now(),
                report = $3,
                error = $4
            where run_id = $1
              and status = 'RUNNING'
            "#,
        )
        .bind(run_id)
        .bind(finish.status.as_str())
        .bind(&finish.report)
        .bind(&finish.error)
        .execute(&self.pool)
        .await
        .context("finish_sync_run failed")?;

        if res.rows_affected() != 1 {
            return Err(anyhow!(
                "finish_sync_run: run {run_id} is not RUNNING (lease expired?)"
            ));
        }
        Ok(())
    }

    async fn latest_sync_run(&self, system: &str) -> Result<Option<SyncRunRow>> {
        let row = sqlx::query(
            r#"
            select run_id, system, status, started_at_utc, finished_at_utc, report, error
            from sync_runs
            where system = $1
            order by started_at_utc desc
            limit 1
            "#,
        )
        .bind(system)
        .fetch_optional(&self.pool)
        .await
        .context("latest_sync_run failed")?;

        row.as_ref().map(sync_run_from_row).transpose()
    }
}
