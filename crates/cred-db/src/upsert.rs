//! Explicit upsert column policy.
//!
//! Every column an upsert touches is listed with a [`ColumnPolicy`]. There is
//! no implicit "skip nulls" default: a column either overwrites on conflict or
//! keeps the stored value when the incoming one is null.
//!
//! Rows are positional: `UpsertRow::values[i]` belongs to `spec.columns[i]`.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPolicy {
    /// `col = excluded.col`
    Overwrite,
    /// `col = coalesce(excluded.col, table.col)`
    PreserveOnNull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertSpec {
    pub table: &'static str,
    /// Text column holding the remote id; must carry a unique constraint.
    pub conflict_key: &'static str,
    pub columns: &'static [(&'static str, ColumnPolicy)],
    /// `(column, value)` every row of this source carries. Scopes the
    /// stale-row delete and the remote-id listing.
    pub source_tag: Option<(&'static str, &'static str)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(Option<String>),
    Date(Option<NaiveDate>),
    Timestamp(Option<DateTime<Utc>>),
    Uuid(Option<Uuid>),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        match self {
            ColumnValue::Text(v) => v.is_none(),
            ColumnValue::Date(v) => v.is_none(),
            ColumnValue::Timestamp(v) => v.is_none(),
            ColumnValue::Uuid(v) => v.is_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRow {
    pub key: String,
    pub values: Vec<ColumnValue>,
}

/// One written row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: Uuid,
    pub key: String,
    /// `true` for a fresh insert, `false` when an existing row was updated.
    pub inserted: bool,
}

impl UpsertSpec {
    /// Insert column list: conflict key, declared columns, then the source tag.
    pub fn insert_columns(&self) -> Vec<&'static str> {
        let mut cols = Vec::with_capacity(self.columns.len() + 2);
        cols.push(self.conflict_key);
        cols.extend(self.columns.iter().map(|(c, _)| *c));
        if let Some((c, _)) = self.source_tag {
            cols.push(c);
        }
        cols
    }

    pub fn policy(&self, column: &str) -> Option<ColumnPolicy> {
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, p)| *p)
    }

    /// `on conflict (key) do update set ...`
    pub fn render_conflict_clause(&self) -> String {
        let mut sets: Vec<String> = self
            .columns
            .iter()
            .map(|(col, policy)| match policy {
                ColumnPolicy::Overwrite => format!("{col} = excluded.{col}"),
                ColumnPolicy::PreserveOnNull => {
                    format!("{col} = coalesce(excluded.{col}, {}.{col})", self.table)
                }
            })
            .collect();
        if let Some((col, _)) = self.source_tag {
            sets.push(format!("{col} = excluded.{col}"));
        }
        format!(
            "on conflict ({}) do update set {}",
            self.conflict_key,
            sets.join(", ")
        )
    }

    pub fn check_row(&self, row: &UpsertRow) -> Result<()> {
        if row.values.len() != self.columns.len() {
            bail!(
                "upsert row for {} has {} values, expected {}",
                self.table,
                row.values.len(),
                self.columns.len()
            );
        }
        if row.key.trim().is_empty() {
            bail!("upsert row for {} has an empty {}", self.table, self.conflict_key);
        }
        Ok(())
    }

    /// Apply this spec's conflict policy to an existing row image.
    /// Used by in-memory stores so they merge exactly like Postgres does.
    pub fn merge_into(&self, existing: &mut [ColumnValue], incoming: &[ColumnValue]) {
        for (i, (_, policy)) in self.columns.iter().enumerate() {
            let (Some(slot), Some(new)) = (existing.get_mut(i), incoming.get(i)) else {
                continue;
            };
            match policy {
                ColumnPolicy::Overwrite => *slot = new.clone(),
                ColumnPolicy::PreserveOnNull => {
                    if !new.is_null() {
                        *slot = new.clone();
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pull targets
// ---------------------------------------------------------------------------

/// Mirror of verification-system providers.
pub const VERIFIED_PROVIDERS: UpsertSpec = UpsertSpec {
    table: "verified_providers",
    conflict_key: "remote_id",
    columns: &[
        ("provider_id", ColumnPolicy::PreserveOnNull),
        ("npi", ColumnPolicy::Overwrite),
        ("first_name", ColumnPolicy::Overwrite),
        ("last_name", ColumnPolicy::Overwrite),
        ("status", ColumnPolicy::Overwrite),
        ("verified_at", ColumnPolicy::Overwrite),
    ],
    source_tag: None,
};

/// Verification-sourced rows of the shared `licenses` table. Manual
/// licenses are never touched.
pub const LICENSES: UpsertSpec = UpsertSpec {
    table: "licenses",
    conflict_key: "verification_license_id",
    columns: &[
        ("provider_id", ColumnPolicy::PreserveOnNull),
        ("state", ColumnPolicy::Overwrite),
        ("license_number", ColumnPolicy::Overwrite),
        ("issue_date", ColumnPolicy::Overwrite),
        ("expiration_date", ColumnPolicy::Overwrite),
        ("status", ColumnPolicy::Overwrite),
    ],
    source_tag: Some(("source", "verification")),
};

pub const BOARD_CERTIFICATES: UpsertSpec = UpsertSpec {
    table: "board_certificates",
    conflict_key: "remote_id",
    columns: &[
        ("provider_id", ColumnPolicy::PreserveOnNull),
        ("board_name", ColumnPolicy::Overwrite),
        ("specialty", ColumnPolicy::Overwrite),
        ("issue_date", ColumnPolicy::Overwrite),
        ("expiration_date", ColumnPolicy::Overwrite),
        ("status", ColumnPolicy::Overwrite),
    ],
    source_tag: None,
};
