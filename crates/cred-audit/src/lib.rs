//! cred-audit
//!
//! Append-only JSON Lines log of finished sync passes, one record per pass.
//! With the hash chain enabled each record carries `hash_prev` / `hash_self`
//! so any edit, deletion or reordering is detectable with
//! [`verify_hash_chain`].
//!
//! The log is opened with [`AuditWriter::open`], which resumes the chain from
//! the last record already on disk; separate CLI invocations therefore extend
//! one continuous chain.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Namespace for deterministic record ids.
const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c1b_0e55_2f0a_4d4e_9f61_53a5_c0de_a0d1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    /// Lease held by another pass; nothing was attempted.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub record_id: Uuid,
    /// `None` when the pass never obtained a lease.
    pub run_id: Option<Uuid>,
    pub system: String,
    pub ts_utc: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub config_hash: Option<String>,
    /// Sync report on success, `{"error": ...}` otherwise.
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    records: u64,
}

impl AuditWriter {
    /// Open (or create) the log at `path`, resuming the hash chain from its
    /// last record. Parent dirs are created.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        let mut last_hash = None;
        let mut records = 0u64;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("read audit log {:?}", path))?;
            for (i, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let rec: RunRecord = serde_json::from_str(trimmed)
                    .with_context(|| format!("parse audit record at line {}", i + 1))?;
                last_hash = rec.hash_self;
                records += 1;
            }
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of records in the log, including those present before `open`.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn append(
        &mut self,
        run_id: Option<Uuid>,
        system: &str,
        outcome: RunOutcome,
        config_hash: Option<&str>,
        payload: Value,
    ) -> Result<RunRecord> {
        let record_id = derive_record_id(self.last_hash.as_deref(), system, self.records);

        let mut rec = RunRecord {
            record_id,
            run_id,
            system: system.to_string(),
            ts_utc: Utc::now(),
            outcome,
            config_hash: config_hash.map(str::to_string),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            rec.hash_prev = self.last_hash.clone();
            let h = compute_record_hash(&rec)?;
            rec.hash_self = Some(h.clone());
            self.last_hash = Some(h);
        }

        let line = canonical_json_line(&rec)?;
        append_line(&self.path, &line)?;
        self.records += 1;

        Ok(rec)
    }
}

/// `record_id` = UUIDv5 over (previous hash, system, sequence). No RNG.
fn derive_record_id(prev_hash: Option<&str>, system: &str, seq: u64) -> Uuid {
    let name = format!("{}|{}|{}", prev_hash.unwrap_or("GENESIS"), system, seq);
    Uuid::new_v5(&RECORD_ID_NAMESPACE, name.as_bytes())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Keys sorted at every depth, compact. One record == one line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit record failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash over the canonical record with `hash_self` cleared.
pub fn compute_record_hash(rec: &RunRecord) -> Result<String> {
    let mut clone = rec.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] over in-memory JSONL.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let rec: RunRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit record at line {}", i + 1))?;
        count += 1;

        if rec.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, rec.hash_prev
                ),
            });
        }

        if let Some(claimed) = rec.hash_self.as_deref() {
            let recomputed = compute_record_hash(&rec)?;
            if claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed, recomputed
                    ),
                });
            }
        }

        prev_hash = rec.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}
