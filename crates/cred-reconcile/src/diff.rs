use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// Partition of two collections by a shared natural key.
///
/// - `to_create`: keys present only locally.
/// - `to_update`: keys present on both sides, paired (local, remote).
/// - `to_delete`: keys present only remotely.
///
/// Ephemeral: recomputed on every pass and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffSet<K, L, R> {
    pub to_create: Vec<(K, L)>,
    pub to_update: Vec<(K, L, R)>,
    pub to_delete: Vec<(K, R)>,
}

impl<K, L, R> DiffSet<K, L, R> {
    pub fn empty() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }

    /// Total planned operations (create + update + delete).
    pub fn op_count(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.op_count() == 0
    }

    /// Every key in the plan, creates first, then updates, then deletes.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.to_create
            .iter()
            .map(|(k, _)| k)
            .chain(self.to_update.iter().map(|(k, _, _)| k))
            .chain(self.to_delete.iter().map(|(k, _)| k))
    }

    /// Drop every entry whose key matches `pred` from all three sets.
    /// Returns how many entries were removed.
    pub fn exclude_keys(&mut self, pred: impl Fn(&K) -> bool) -> usize {
        let before = self.op_count();
        self.to_create.retain(|(k, _)| !pred(k));
        self.to_update.retain(|(k, _, _)| !pred(k));
        self.to_delete.retain(|(k, _)| !pred(k));
        before - self.op_count()
    }
}

/// Duplicate keys within one side violate the differ's precondition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffError {
    DuplicateLocalKey { key: String },
    DuplicateRemoteKey { key: String },
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateLocalKey { key } => {
                write!(f, "local collection contains key {key} more than once")
            }
            Self::DuplicateRemoteKey { key } => {
                write!(f, "remote collection contains key {key} more than once")
            }
        }
    }
}

impl std::error::Error for DiffError {}

/// Partition `local` and `remote` by natural key in O(n + m).
///
/// Output ordering is deterministic: creates and updates follow local input
/// order, deletes follow remote input order.
pub fn diff_by_key<K, L, R>(
    local: impl IntoIterator<Item = L>,
    remote: impl IntoIterator<Item = R>,
    local_key: impl Fn(&L) -> K,
    remote_key: impl Fn(&R) -> K,
) -> Result<DiffSet<K, L, R>, DiffError>
where
    K: Eq + Hash + Clone + Debug,
{
    let mut remote_order: Vec<K> = Vec::new();
    let mut remote_by_key: HashMap<K, R> = HashMap::new();
    for r in remote {
        let k = remote_key(&r);
        if remote_by_key.contains_key(&k) {
            return Err(DiffError::DuplicateRemoteKey {
                key: format!("{k:?}"),
            });
        }
        remote_order.push(k.clone());
        remote_by_key.insert(k, r);
    }

    let mut out = DiffSet::empty();
    let mut seen_local: HashSet<K> = HashSet::new();
    for l in local {
        let k = local_key(&l);
        if !seen_local.insert(k.clone()) {
            return Err(DiffError::DuplicateLocalKey {
                key: format!("{k:?}"),
            });
        }
        match remote_by_key.remove(&k) {
            Some(r) => out.to_update.push((k, l, r)),
            None => out.to_create.push((k, l)),
        }
    }

    for k in remote_order {
        if let Some(r) = remote_by_key.remove(&k) {
            out.to_delete.push((k, r));
        }
    }

    Ok(out)
}
