//! Overlap exclusion for time-bounded records.
//!
//! Within each group (a license's state), at most one record may cover any
//! given day once the filter has run. Selection is greedy and deterministic:
//!
//! 1. Sort the group descending by `(end, start, id)`: longest-surviving first,
//!    then latest-started, then highest id.
//! 2. Walk the sorted list keeping a running envelope `[min_start, max_end]`
//!    over accepted records.
//! 3. A fully-bounded candidate that overlaps the envelope is excluded;
//!    otherwise it is accepted and the envelope grows to cover it.
//! 4. A candidate missing either bound is always accepted and never touches
//!    the envelope.
//!
//! Ranges that merely touch (one ends on the day the next starts) do not
//! overlap. Input order does not affect the outcome.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::NaiveDate;

/// A record with an optional validity range inside a named group.
pub trait Interval {
    type Id: Ord + Clone + Debug;

    fn interval_id(&self) -> Self::Id;
    fn group(&self) -> &str;
    fn start(&self) -> Option<NaiveDate>;
    fn end(&self) -> Option<NaiveDate>;
}

/// Running cover of every accepted, fully-bounded record in a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Envelope {
    fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start < self.end && end > self.start
    }

    fn expand(&mut self, start: NaiveDate, end: NaiveDate) {
        self.start = self.start.min(start);
        self.end = self.end.max(end);
    }
}

/// A record dropped by the filter, with the envelope it collided with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Excluded<T> {
    pub item: T,
    pub envelope: Envelope,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlapOutcome<T> {
    /// Surviving records, in input order.
    pub kept: Vec<T>,
    /// Dropped records, in input order.
    pub excluded: Vec<Excluded<T>>,
}

fn sort_desc<T: Interval>(a: &T, b: &T) -> Ordering {
    (b.end(), b.start(), b.interval_id()).cmp(&(a.end(), a.start(), a.interval_id()))
}

/// Reduce `items` to a maximal non-overlapping subset per group.
///
/// O(n log n) per group.
pub fn exclude_overlaps<T: Interval>(items: Vec<T>) -> OverlapOutcome<T> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        groups.entry(item.group().to_string()).or_default().push(idx);
    }

    // decision[idx] is Some(envelope) when the record at idx is excluded.
    let mut decision: Vec<Option<Envelope>> = vec![None; items.len()];

    for indices in groups.values_mut() {
        indices.sort_by(|&a, &b| sort_desc(&items[a], &items[b]));

        let mut envelope: Option<Envelope> = None;
        for &idx in indices.iter() {
            let item = &items[idx];
            let (start, end) = match (item.start(), item.end()) {
                (Some(s), Some(e)) => (s, e),
                _ => continue,
            };

            match envelope.as_mut() {
                Some(env) if env.overlaps(start, end) => decision[idx] = Some(*env),
                Some(env) => env.expand(start, end),
                None => envelope = Some(Envelope { start, end }),
            }
        }
    }

    let mut kept = Vec::new();
    let mut excluded = Vec::new();
    for (item, dec) in items.into_iter().zip(decision) {
        match dec {
            Some(envelope) => excluded.push(Excluded { item, envelope }),
            None => kept.push(item),
        }
    }

    OverlapOutcome { kept, excluded }
}
