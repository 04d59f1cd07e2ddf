//! Ordered index of observed NSEC3 intervals.
//!
//! Keys are hash strings; a value of `None` marks a hash seen only as
//! the far end of some interval, `Some(end)` a fully known gap. The
//! whole keyspace lives in one ordered map: the wrap-around probe and
//! the predecessor lookup both need a global ordering, so the index is
//! never sharded.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

/// What an `add` did, with the linearised before-state the coordinator
/// keys its output on.
#[derive(Debug, Clone, Default)]
pub struct AddOutcome {
    pub start_existed: bool,
    pub end_existed: bool,
    pub promoted_to_full: bool,
    pub conflict: Option<Conflict>,
}

/// An interval arrived whose start is already mapped to a different end:
/// either the zone changed mid-walk or a responder is lying.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub start: String,
    pub existing_end: String,
    pub new_end: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "range starting {} already exists with a different end: existing {} | new {}",
            self.start, self.existing_end, self.new_end
        )
    }
}

pub struct ChainIndex {
    links: RwLock<BTreeMap<String, Option<String>>>,
    chains: AtomicI64,
    open_ends: AtomicI64,
    ignore_changes: bool,
}

impl ChainIndex {
    pub fn new(ignore_changes: bool) -> Self {
        Self {
            links: RwLock::new(BTreeMap::new()),
            chains: AtomicI64::new(0),
            open_ends: AtomicI64::new(0),
            ignore_changes,
        }
    }

    /// Record one observed interval. Mutations are serialised under the
    /// write lock, so the returned flags are linearisable.
    pub fn add(&self, start: &str, end: &str) -> AddOutcome {
        let mut links = self.links.write().unwrap();

        let existing = links.get(start).cloned();
        let start_existed = existing.is_some();
        let end_existed = links.contains_key(end);

        let conflict = match &existing {
            Some(Some(current)) if current != end => Some(Conflict {
                start: start.to_string(),
                existing_end: current.clone(),
                new_end: end.to_string(),
            }),
            _ => None,
        };

        let endpoint_only = matches!(existing, Some(None));
        let update = !start_existed
            || endpoint_only
            || (conflict.is_some() && self.ignore_changes);

        if !start_existed {
            self.chains.fetch_add(1, Ordering::SeqCst);
        }
        if endpoint_only {
            self.open_ends.fetch_add(-1, Ordering::SeqCst);
        }
        if update {
            links.insert(start.to_string(), Some(end.to_string()));
        }
        if !end_existed && end != start {
            self.open_ends.fetch_add(1, Ordering::SeqCst);
            links.insert(end.to_string(), None);
        }

        AddOutcome {
            start_existed,
            end_existed,
            promoted_to_full: update,
            conflict,
        }
    }

    /// Check whether a hash falls inside a known interval, returning the
    /// interval that covers it.
    ///
    /// The wrap interval (greatest start, end smaller than start) is
    /// probed first; after that the predecessor entry decides.
    pub fn is_in_range(&self, hash: &str) -> Option<(String, String)> {
        let links = self.links.read().unwrap();

        if let Some((last_start, Some(last_end))) = links.iter().next_back() {
            if last_end.as_str() < last_start.as_str()
                && (hash < last_end.as_str() || hash > last_start.as_str())
            {
                return Some((last_start.clone(), last_end.clone()));
            }
        }

        if let Some((start, Some(end))) = links
            .range::<str, _>((Bound::Unbounded, Bound::Included(hash)))
            .next_back()
        {
            if hash <= end.as_str() {
                return Some((start.clone(), end.clone()));
            }
        }

        None
    }

    /// True once every entry is a full interval and, walked in key
    /// order, the intervals chain into a single cycle around the hash
    /// ring.
    pub fn is_finished(&self) -> bool {
        if self.open_ends.load(Ordering::SeqCst) != 0 {
            return false;
        }

        let links = self.links.read().unwrap();
        if links.is_empty() {
            return false;
        }

        let mut first: Option<&str> = None;
        let mut previous_end: Option<&str> = None;

        for (start, end) in links.iter() {
            let Some(end) = end.as_deref() else {
                return false;
            };

            match previous_end {
                None => first = Some(start.as_str()),
                Some(previous) if previous != start.as_str() => return false,
                _ => {}
            }

            previous_end = Some(end);
        }

        previous_end == first
    }

    /// Number of distinct start hashes seen so far
    pub fn chains(&self) -> i64 {
        self.chains.load(Ordering::SeqCst)
    }

    /// Number of hashes seen only as an interval end
    pub fn open_ends(&self) -> i64 {
        self.open_ends.load(Ordering::SeqCst)
    }

    /// Snapshot of every entry in key order, for the verbose dump
    pub fn snapshot(&self) -> Vec<(String, Option<String>)> {
        self.links
            .read()
            .unwrap()
            .iter()
            .map(|(start, end)| (start.clone(), end.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(prefix: &str) -> String {
        // pad a short marker out to a full 32-char hash
        format!("{:0<32}", prefix)
    }

    #[test]
    fn test_simple_chain_completes() {
        let index = ChainIndex::new(false);
        // feed a 3-interval cycle in arbitrary order
        index.add(&h("b"), &h("c"));
        index.add(&h("c"), &h("a"));
        assert!(!index.is_finished());
        index.add(&h("a"), &h("b"));

        assert!(index.is_finished());
        assert_eq!(index.open_ends(), 0);
        // only the first interval arrived with an unseen start
        assert_eq!(index.chains(), 1);
    }

    #[test]
    fn test_containment() {
        let index = ChainIndex::new(false);
        index.add(&h("a"), &h("b"));
        index.add(&h("b"), &h("c"));
        index.add(&h("c"), &h("a"));

        // inside (b, c)
        let (start, end) = index.is_in_range(&h("bb")).unwrap();
        assert_eq!((start.as_str(), end.as_str()), (h("b").as_str(), h("c").as_str()));

        // inside (a, b)
        let (start, _) = index.is_in_range(&h("ab")).unwrap();
        assert_eq!(start, h("a"));

        // an exact start hash sits inside its own interval
        assert!(index.is_in_range(&h("b")).is_some());
    }

    #[test]
    fn test_wrap_around_containment() {
        let index = ChainIndex::new(false);
        index.add(&h("0f"), &h("ff"));
        index.add(&h("ff"), &h("0f"));

        // below the smallest start: covered by the wrap interval
        let (start, end) = index.is_in_range(&h("00")).unwrap();
        assert_eq!((start.as_str(), end.as_str()), (h("ff").as_str(), h("0f").as_str()));

        // above the greatest start: same interval
        assert!(index.is_in_range("vvvvvvvvvvvvvvvvvvvvvvvvvvvvvvvv").is_some());

        // in the middle of the normal interval
        assert!(index.is_in_range(&h("a")).is_some());
    }

    #[test]
    fn test_endpoint_promotion() {
        let index = ChainIndex::new(false);

        let outcome = index.add(&h("a"), &h("b"));
        assert!(!outcome.start_existed);
        assert!(!outcome.end_existed);
        assert!(outcome.promoted_to_full);
        assert_eq!(index.open_ends(), 1);

        let outcome = index.add(&h("b"), &h("c"));
        assert!(outcome.start_existed);
        assert!(outcome.promoted_to_full);
        assert_eq!(index.open_ends(), 1);
    }

    #[test]
    fn test_conflict_does_not_overwrite() {
        let index = ChainIndex::new(false);
        index.add(&h("h1"), &h("h2"));

        let outcome = index.add(&h("h1"), &h("h3"));
        assert!(outcome.conflict.is_some());
        assert_eq!(
            index.is_in_range(&h("h1")).unwrap().1,
            h("h2"),
            "existing interval must stay untouched"
        );
    }

    #[test]
    fn test_conflict_overwrites_with_ignore_changes() {
        let index = ChainIndex::new(true);
        index.add(&h("h1"), &h("h2"));

        let outcome = index.add(&h("h1"), &h("h3"));
        assert!(outcome.conflict.is_some());
        assert!(outcome.promoted_to_full);
        assert_eq!(index.is_in_range(&h("h1")).unwrap().1, h("h3"));
    }

    #[test]
    fn test_monotonic_growth() {
        let index = ChainIndex::new(false);
        index.add(&h("a"), &h("b"));
        index.add(&h("c"), &h("d"));
        index.add(&h("a"), &h("b"));

        let snapshot = index.snapshot();
        let full = snapshot.iter().filter(|(_, end)| end.is_some()).count();
        let open = snapshot.iter().filter(|(_, end)| end.is_none()).count();
        assert_eq!(full, 2);
        assert_eq!(open as i64, index.open_ends());
    }

    #[test]
    fn test_not_finished_without_cycle() {
        let index = ChainIndex::new(false);
        assert!(!index.is_finished());

        index.add(&h("a"), &h("b"));
        assert!(!index.is_finished());

        index.add(&h("b"), &h("a"));
        assert!(index.is_finished());
    }
}
