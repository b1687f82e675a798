//! # unstable
//!
//! why: hold the part of the log that has not reached durable storage yet
//! relations: owned by raft_log.rs, which falls back to storage.rs for anything older
//! what: Unstable, a bucketed tail of entries plus at most one pending snapshot

use std::collections::BTreeMap;

use crate::entry_slice::EntrySlice;
use crate::fatal;
use crate::log::{Entry, Snapshot};

/// Slots per bucket. Entries are grouped so appends allocate once per bucket
/// and stabilized buckets are dropped whole.
pub const ENTRY_BUFFER_SIZE: u64 = 1000;

type Bucket = Box<[Option<Entry>]>;

/// The not-yet-durable suffix of the log.
///
/// `first..=last` is the entry range held in memory; it is empty when
/// `last + 1 == first`. A pending snapshot, if any, covers everything
/// up to `first - 1`.
#[derive(Debug)]
pub struct Unstable {
    snapshot: Option<Snapshot>,
    /// bucket start index -> slots for `[start, start + ENTRY_BUFFER_SIZE)`
    buckets: BTreeMap<u64, Bucket>,
    first: u64,
    last: u64,
}

fn base_index(index: u64) -> u64 {
    index / ENTRY_BUFFER_SIZE * ENTRY_BUFFER_SIZE
}

fn new_bucket() -> Bucket {
    (0..ENTRY_BUFFER_SIZE).map(|_| None).collect()
}

impl Unstable {
    /// Empty tail whose first entry will be `first`
    pub fn new(first: u64) -> Self {
        if first == 0 {
            fatal!("unstable log must start at index 1 or later");
        }
        Self {
            snapshot: None,
            buckets: BTreeMap::new(),
            first,
            last: first - 1,
        }
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn len(&self) -> u64 {
        self.last + 1 - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First index of the log if a pending snapshot decides it
    pub fn maybe_first_index(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.metadata.index + 1)
    }

    /// Last index held in memory, either an entry or the pending snapshot
    pub fn maybe_last_index(&self) -> Option<u64> {
        if !self.is_empty() {
            return Some(self.last);
        }
        self.snapshot.as_ref().map(|s| s.metadata.index)
    }

    /// Term at `index` if it is answerable without storage
    pub fn maybe_term(&self, index: u64) -> Option<u64> {
        if index < self.first {
            return self
                .snapshot
                .as_ref()
                .filter(|s| s.metadata.index == index)
                .map(|s| s.metadata.term);
        }
        if index > self.last {
            return None;
        }
        Some(self.entry(index).term)
    }

    /// Pending snapshot awaiting persistence
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Mark `[first, index]` durable, provided `index` still carries `term`.
    ///
    /// A stale acknowledgement (the tail was truncated and rewritten since)
    /// is ignored.
    pub fn stable_to(&mut self, index: u64, term: u64) {
        let Some(current) = self.maybe_term(index) else {
            return;
        };
        if current != term || index < self.first {
            tracing::debug!(index, term, current, first = self.first, "ignore stale stable_to");
            return;
        }

        let limit = base_index(index + 1);
        let mut base = base_index(self.first);
        while base < limit {
            self.buckets.remove(&base);
            base += ENTRY_BUFFER_SIZE;
        }
        // release payloads already stabilized inside the bucket we keep
        if let Some(bucket) = self.buckets.get_mut(&limit) {
            for i in self.first.max(limit)..=index {
                bucket[(i - limit) as usize] = None;
            }
        }
        self.first = index + 1;
    }

    /// Drop the pending snapshot once storage has persisted it
    pub fn stable_snap_to(&mut self, index: u64) {
        if self.snapshot.as_ref().is_some_and(|s| s.metadata.index == index) {
            self.snapshot = None;
        }
    }

    /// Replace everything with `snapshot`; the tail restarts right after it
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.buckets.clear();
        self.first = snapshot.metadata.index + 1;
        self.last = snapshot.metadata.index;
        self.snapshot = Some(snapshot);
    }

    /// Append `entries`, overwriting whatever the tail held from their first index on
    pub fn truncate_and_append(&mut self, entries: EntrySlice<'_>) {
        let Some(head) = entries.first() else {
            return;
        };
        let after = head.index;

        if after == self.last + 1 {
            // plain append
        } else if after <= self.first {
            tracing::info!(after, first = self.first, "replace the unstable entries");
            self.buckets.clear();
            self.first = after;
            self.last = after - 1;
        } else if after <= self.last {
            tracing::info!(after, last = self.last, "truncate the unstable entries");
            let old_last = self.last;
            self.last = after - 1;
            self.buckets.retain(|&base, _| base < after);
            // the bucket holding `after` survives; drop its stale suffix
            let base = base_index(after);
            if let Some(bucket) = self.buckets.get_mut(&base) {
                for i in after..=old_last.min(base + ENTRY_BUFFER_SIZE - 1) {
                    bucket[(i - base) as usize] = None;
                }
            }
        } else {
            fatal!(
                "unstable append at {} leaves a gap after last index {}",
                after,
                self.last
            );
        }

        self.append(entries);
    }

    /// Entries in `[low, high)`
    pub fn slice(&self, low: u64, high: u64) -> Vec<Entry> {
        self.must_check_out_of_bounds(low, high);
        (low..high).map(|i| self.entry(i).clone()).collect()
    }

    fn append(&mut self, entries: EntrySlice<'_>) {
        for entry in entries {
            let base = base_index(entry.index);
            let bucket = self.buckets.entry(base).or_insert_with(new_bucket);
            bucket[(entry.index - base) as usize] = Some(entry.clone());
        }
        self.last += entries.len() as u64;
    }

    fn entry(&self, index: u64) -> &Entry {
        let base = base_index(index);
        match self.buckets.get(&base).and_then(|b| b[(index - base) as usize].as_ref()) {
            Some(entry) => entry,
            None => fatal!(
                "unstable entry {} missing from [{}, {}]",
                index,
                self.first,
                self.last
            ),
        }
    }

    fn must_check_out_of_bounds(&self, low: u64, high: u64) {
        if low > high {
            fatal!("invalid unstable slice {} > {}", low, high);
        }
        if low < self.first || high > self.last + 1 {
            fatal!(
                "unstable slice [{}, {}) out of bound [{}, {}]",
                low,
                high,
                self.first,
                self.last
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ConfState;

    fn ents(range: std::ops::Range<u64>, term: u64) -> Vec<Entry> {
        range.map(|i| Entry::new(term, i, vec![])).collect()
    }

    fn indexes(entries: &[Entry]) -> Vec<u64> {
        entries.iter().map(|e| e.index).collect()
    }

    #[test]
    fn new_unstable_is_empty() {
        let u = Unstable::new(5);
        assert!(u.is_empty());
        assert_eq!(u.first(), 5);
        assert_eq!(u.last(), 4);
        assert_eq!(u.maybe_first_index(), None);
        assert_eq!(u.maybe_last_index(), None);
        assert_eq!(u.maybe_term(4), None);
    }

    #[test]
    fn append_then_slice_returns_entries_unchanged() {
        let mut u = Unstable::new(5);
        let entries = vec![
            Entry::new(1, 5, b"a".to_vec()),
            Entry::new(1, 6, b"b".to_vec()),
            Entry::new(2, 7, b"c".to_vec()),
        ];
        u.truncate_and_append(EntrySlice::from(&entries));

        assert_eq!(u.len(), 3);
        assert_eq!(u.slice(5, 8), entries);
        assert_eq!(u.maybe_last_index(), Some(7));
        assert_eq!(u.maybe_term(7), Some(2));
    }

    #[test]
    fn append_before_first_replaces_everything() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..10, 1)));
        u.truncate_and_append(EntrySlice::from(&ents(4..6, 2)));

        assert_eq!(u.first(), 4);
        assert_eq!(u.last(), 5);
        assert!(u.slice(4, 6).iter().all(|e| e.term == 2));
    }

    #[test]
    fn append_mid_tail_truncates_suffix() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..10, 1)));
        u.truncate_and_append(EntrySlice::from(&ents(7..9, 3)));

        assert_eq!(u.first(), 5);
        assert_eq!(u.last(), 8);
        let got = u.slice(5, 9);
        assert_eq!(indexes(&got), vec![5, 6, 7, 8]);
        assert_eq!(got.iter().map(|e| e.term).collect::<Vec<_>>(), vec![1, 1, 3, 3]);
    }

    #[test]
    fn truncation_drops_buckets_past_new_end() {
        let mut u = Unstable::new(990);
        u.truncate_and_append(EntrySlice::from(&ents(990..2010, 1)));
        assert_eq!(u.buckets.len(), 3);

        u.truncate_and_append(EntrySlice::from(&ents(995..996, 2)));
        assert_eq!(u.buckets.len(), 1);
        assert_eq!(u.last(), 995);
    }

    #[test]
    fn truncation_clears_stale_slots_in_kept_bucket() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..10, 1)));
        u.truncate_and_append(EntrySlice::from(&ents(6..7, 2)));

        assert_eq!(u.last(), 6);
        let bucket = &u.buckets[&0];
        assert_eq!(bucket[6].as_ref().map(|e| e.term), Some(2));
        assert!(bucket[7..10].iter().all(Option::is_none));
        assert_eq!(u.maybe_term(7), None);
    }

    #[test]
    fn truncation_near_bucket_end_clears_only_that_bucket() {
        let mut u = Unstable::new(990);
        u.truncate_and_append(EntrySlice::from(&ents(990..1005, 1)));
        u.truncate_and_append(EntrySlice::from(&ents(995..996, 2)));

        assert_eq!(u.buckets.len(), 1);
        let bucket = &u.buckets[&0];
        assert!(bucket[996..].iter().all(Option::is_none));
        assert_eq!(indexes(&u.slice(990, 996)), (990..996).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "leaves a gap")]
    fn append_with_gap_is_fatal() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..7, 1)));
        u.truncate_and_append(EntrySlice::from(&ents(9..10, 1)));
    }

    #[test]
    fn stable_to_moves_first_forward() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..10, 1)));
        u.stable_to(7, 1);

        assert_eq!(u.first(), 8);
        assert_eq!(u.len(), 2);
        assert_eq!(u.maybe_term(7), None);
        assert_eq!(u.slice(8, 10).len(), 2);
    }

    #[test]
    fn stable_to_is_idempotent() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..10, 1)));
        u.stable_to(7, 1);
        u.stable_to(7, 1);

        assert_eq!(u.first(), 8);
        assert_eq!(u.last(), 9);
    }

    #[test]
    fn stable_to_with_stale_term_is_ignored() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..10, 1)));
        u.truncate_and_append(EntrySlice::from(&ents(7..8, 2)));
        u.stable_to(7, 1);

        assert_eq!(u.first(), 5);
        assert_eq!(u.last(), 7);
    }

    #[test]
    fn stable_to_frees_whole_buckets() {
        let mut u = Unstable::new(990);
        u.truncate_and_append(EntrySlice::from(&ents(990..1010, 1)));
        assert_eq!(u.buckets.len(), 2);

        u.stable_to(1001, 1);
        assert_eq!(u.buckets.len(), 1);
        assert_eq!(u.first(), 1002);
        assert_eq!(indexes(&u.slice(1002, 1010)), (1002..1010).collect::<Vec<_>>());

        u.stable_to(1009, 1);
        assert!(u.is_empty());
        u.truncate_and_append(EntrySlice::from(&ents(1010..1012, 1)));
        assert_eq!(indexes(&u.slice(1010, 1012)), vec![1010, 1011]);
    }

    #[test]
    fn restore_replaces_state_with_snapshot() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..10, 1)));
        u.restore(Snapshot::new(20, 3, ConfState::default(), vec![]));

        assert!(u.is_empty());
        assert_eq!(u.first(), 21);
        assert_eq!(u.maybe_first_index(), Some(21));
        assert_eq!(u.maybe_last_index(), Some(20));
        assert_eq!(u.maybe_term(20), Some(3));
        assert_eq!(u.maybe_term(19), None);
        assert!(u.buckets.is_empty());
    }

    #[test]
    fn stable_snap_to_only_matching_index() {
        let mut u = Unstable::new(5);
        u.restore(Snapshot::new(20, 3, ConfState::default(), vec![]));

        u.stable_snap_to(19);
        assert!(u.snapshot().is_some());
        u.stable_snap_to(20);
        assert!(u.snapshot().is_none());
        assert_eq!(u.maybe_last_index(), None);
    }

    #[test]
    fn stable_to_snapshot_index_does_nothing() {
        let mut u = Unstable::new(5);
        u.restore(Snapshot::new(20, 3, ConfState::default(), vec![]));
        u.stable_to(20, 3);
        assert_eq!(u.first(), 21);
    }

    #[test]
    #[should_panic(expected = "out of bound")]
    fn slice_out_of_bounds_is_fatal() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..8, 1)));
        u.slice(5, 9);
    }

    #[test]
    #[should_panic(expected = "invalid unstable slice")]
    fn inverted_slice_is_fatal() {
        let mut u = Unstable::new(5);
        u.truncate_and_append(EntrySlice::from(&ents(5..8, 1)));
        u.slice(7, 6);
    }
}
