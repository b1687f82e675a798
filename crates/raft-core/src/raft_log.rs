//! # raft_log
//!
//! why: present storage and the unstable tail as one log with commit/apply watermarks
//! relations: reads storage.rs, owns unstable.rs, driven by the consensus loop alongside progress.rs
//! what: RaftLog, log matching at the follower, commit rules, apply work queue

use std::fmt;

use crate::entry_slice::EntrySlice;
use crate::error::{Result, StorageError};
use crate::fatal;
use crate::log::{Entry, Snapshot};
use crate::storage::Storage;
use crate::unstable::Unstable;

/// The replicated log as seen by one node.
///
/// Invariant: `applied <= committed <= last_index()`, and neither watermark
/// ever moves backwards.
pub struct RaftLog<S: Storage> {
    store: S,
    unstable: Unstable,
    committed: u64,
    applied: u64,
}

impl<S: Storage> RaftLog<S> {
    /// Build a log on top of `store`; everything the store holds is treated
    /// as durable, committed watermarks start at the compaction point.
    pub fn new(store: S) -> Result<Self> {
        let first_index = store.first_index()?;
        let last_index = store.last_index()?;
        let start = first_index.saturating_sub(1);
        Ok(Self {
            store,
            unstable: Unstable::new(last_index + 1),
            committed: start,
            applied: start,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn unstable(&self) -> &Unstable {
        &self.unstable
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Follower-side append.
    ///
    /// Accepts `entries` only if the entry at `index` carries `log_term`.
    /// Conflicting local entries from the first mismatch on are replaced.
    /// Returns the index of the last new entry on success.
    pub fn maybe_append(
        &mut self,
        index: u64,
        log_term: u64,
        committed: u64,
        entries: EntrySlice<'_>,
    ) -> Option<u64> {
        if !self.match_term(index, log_term) {
            return None;
        }

        let new_last_index = index + entries.len() as u64;
        let conflict = self.find_conflict(entries);
        if conflict == 0 {
            // every entry already present
        } else if conflict <= self.committed {
            fatal!(
                "entry {} conflicts with committed entry (committed {})",
                conflict,
                self.committed
            );
        } else {
            let start = (conflict - (index + 1)) as usize;
            self.append(entries.sub(start, entries.len() - start));
        }

        self.commit_to(committed.min(new_last_index));
        Some(new_last_index)
    }

    /// Leader-side append of new entries. Returns the new last index.
    pub fn append(&mut self, entries: EntrySlice<'_>) -> u64 {
        let Some(head) = entries.first() else {
            return self.last_index();
        };

        let after = head.index - 1;
        if after < self.committed {
            fatal!(
                "append after {} is out of range [committed {}]",
                after,
                self.committed
            );
        }

        self.unstable.truncate_and_append(entries);
        self.last_index()
    }

    /// Index of the first entry whose term disagrees with the local log, or
    /// which lies past its end; 0 when every entry is already present.
    pub fn find_conflict(&self, entries: EntrySlice<'_>) -> u64 {
        let last_index = self.last_index();
        for entry in entries {
            if !self.match_term(entry.index, entry.term) {
                if entry.index <= last_index {
                    tracing::info!(
                        index = entry.index,
                        existing_term = ?self.term(entry.index).ok(),
                        conflicting_term = entry.term,
                        "found conflict"
                    );
                }
                return entry.index;
            }
        }
        0
    }

    /// Jump to `snapshot`; the unstable tail is discarded.
    ///
    /// The snapshot must not predate the commit index, otherwise `committed`
    /// would move backwards past `applied`.
    pub fn restore(&mut self, snapshot: Snapshot) {
        tracing::info!(
            log = %self,
            index = snapshot.metadata.index,
            term = snapshot.metadata.term,
            "starts to restore snapshot"
        );
        let index = snapshot.metadata.index;
        if index < self.committed {
            fatal!(
                "restore snapshot {} is below committed {}",
                index,
                self.committed
            );
        }
        self.committed = index;
        self.unstable.restore(snapshot);
    }

    /// Commit up to `index` if the local entry there was written in `term`.
    pub fn maybe_commit(&mut self, index: u64, term: u64) -> bool {
        if index > self.committed && self.zero_term_on_err_compacted(self.term(index)) == term {
            self.commit_to(index);
            return true;
        }
        false
    }

    pub fn commit_to(&mut self, committed: u64) {
        if self.committed >= committed {
            return;
        }
        let last_index = self.last_index();
        if last_index < committed {
            fatal!(
                "commit {} is out of range [last index {}]; was the log corrupted, truncated or lost?",
                committed,
                last_index
            );
        }
        self.committed = committed;
    }

    pub fn apply_to(&mut self, applied: u64) {
        if applied == 0 {
            return;
        }
        if self.committed < applied || applied < self.applied {
            fatal!(
                "applied {} is out of range [prev applied {}, committed {}]",
                applied,
                self.applied,
                self.committed
            );
        }
        self.applied = applied;
    }

    pub fn stable_to(&mut self, index: u64, term: u64) {
        self.unstable.stable_to(index, term);
    }

    pub fn stable_snap_to(&mut self, index: u64) {
        self.unstable.stable_snap_to(index);
    }

    /// Whether a candidate whose log ends at `(index, term)` is at least as
    /// up to date as this log.
    pub fn is_up_to_date(&self, index: u64, term: u64) -> bool {
        let last_term = self.last_term();
        term > last_term || (term == last_term && index >= self.last_index())
    }

    pub fn match_term(&self, index: u64, term: u64) -> bool {
        self.term(index).map(|t| t == term).unwrap_or(false)
    }

    /// Pending snapshot if one is being installed, otherwise the store's.
    pub fn snapshot(&self) -> Result<Snapshot> {
        match self.unstable.snapshot() {
            Some(snapshot) => Ok(snapshot.clone()),
            None => self.store.snapshot(),
        }
    }

    /// Up to `max` entries starting at `index`; empty past the end of the log.
    pub fn entries(&self, index: u64, max: u64) -> Result<Vec<Entry>> {
        let last_index = self.last_index();
        if index > last_index {
            return Ok(Vec::new());
        }
        self.slice(index, index.saturating_add(max).min(last_index + 1))
    }

    /// Every entry not yet persisted. These may be sent to followers before
    /// the local flush completes.
    pub fn unstable_entries(&self) -> Vec<Entry> {
        if self.unstable.is_empty() {
            return Vec::new();
        }
        self.unstable.slice(self.unstable.first(), self.unstable.last() + 1)
    }

    /// Committed entries the state machine has not applied yet.
    pub fn next_entries(&self) -> Vec<Entry> {
        let offset = (self.applied + 1).max(self.first_index());
        if self.committed < offset {
            return Vec::new();
        }
        match self.slice(offset, self.committed + 1) {
            Ok(entries) => entries,
            Err(e) => fatal!(
                "unexpected error when getting unapplied entries [{}, {}): {}",
                offset,
                self.committed + 1,
                e
            ),
        }
    }

    pub fn has_next_entries(&self) -> bool {
        let offset = (self.applied + 1).max(self.first_index());
        self.committed >= offset
    }

    pub fn first_index(&self) -> u64 {
        if let Some(index) = self.unstable.maybe_first_index() {
            return index;
        }
        match self.store.first_index() {
            Ok(index) => index,
            Err(e) => fatal!("storage first_index failed: {}", e),
        }
    }

    pub fn last_index(&self) -> u64 {
        if let Some(index) = self.unstable.maybe_last_index() {
            return index;
        }
        match self.store.last_index() {
            Ok(index) => index,
            Err(e) => fatal!("storage last_index failed: {}", e),
        }
    }

    pub fn last_term(&self) -> u64 {
        let last_index = self.last_index();
        match self.term(last_index) {
            Ok(term) => term,
            Err(e) => fatal!("unexpected error when getting the last term at {}: {}", last_index, e),
        }
    }

    /// Term of the entry at `index`.
    ///
    /// `first_index() - 1` always resolves, to the term of the compaction
    /// point. Anything older is `Compacted`; anything past the end is 0.
    pub fn term(&self, index: u64) -> Result<u64> {
        let dummy_index = self.first_index() - 1;
        if index < dummy_index {
            return Err(StorageError::Compacted);
        }
        if index > self.last_index() {
            return Ok(0);
        }

        if let Some(term) = self.unstable.maybe_term(index) {
            return Ok(term);
        }

        match self.store.term(index) {
            Ok(term) => Ok(term),
            Err(e @ (StorageError::Compacted | StorageError::Unavailable)) => Err(e),
            Err(e) => fatal!("unexpected error when getting the term of {}: {}", index, e),
        }
    }

    /// Collapse a term lookup to 0 when the entry was compacted away.
    pub fn zero_term_on_err_compacted(&self, result: Result<u64>) -> u64 {
        match result {
            Ok(term) => term,
            Err(StorageError::Compacted) => 0,
            Err(e) => fatal!("unexpected error: {}", e),
        }
    }

    /// Entries in `[low, high)`, from storage then the unstable tail.
    ///
    /// If storage returns fewer entries than asked for (it was compacted
    /// concurrently) only those are returned.
    fn slice(&self, low: u64, high: u64) -> Result<Vec<Entry>> {
        self.must_check_out_of_bounds(low, high)?;
        if low == high {
            return Ok(Vec::new());
        }

        let unstable_first = self.unstable.first();
        let mut entries = Vec::new();

        if low < unstable_first {
            let stored_high = high.min(unstable_first);
            entries = match self.store.entries(low, stored_high) {
                Ok(stored) => stored,
                Err(StorageError::Compacted) => return Err(StorageError::Compacted),
                Err(StorageError::Unavailable) => {
                    fatal!("entries[{}:{}) is unavailable from storage", low, stored_high)
                }
                Err(e) => fatal!("unexpected storage error for [{}, {}): {}", low, stored_high, e),
            };

            if (entries.len() as u64) < stored_high - low {
                return Ok(entries);
            }
        }

        if high > unstable_first {
            entries.extend(self.unstable.slice(low.max(unstable_first), high));
        }

        Ok(entries)
    }

    fn must_check_out_of_bounds(&self, low: u64, high: u64) -> Result<()> {
        if low > high {
            fatal!("invalid slice {} > {}", low, high);
        }

        let first_index = self.first_index();
        if low < first_index {
            return Err(StorageError::Compacted);
        }

        let last_index = self.last_index();
        if high > last_index + 1 {
            fatal!(
                "slice [{}, {}) out of bound [{}, {}]",
                low,
                high,
                first_index,
                last_index
            );
        }
        Ok(())
    }
}

impl<S: Storage> fmt::Display for RaftLog<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "committed={}, applied={}, unstable.first={}, unstable.len={}",
            self.committed,
            self.applied,
            self.unstable.first(),
            self.unstable.len()
        )
    }
}
