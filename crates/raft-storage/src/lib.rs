//! # raft-storage
//!
//! why: provide a Storage backend the log core can read while compaction runs beside it
//! relations: implements raft_core::Storage, consumed by raft_core::RaftLog
//! what: MemStorage, an in-memory log + snapshot store shared behind one lock

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use raft_core::{fatal, ConfState, Entry, HardState, RaftState, Result, Snapshot, Storage, StorageError};

/// state behind the lock
///
/// `entries[0]` is a dummy entry standing for the snapshot point, so the
/// retained range is `[entries[0].index + 1, entries.last().index]`.
#[derive(Debug)]
pub struct MemStorageCore {
    raft_state: RaftState,
    entries: Vec<Entry>,
    snapshot: Snapshot,
    trigger_snap_unavailable: bool,
}

impl Default for MemStorageCore {
    fn default() -> Self {
        Self {
            raft_state: RaftState::default(),
            entries: vec![Entry::default()],
            snapshot: Snapshot::default(),
            trigger_snap_unavailable: false,
        }
    }
}

impl MemStorageCore {
    fn offset(&self) -> u64 {
        self.entries[0].index
    }

    fn first_index(&self) -> u64 {
        self.offset() + 1
    }

    fn last_index(&self) -> u64 {
        self.offset() + self.entries.len() as u64 - 1
    }

    /// persist the current term, vote and commit
    pub fn set_hard_state(&mut self, hard_state: HardState) {
        self.raft_state.hard_state = hard_state;
    }

    pub fn hard_state(&self) -> HardState {
        self.raft_state.hard_state
    }

    pub fn set_conf_state(&mut self, conf_state: ConfState) {
        self.raft_state.conf_state = conf_state;
    }

    /// replace the whole log with `snapshot`
    ///
    /// fails with `SnapshotOutOfDate` if it is not newer than what is held
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        let index = snapshot.metadata.index;
        if self.snapshot.metadata.index >= index {
            tracing::warn!(index, current = self.snapshot.metadata.index, "stale snapshot ignored");
            return Err(StorageError::SnapshotOutOfDate);
        }

        self.entries = vec![Entry::new(snapshot.metadata.term, index, Vec::new())];
        self.raft_state.hard_state.commit = self.raft_state.hard_state.commit.max(index);
        self.raft_state.conf_state = snapshot.metadata.conf_state.clone();
        self.snapshot = snapshot;
        Ok(())
    }

    /// record a snapshot of the state machine at `index`
    ///
    /// the log itself is left alone; call `compact` to discard the prefix
    pub fn create_snapshot(&mut self, index: u64, conf_state: Option<ConfState>, data: Vec<u8>) -> Result<Snapshot> {
        if index <= self.snapshot.metadata.index {
            return Err(StorageError::SnapshotOutOfDate);
        }
        if index < self.offset() {
            return Err(StorageError::Compacted);
        }
        let last_index = self.last_index();
        if index > last_index {
            fatal!("snapshot {} is out of bound lastindex({})", index, last_index);
        }

        let term = self.entries[(index - self.offset()) as usize].term;
        let conf_state = conf_state.unwrap_or_else(|| self.raft_state.conf_state.clone());
        self.snapshot = Snapshot::new(index, term, conf_state, data);
        Ok(self.snapshot.clone())
    }

    /// discard every entry before `compact_index`
    pub fn compact(&mut self, compact_index: u64) -> Result<()> {
        let offset = self.offset();
        if compact_index <= offset {
            return Err(StorageError::Compacted);
        }
        let last_index = self.last_index();
        if compact_index > last_index {
            fatal!("compact {} is out of bound lastindex({})", compact_index, last_index);
        }

        // the entry at compact_index becomes the new dummy
        let cut = (compact_index - offset) as usize;
        self.entries.drain(..cut);
        self.entries[0].data.clear();
        tracing::debug!(compact_index, first_index = self.first_index(), "compacted log");
        Ok(())
    }

    /// append entries, overwriting any conflicting suffix
    pub fn append(&mut self, entries: &[Entry]) -> Result<()> {
        let Some(head) = entries.first() else {
            return Ok(());
        };

        let first = self.first_index();
        let last_new = head.index + entries.len() as u64 - 1;
        if last_new < first {
            // everything already compacted
            return Ok(());
        }

        // skip what the compaction already covers
        let entries = if first > head.index {
            &entries[(first - head.index) as usize..]
        } else {
            entries
        };

        let start = entries[0].index;
        let last_index = self.last_index();
        if start > last_index + 1 {
            fatal!("missing log entry [last: {}, append at: {}]", last_index, start);
        }

        let keep = (start - self.offset()) as usize;
        self.entries.truncate(keep);
        self.entries.extend_from_slice(entries);
        Ok(())
    }

    /// make the next `snapshot()` call report `SnapshotTemporarilyUnavailable`
    pub fn trigger_snap_unavailable(&mut self) {
        self.trigger_snap_unavailable = true;
    }
}

/// in-memory storage
///
/// clones share the same state, so a test or a compaction thread can keep a
/// handle while a `RaftLog` owns another. readers take a shared lock, so a
/// concurrent `compact` is never observed half-done.
#[derive(Clone, Default)]
pub struct MemStorage {
    core: Arc<RwLock<MemStorageCore>>,
}

impl MemStorage {
    /// create an empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// create a storage seeded with a membership, as a fresh cluster would be
    pub fn new_with_conf_state(conf_state: ConfState) -> Self {
        let store = Self::new();
        store.wl().set_conf_state(conf_state);
        store
    }

    /// shared access
    pub fn rl(&self) -> RwLockReadGuard<'_, MemStorageCore> {
        self.core.read()
    }

    /// exclusive access
    pub fn wl(&self) -> RwLockWriteGuard<'_, MemStorageCore> {
        self.core.write()
    }
}

impl Storage for MemStorage {
    fn initial_state(&self) -> Result<RaftState> {
        Ok(self.rl().raft_state.clone())
    }

    fn entries(&self, low: u64, high: u64) -> Result<Vec<Entry>> {
        let core = self.rl();
        let offset = core.offset();
        if low <= offset {
            return Err(StorageError::Compacted);
        }
        let last_index = core.last_index();
        if high > last_index + 1 {
            fatal!("entries' hi({}) is out of bound lastindex({})", high, last_index);
        }

        let lo = (low - offset) as usize;
        let hi = (high - offset) as usize;
        Ok(core.entries[lo..hi].to_vec())
    }

    fn term(&self, index: u64) -> Result<u64> {
        let core = self.rl();
        let offset = core.offset();
        if index < offset {
            return Err(StorageError::Compacted);
        }
        core.entries
            .get((index - offset) as usize)
            .map(|e| e.term)
            .ok_or(StorageError::Unavailable)
    }

    fn first_index(&self) -> Result<u64> {
        Ok(self.rl().first_index())
    }

    fn last_index(&self) -> Result<u64> {
        Ok(self.rl().last_index())
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let mut core = self.wl();
        if core.trigger_snap_unavailable {
            core.trigger_snap_unavailable = false;
            return Err(StorageError::SnapshotTemporarilyUnavailable);
        }
        Ok(core.snapshot.clone())
    }
}
