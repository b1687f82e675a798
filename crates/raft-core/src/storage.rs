//! # storage
//!
//! why: let the log reach entries the in-memory tail has already handed to disk
//! relations: consulted by raft_log.rs; implemented by raft-storage (MemStorage) or a durable engine
//! what: Storage trait

use crate::error::Result;
use crate::log::{Entry, RaftState, Snapshot};

/// trait for durable log and snapshot backends
///
/// implementations must honor the error taxonomy exactly:
/// - `Compacted` when the index predates retained history
/// - `Unavailable` when the index is in range but the entry is missing
/// - `SnapshotTemporarilyUnavailable` instead of blocking while a snapshot is built
///
/// methods take `&self`; a backend shared with a compaction thread must make
/// sure readers never observe a half-applied compaction.
pub trait Storage {
    /// hard state and membership recorded at the last restart point
    fn initial_state(&self) -> Result<RaftState>;

    /// entries in `[low, high)`
    fn entries(&self, low: u64, high: u64) -> Result<Vec<Entry>>;

    /// term of the entry at `index`; the compaction point itself must resolve
    fn term(&self, index: u64) -> Result<u64>;

    /// index of the oldest retained entry
    fn first_index(&self) -> Result<u64>;

    /// index of the newest entry
    fn last_index(&self) -> Result<u64>;

    /// most recent snapshot
    fn snapshot(&self) -> Result<Snapshot>;
}
