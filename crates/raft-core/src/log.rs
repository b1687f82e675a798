//! # log
//!
//! why: define the units the replicated log is made of
//! relations: stored by unstable.rs and storage.rs, viewed through entry_slice.rs, carried by message.rs
//! what: Entry, Snapshot, SnapshotMetadata, HardState, ConfState, RaftState

use serde::{Deserialize, Serialize};

/// A single entry in the replicated log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// The term when this entry was created
    pub term: u64,
    /// The index of this entry in the log (1-indexed)
    pub index: u64,
    /// Opaque command bytes for the state machine
    pub data: Vec<u8>,
}

impl Entry {
    /// Create a new log entry
    pub fn new(term: u64, index: u64, data: Vec<u8>) -> Self {
        Self { term, index, data }
    }
}

/// Voters and learners at the point a snapshot was taken
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfState {
    pub voters: Vec<u64>,
    pub learners: Vec<u64>,
}

impl ConfState {
    pub fn new(voters: Vec<u64>, learners: Vec<u64>) -> Self {
        Self { voters, learners }
    }
}

/// Position of the compacted prefix `[1, index]` a snapshot stands for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub index: u64,
    pub term: u64,
    pub conf_state: ConfState,
}

/// A compacted log prefix plus the state machine image it produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub data: Vec<u8>,
}

impl Snapshot {
    pub fn new(index: u64, term: u64, conf_state: ConfState, data: Vec<u8>) -> Self {
        Self {
            metadata: SnapshotMetadata { index, term, conf_state },
            data,
        }
    }

    /// An index of 0 means no snapshot has ever been taken
    pub fn is_empty(&self) -> bool {
        self.metadata.index == 0
    }
}

/// Term, vote and commit as they must survive a restart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub vote: u64,
    pub commit: u64,
}

/// What a storage backend reports on startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaftState {
    pub hard_state: HardState,
    pub conf_state: ConfState,
}
