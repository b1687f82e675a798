//! # raft-core
//!
//! why: implement the replicated-log core of raft in pure, portable rust
//! relations: raft-storage supplies a Storage backend; a consensus driver owns and serializes all calls
//! what: log types, Storage contract, unstable tail, RaftLog, per-follower Progress, ReadOnly reads

pub mod config;
pub mod entry_slice;
pub mod error;
pub mod inflights;
pub mod log;
pub mod message;
pub mod progress;
pub mod raft_log;
pub mod read_only;
pub mod storage;
pub mod tracker;
pub mod unstable;

#[doc(hidden)]
pub use tracing as __tracing;

pub use config::Config;
pub use entry_slice::EntrySlice;
pub use error::{ConfigError, Error, Result, StorageError};
pub use inflights::Inflights;
pub use log::{ConfState, Entry, HardState, RaftState, Snapshot, SnapshotMetadata};
pub use message::{Message, MessageType};
pub use progress::{Progress, ProgressState};
pub use raft_log::RaftLog;
pub use read_only::{ReadIndexStatus, ReadOnly, ReadOnlyOption};
pub use storage::Storage;
pub use tracker::ProgressTracker;
pub use unstable::Unstable;
