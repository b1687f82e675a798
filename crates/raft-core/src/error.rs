//! # error
//!
//! why: separate the recoverable storage misses from invariant violations
//! relations: returned by storage.rs and raft_log.rs, config errors from config.rs
//! what: StorageError, ConfigError, Error, Result, the fatal! macro

use thiserror::Error;

/// Errors a `Storage` backend may report. Callers match on these to decide
/// between falling back to a snapshot, retrying, or giving up.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The requested index predates the retained history.
    #[error("requested index is unavailable due to compaction")]
    Compacted,

    /// The snapshot offered is older than the one already held.
    #[error("requested index is older than the existing snapshot")]
    SnapshotOutOfDate,

    /// The index is in range but the entry is missing.
    #[error("requested entry at index is unavailable")]
    Unavailable,

    /// A snapshot is being generated; ask again later.
    #[error("snapshot is temporarily unavailable")]
    SnapshotTemporarilyUnavailable,
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_inflight_msgs must be greater than 0")]
    ZeroInflight,

    #[error("max_entries_per_msg must be greater than 0")]
    ZeroEntriesPerMsg,
}

/// Umbrella error for callers that do not care which layer failed.
///
/// Returned by `ProgressTracker::new` when its config does not validate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {source}")]
    Storage {
        #[from]
        source: StorageError,
    },

    #[error("config error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
}

/// Result type for storage lookups.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Logs the violated invariant and then aborts the consensus thread.
///
/// Reserved for states that mean the log or its watermarks are already
/// inconsistent; continuing would risk diverging replicas.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {{
        $crate::__tracing::error!($($arg)+);
        panic!($($arg)+)
    }};
}
