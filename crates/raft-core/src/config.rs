//! # config
//!
//! why: collect the knobs that bound replication and reads in one place
//! relations: consumed by tracker.rs (inflight window) and read_only.rs (read mode)
//! what: Config with defaults and validation

use crate::error::ConfigError;
use crate::read_only::ReadOnlyOption;

/// Tunables for the replication core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Unacknowledged append batches allowed per follower while replicating
    pub max_inflight_msgs: usize,
    /// Upper bound on entries carried by one append message
    pub max_entries_per_msg: u64,
    /// How read-index requests are confirmed
    pub read_only_option: ReadOnlyOption,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_inflight_msgs: 256,
            max_entries_per_msg: 1024,
            read_only_option: ReadOnlyOption::Safe,
        }
    }
}

impl Config {
    /// Reject configurations that would stall replication outright
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_inflight_msgs == 0 {
            return Err(ConfigError::ZeroInflight);
        }
        if self.max_entries_per_msg == 0 {
            return Err(ConfigError::ZeroEntriesPerMsg);
        }
        Ok(())
    }
}
