//! # tracker
//!
//! why: keep one Progress per peer, confined to the consensus thread
//! relations: built from config.rs, holds progress.rs instances, feeds raft_log.rs maybe_commit
//! what: ProgressTracker, quorum match index and check-quorum helpers

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::config::Config;
use crate::error::Error;
use crate::progress::Progress;

/// Peer id -> replication progress.
///
/// The leader's own entry is included; its `matched` tracks the local last
/// index. Mutated only from the thread that drives the log.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    progress: HashMap<u64, Progress>,
    max_inflight: usize,
}

impl ProgressTracker {
    /// Empty tracker sized by `config`, which is validated first
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            progress: HashMap::new(),
            max_inflight: config.max_inflight_msgs,
        })
    }

    /// Start tracking `id`; an existing entry is replaced
    pub fn insert(&mut self, id: u64, matched: u64, next_idx: u64, is_learner: bool) -> &mut Progress {
        let pr = Progress::new(matched, next_idx, self.max_inflight, is_learner);
        match self.progress.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(pr);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(pr),
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<Progress> {
        self.progress.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&Progress> {
        self.progress.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Progress> {
        self.progress.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Progress)> {
        self.progress.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&u64, &mut Progress)> {
        self.progress.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.progress.is_empty()
    }

    fn voter_count(&self) -> usize {
        self.progress.values().filter(|pr| !pr.is_learner()).count()
    }

    pub fn quorum(&self) -> usize {
        self.voter_count() / 2 + 1
    }

    /// Highest index replicated on a quorum of voters
    pub fn maximal_committed_index(&self) -> u64 {
        let mut matched: Vec<u64> = self
            .progress
            .values()
            .filter(|pr| !pr.is_learner())
            .map(|pr| pr.matched())
            .collect();
        if matched.is_empty() {
            return 0;
        }
        matched.sort_unstable_by(|a, b| b.cmp(a));
        matched[self.quorum() - 1]
    }

    /// Whether a quorum of voters was heard from since the last call.
    ///
    /// Resets every peer's activity flag so the next check starts fresh.
    pub fn quorum_recently_active(&mut self, self_id: u64) -> bool {
        let quorum = self.quorum();
        let mut active = 0;
        for (&id, pr) in self.progress.iter_mut() {
            if id == self_id {
                active += usize::from(!pr.is_learner());
                continue;
            }
            if pr.recent_active() && !pr.is_learner() {
                active += 1;
            }
            pr.set_recent_active(false);
        }
        tracing::debug!(active, quorum, "check quorum");
        active >= quorum
    }

    pub fn reset_recent_active(&mut self) {
        for pr in self.progress.values_mut() {
            pr.set_recent_active(false);
        }
    }
}
