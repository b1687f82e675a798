//! # progress
//!
//! why: decide, per follower, what the leader may send next and how acks move that forward
//! relations: owns inflights.rs, grouped by tracker.rs, fed by message.rs responses
//! what: ProgressState, Progress and its reactions to append/heartbeat/snapshot/unreachable events

use std::fmt;

use crate::inflights::Inflights;
use crate::message::Message;

/// Replication mode for one follower
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressState {
    /// One append at a time until the follower's log position is known
    #[default]
    Probe,
    /// Pipelined appends bounded by the inflight window
    Replicate,
    /// A snapshot is being transferred; no appends are sent
    Snapshot,
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressState::Probe => write!(f, "Probe"),
            ProgressState::Replicate => write!(f, "Replicate"),
            ProgressState::Snapshot => write!(f, "Snapshot"),
        }
    }
}

/// A follower's replication progress as the leader sees it.
///
/// Invariant: `matched < next_idx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    matched: u64,
    next_idx: u64,
    state: ProgressState,
    paused: bool,
    pending_snapshot: u64,
    recent_active: bool,
    inflights: Inflights,
    is_learner: bool,
}

impl Progress {
    pub fn new(matched: u64, next_idx: u64, max_inflight: usize, is_learner: bool) -> Self {
        Self {
            matched,
            next_idx,
            state: ProgressState::Probe,
            paused: false,
            pending_snapshot: 0,
            recent_active: false,
            inflights: Inflights::new(max_inflight),
            is_learner,
        }
    }

    pub fn matched(&self) -> u64 {
        self.matched
    }

    pub fn next_idx(&self) -> u64 {
        self.next_idx
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn pending_snapshot(&self) -> u64 {
        self.pending_snapshot
    }

    pub fn recent_active(&self) -> bool {
        self.recent_active
    }

    pub fn set_recent_active(&mut self, active: bool) {
        self.recent_active = active;
    }

    pub fn is_learner(&self) -> bool {
        self.is_learner
    }

    pub fn inflights(&self) -> &Inflights {
        &self.inflights
    }

    /// The driver pushes the last index of every batch it pipelines
    pub fn inflights_mut(&mut self) -> &mut Inflights {
        &mut self.inflights
    }

    fn reset_state(&mut self, state: ProgressState) {
        tracing::debug!(from = %self.state, to = %state, progress = %self, "progress state change");
        self.state = state;
        self.paused = false;
        self.pending_snapshot = 0;
        self.inflights.clear();
    }

    pub fn become_probe(&mut self) {
        // a finished snapshot already covers everything up to pending_snapshot
        let next_idx = if self.state == ProgressState::Snapshot {
            (self.matched + 1).max(self.pending_snapshot + 1)
        } else {
            self.matched + 1
        };
        self.reset_state(ProgressState::Probe);
        self.next_idx = next_idx;
    }

    pub fn become_replicate(&mut self) {
        self.reset_state(ProgressState::Replicate);
        self.next_idx = self.matched + 1;
    }

    pub fn become_snapshot(&mut self, snapshot_index: u64) {
        self.reset_state(ProgressState::Snapshot);
        self.pending_snapshot = snapshot_index;
    }

    /// Record an ack for `index`. Returns whether `matched` advanced.
    pub fn maybe_update(&mut self, index: u64) -> bool {
        let updated = if self.matched < index {
            self.matched = index;
            self.resume();
            true
        } else {
            false
        };
        if self.next_idx <= index {
            self.next_idx = index + 1;
        }
        updated
    }

    /// Entries up to `last` were just sent; the next batch starts after them
    pub fn optimistic_update(&mut self, last: u64) {
        self.next_idx = last + 1;
    }

    /// React to a rejection of the append at `rejected`; `last` is the
    /// follower's reported last index. Returns false for stale rejections.
    pub fn maybe_decrease(&mut self, rejected: u64, last: u64) -> bool {
        if self.state == ProgressState::Replicate {
            if rejected <= self.matched {
                return false;
            }
            self.next_idx = self.matched + 1;
            return true;
        }

        // only the probe just sent can be rejected
        if self.next_idx.checked_sub(1) != Some(rejected) {
            return false;
        }

        // `last` is the follower's hint and may be anything
        self.next_idx = rejected.min(last.saturating_add(1)).max(1);
        self.resume();
        true
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Whether the leader must hold off sending to this follower
    pub fn is_paused(&self) -> bool {
        match self.state {
            ProgressState::Probe => self.paused,
            ProgressState::Replicate => self.inflights.full(),
            ProgressState::Snapshot => true,
        }
    }

    pub fn snapshot_failure(&mut self) {
        self.pending_snapshot = 0;
    }

    /// The follower caught up past the snapshot through normal appends
    pub fn need_snapshot_abort(&self) -> bool {
        self.state == ProgressState::Snapshot && self.matched >= self.pending_snapshot
    }

    /// Consume an append response. Returns whether the progress changed.
    pub fn handle_append_response(&mut self, m: &Message) -> bool {
        self.recent_active = true;

        if m.reject {
            tracing::debug!(from = m.from, rejected = m.index, hint = m.reject_hint, "append rejected");
            if self.maybe_decrease(m.index, m.reject_hint) {
                if self.state == ProgressState::Replicate {
                    self.become_probe();
                }
                return true;
            }
            return false;
        }

        if !self.maybe_update(m.index) {
            return false;
        }
        match self.state {
            ProgressState::Probe => self.become_replicate(),
            ProgressState::Snapshot => {
                if self.need_snapshot_abort() {
                    tracing::debug!(
                        from = m.from,
                        pending_snapshot = self.pending_snapshot,
                        "snapshot aborted, resumed sending replication messages"
                    );
                    self.become_probe();
                }
            }
            ProgressState::Replicate => self.inflights.pop_to(m.index),
        }
        true
    }

    /// Consume a heartbeat response.
    ///
    /// A full window gives up its oldest slot so a lost append ack cannot
    /// stall the pipeline for good.
    pub fn handle_heartbeat_response(&mut self, _m: &Message) {
        self.recent_active = true;
        self.resume();

        if self.state == ProgressState::Replicate && self.inflights.full() {
            self.inflights.pop_first_one();
        }
    }

    /// Consume the outcome of a snapshot transfer.
    pub fn handle_snap_status(&mut self, m: &Message) {
        if self.state != ProgressState::Snapshot {
            return;
        }

        if m.reject {
            self.snapshot_failure();
            tracing::debug!(from = m.from, progress = %self, "snapshot failed");
        } else {
            tracing::debug!(from = m.from, progress = %self, "snapshot succeeded");
        }
        self.become_probe();
        // wait for a heartbeat response before probing again
        self.pause();
    }

    /// The transport could not reach this follower.
    pub fn handle_unreachable(&mut self) {
        if self.state == ProgressState::Replicate {
            self.become_probe();
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "next = {}, match = {}, state = {}, waiting = {}, pending_snapshot = {}",
            self.next_idx,
            self.matched,
            self.state,
            self.is_paused(),
            self.pending_snapshot
        )
    }
}
