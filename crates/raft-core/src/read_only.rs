//! # read_only
//!
//! why: serve linearizable reads once a quorum reconfirms leadership via heartbeat
//! relations: driven by the same heartbeat round trip progress.rs uses for recent_active
//! what: ReadOnlyOption, ReadIndexStatus, ReadOnly queue of pending read-index requests

use std::collections::{HashMap, HashSet, VecDeque};

use crate::fatal;
use crate::message::Message;

/// How the leader confirms it may serve a read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadOnlyOption {
    /// Confirm leadership with a quorum of heartbeat acks
    #[default]
    Safe,
    /// Trust the leader lease; depends on bounded clock drift
    LeaseBased,
}

/// A read waiting for its heartbeat quorum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadIndexStatus {
    pub request: Message,
    /// Commit index when the read arrived
    pub index: u64,
    /// Followers that acknowledged the heartbeat carrying this read's context
    pub acks: HashSet<u64>,
}

/// Pending read-index requests keyed by context, plus their arrival order
#[derive(Debug, Clone, Default)]
pub struct ReadOnly {
    option: ReadOnlyOption,
    pending_read_index: HashMap<Vec<u8>, ReadIndexStatus>,
    read_index_queue: VecDeque<Vec<u8>>,
}

impl ReadOnly {
    pub fn new(option: ReadOnlyOption) -> Self {
        Self {
            option,
            pending_read_index: HashMap::new(),
            read_index_queue: VecDeque::new(),
        }
    }

    pub fn option(&self) -> ReadOnlyOption {
        self.option
    }

    /// Queue a read arriving at commit index `index`.
    ///
    /// The context token is the data of the request's first entry; a token
    /// already pending is ignored.
    pub fn add_request(&mut self, index: u64, request: Message) {
        let ctx = match request.entries.first() {
            Some(entry) => entry.data.clone(),
            None => fatal!("read index request from {} carries no context", request.from),
        };
        if self.pending_read_index.contains_key(&ctx) {
            tracing::warn!(from = request.from, index, "duplicate read index context ignored");
            return;
        }

        self.pending_read_index.insert(
            ctx.clone(),
            ReadIndexStatus { request, index, acks: HashSet::new() },
        );
        self.read_index_queue.push_back(ctx);
    }

    /// Count a heartbeat ack for the read named by `m.context`.
    ///
    /// Returns the acks so far including the leader itself, or 0 for an
    /// unknown context.
    pub fn recv_ack(&mut self, m: &Message) -> usize {
        match self.pending_read_index.get_mut(&m.context) {
            Some(rs) => {
                rs.acks.insert(m.from);
                rs.acks.len() + 1
            }
            None => 0,
        }
    }

    /// Resolve every read queued up to and including the one named by
    /// `m.context`, in arrival order. Nothing resolves if it is not pending.
    pub fn advance(&mut self, m: &Message) -> Vec<ReadIndexStatus> {
        let mut found = None;
        for (i, ctx) in self.read_index_queue.iter().enumerate() {
            if !self.pending_read_index.contains_key(ctx) {
                fatal!("cannot find corresponding read state from pending map");
            }
            if *ctx == m.context {
                found = Some(i);
                break;
            }
        }

        let Some(last) = found else {
            return Vec::new();
        };

        let mut resolved = Vec::with_capacity(last + 1);
        for ctx in self.read_index_queue.drain(..=last) {
            if let Some(rs) = self.pending_read_index.remove(&ctx) {
                resolved.push(rs);
            }
        }
        resolved
    }

    /// Context of the newest pending read, if any
    pub fn last_pending_request_ctx(&self) -> Option<&[u8]> {
        self.read_index_queue.back().map(Vec::as_slice)
    }

    pub fn pending_read_count(&self) -> usize {
        self.read_index_queue.len()
    }
}
