//! # message
//!
//! why: describe the message fields the replication core reads
//! relations: consumed by progress.rs and read_only.rs; framing lives with the transport
//! what: MessageType, Message

use serde::{Deserialize, Serialize};

use crate::log::{Entry, Snapshot};

/// Kinds of messages the core reacts to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Replicate log entries
    #[default]
    Append,
    /// Follower's answer to Append
    AppendResponse,
    /// Leader liveness ping, may carry a read-index context
    Heartbeat,
    /// Follower's answer to Heartbeat
    HeartbeatResponse,
    /// Full snapshot transfer
    Snapshot,
    /// Local report on how a snapshot transfer ended
    SnapStatus,
    /// Local report that a follower could not be reached
    Unreachable,
    /// Client asks for a linearizable read
    ReadIndex,
    /// Answer to ReadIndex
    ReadIndexResponse,
}

/// A raft message. Only the fields relevant to `msg_type` are meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MessageType,
    pub from: u64,
    pub to: u64,
    pub term: u64,
    /// Index of the entry preceding `entries`, or the rejected/acked index in responses
    pub index: u64,
    /// Term of the entry at `index`
    pub log_term: u64,
    pub entries: Vec<Entry>,
    pub commit: u64,
    pub reject: bool,
    /// Follower's last index, sent along with a rejection
    pub reject_hint: u64,
    /// Read-index token echoed back by heartbeat responses
    pub context: Vec<u8>,
    pub snapshot: Option<Snapshot>,
}

impl Message {
    pub fn new(msg_type: MessageType, from: u64, to: u64) -> Self {
        Self { msg_type, from, to, ..Default::default() }
    }

    /// Successful append response acknowledging everything up to `index`
    pub fn append_ack(from: u64, index: u64) -> Self {
        Self { index, ..Self::new(MessageType::AppendResponse, from, 0) }
    }

    /// Append rejection for the probe at `rejected`; `last_index` is the follower's log end
    pub fn append_reject(from: u64, rejected: u64, last_index: u64) -> Self {
        Self {
            index: rejected,
            reject: true,
            reject_hint: last_index,
            ..Self::new(MessageType::AppendResponse, from, 0)
        }
    }

    /// Heartbeat response, echoing the read-index context if there was one
    pub fn heartbeat_response(from: u64, context: Vec<u8>) -> Self {
        Self { context, ..Self::new(MessageType::HeartbeatResponse, from, 0) }
    }

    /// Read-index request whose single entry carries the context token
    pub fn read_index(from: u64, context: Vec<u8>) -> Self {
        Self {
            entries: vec![Entry::new(0, 0, context)],
            ..Self::new(MessageType::ReadIndex, from, 0)
        }
    }

    /// Outcome of a snapshot transfer to `from`
    pub fn snap_status(from: u64, reject: bool) -> Self {
        Self { reject, ..Self::new(MessageType::SnapStatus, from, 0) }
    }
}
