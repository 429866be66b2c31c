//! Point-in-time copy of coordinator state.
//!
//! Ordered collections so two snapshots compare and print deterministically.

use std::collections::{BTreeMap, BTreeSet};

use huddle_core::{ConnectionId, Session};

/// Join waiting for its credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    /// Ticket the verdict must carry to commit
    pub ticket: u64,
    /// Room requested
    pub room_id: String,
    /// Trimmed username requested
    pub username: String,
}

/// Observable coordinator state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    /// Accepted, not yet closed connections
    pub live: BTreeSet<ConnectionId>,
    /// Connection directory
    pub sessions: BTreeMap<ConnectionId, Session>,
    /// Room index
    pub rooms: BTreeMap<String, BTreeSet<ConnectionId>>,
    /// Connections currently typing, per room
    pub typing: BTreeMap<String, BTreeSet<ConnectionId>>,
    /// Outstanding join requests
    pub pending: BTreeMap<ConnectionId, PendingSnapshot>,
}

impl PresenceSnapshot {
    /// Snapshot of an idle coordinator.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Usernames in a room, in join order.
    pub fn roster(&self, room_id: &str) -> Vec<String> {
        let mut sessions: Vec<&Session> = self
            .rooms
            .get(room_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.sessions.get(id))
            .collect();
        sessions.sort_by_key(|session| session.join_seq);
        sessions.into_iter().map(|session| session.username.clone()).collect()
    }
}
