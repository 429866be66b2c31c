//! Connection directory: which connection holds which session.
//!
//! Owned by the [`SessionCoordinator`](crate::SessionCoordinator) and only
//! mutated together with the [`RoomIndex`](crate::RoomIndex) inside a single
//! transition.

use std::collections::HashMap;

use huddle_core::{ConnectionId, Session};

/// Map from connection to its current room session.
///
/// # Invariants
///
/// - Each connection maps to at most one session (map keys are unique)
/// - `session.connection_id` equals the key it is stored under
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    sessions: HashMap<ConnectionId, Session>,
}

impl ConnectionDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `session` to its connection, returning the session it replaced.
    pub fn set(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.connection_id, session)
    }

    /// Current session of a connection.
    pub fn get(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    /// Remove and return the session of a connection.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection_id)
    }

    /// Number of joined connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no connection is joined.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All sessions, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> + '_ {
        self.sessions.values()
    }
}
