//! Connection identity and room sessions.

use std::fmt;

/// Opaque identifier of one live transport connection.
///
/// Allocated by the transport when a connection is accepted and never reused
/// while the process runs. The presence engine only references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw transport identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw transport identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Authenticated room membership bound to one connection.
///
/// A session exists only after a successful join and is destroyed on leave,
/// disconnect, or when the connection joins another room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Connection holding the session
    pub connection_id: ConnectionId,
    /// Display label. Not unique, two connections may share it.
    pub username: String,
    /// Room the connection sits in
    pub room_id: String,
    /// Position in the global join order. Rosters sort by it.
    pub join_seq: u64,
    /// Unix milliseconds at join time
    pub joined_at: u64,
}

impl Session {
    /// Returns true if this session belongs to `room_id`.
    pub fn is_in(&self, room_id: &str) -> bool {
        self.room_id == room_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::from(9).get(), 9);
    }

    #[test]
    fn connection_ids_order_by_raw_value() {
        let mut ids = vec![ConnectionId::new(3), ConnectionId::new(1), ConnectionId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ConnectionId::new(1), ConnectionId::new(2), ConnectionId::new(3)]);
    }

    #[test]
    fn session_room_membership() {
        let session = Session {
            connection_id: ConnectionId::new(1),
            username: "alice".to_string(),
            room_id: "r1".to_string(),
            join_seq: 0,
            joined_at: 1_700_000_000_000,
        };

        assert!(session.is_in("r1"));
        assert!(!session.is_in("r2"));
    }
}
