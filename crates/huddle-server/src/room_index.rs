//! Room index: which connections sit in which room.
//!
//! The reverse view of the [`ConnectionDirectory`](crate::ConnectionDirectory),
//! kept for O(1) room fan-out. Rooms exist implicitly: the first `add` creates
//! the entry and the last `remove` drops it.

use std::collections::{HashMap, HashSet};

use huddle_core::ConnectionId;

/// Map from room id to the set of joined connections.
///
/// # Invariants
///
/// - No entry has an empty member set
#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RoomIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Returns false if the connection was already a member.
    pub fn add(&mut self, room_id: &str, connection_id: ConnectionId) -> bool {
        self.rooms.entry(room_id.to_string()).or_default().insert(connection_id)
    }

    /// Remove a connection from a room, dropping the room once empty.
    ///
    /// Returns true if the connection was a member.
    pub fn remove(&mut self, room_id: &str, connection_id: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };

        let removed = members.remove(&connection_id);
        if members.is_empty() {
            self.rooms.remove(room_id);
        }

        debug_assert!(self.rooms.get(room_id).is_none_or(|m| !m.is_empty()));
        removed
    }

    /// Members of a room. Empty for unknown rooms.
    pub fn members(&self, room_id: &str) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(room_id).into_iter().flat_map(|m| m.iter().copied())
    }

    /// Number of members in a room.
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, HashSet::len)
    }

    /// Returns true if the room has at least one member.
    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// All rooms with their members.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HashSet<ConnectionId>)> + '_ {
        self.rooms.iter().map(|(room_id, members)| (room_id.as_str(), members))
    }
}
