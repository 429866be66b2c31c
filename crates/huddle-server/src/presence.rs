//! Roster derivation and room fan-out.
//!
//! The broadcaster holds no state of its own. It reads the directory and the
//! index as they are at the moment of a transition and turns them into
//! [`ServerAction::BroadcastToRoom`] actions whose recipient lists are fixed
//! right there, so a later transition cannot change who receives an event.

use huddle_core::ConnectionId;
use huddle_proto::{OutboundEvent, SystemNotice, notices};

use crate::{ConnectionDirectory, RoomIndex, ServerAction};

/// Kind of room-wide system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessage {
    /// A member joined (`userJoined`)
    Joined,
    /// A member left (`userLeft`)
    Left,
}

impl SystemMessage {
    fn into_event(self, notice: SystemNotice) -> OutboundEvent {
        match self {
            Self::Joined => OutboundEvent::UserJoined(notice),
            Self::Left => OutboundEvent::UserLeft(notice),
        }
    }

    fn text(self, username: &str) -> String {
        match self {
            Self::Joined => notices::user_joined(username),
            Self::Left => notices::user_left(username),
        }
    }
}

/// Read-only view over presence state that produces broadcast actions.
pub struct PresenceBroadcaster<'a> {
    directory: &'a ConnectionDirectory,
    index: &'a RoomIndex,
}

impl<'a> PresenceBroadcaster<'a> {
    /// Create a broadcaster over the current directory and index.
    pub fn new(directory: &'a ConnectionDirectory, index: &'a RoomIndex) -> Self {
        Self { directory, index }
    }

    /// Usernames present in a room, in join order.
    ///
    /// Duplicated usernames appear once per connection.
    pub fn roster_of(&self, room_id: &str) -> Vec<String> {
        let mut sessions: Vec<_> =
            self.index.members(room_id).filter_map(|id| self.directory.get(id)).collect();
        sessions.sort_by_key(|session| session.join_seq);
        sessions.into_iter().map(|session| session.username.clone()).collect()
    }

    /// Members of a room minus `exclude`, sorted by connection id.
    pub fn recipients(&self, room_id: &str, exclude: Option<ConnectionId>) -> Vec<ConnectionId> {
        let mut recipients: Vec<_> =
            self.index.members(room_id).filter(|id| Some(*id) != exclude).collect();
        recipients.sort_unstable();
        recipients
    }

    /// Send `event` to every member of a room except `exclude`.
    pub fn broadcast(
        &self,
        room_id: &str,
        event: OutboundEvent,
        exclude: Option<ConnectionId>,
    ) -> ServerAction {
        ServerAction::BroadcastToRoom {
            room_id: room_id.to_string(),
            recipients: self.recipients(room_id, exclude),
            event,
        }
    }

    /// Send the current roster to every member of a room.
    pub fn publish_roster(&self, room_id: &str) -> ServerAction {
        self.broadcast(room_id, OutboundEvent::ActiveUsers(self.roster_of(room_id)), None)
    }

    /// Send a `userJoined` or `userLeft` notice about `username`.
    pub fn publish_system_message(
        &self,
        room_id: &str,
        kind: SystemMessage,
        username: &str,
        timestamp: u64,
        exclude: Option<ConnectionId>,
    ) -> ServerAction {
        let notice =
            SystemNotice { user: username.to_string(), message: kind.text(username), timestamp };
        self.broadcast(room_id, kind.into_event(notice), exclude)
    }
}

#[cfg(test)]
mod tests {
    use huddle_core::Session;

    use super::*;

    fn join(
        directory: &mut ConnectionDirectory,
        index: &mut RoomIndex,
        id: u64,
        username: &str,
        room_id: &str,
        join_seq: u64,
    ) {
        let connection_id = ConnectionId::new(id);
        directory.set(Session {
            connection_id,
            username: username.to_string(),
            room_id: room_id.to_string(),
            join_seq,
            joined_at: 0,
        });
        index.add(room_id, connection_id);
    }

    #[test]
    fn roster_follows_join_order_not_connection_order() {
        let mut directory = ConnectionDirectory::new();
        let mut index = RoomIndex::new();
        join(&mut directory, &mut index, 9, "carol", "r1", 0);
        join(&mut directory, &mut index, 1, "alice", "r1", 1);
        join(&mut directory, &mut index, 5, "bob", "r1", 2);
        join(&mut directory, &mut index, 2, "dave", "r2", 3);

        let presence = PresenceBroadcaster::new(&directory, &index);
        assert_eq!(presence.roster_of("r1"), vec!["carol", "alice", "bob"]);
        assert_eq!(presence.roster_of("r2"), vec!["dave"]);
        assert!(presence.roster_of("r3").is_empty());
    }

    #[test]
    fn roster_keeps_duplicate_usernames() {
        let mut directory = ConnectionDirectory::new();
        let mut index = RoomIndex::new();
        join(&mut directory, &mut index, 1, "alice", "r1", 0);
        join(&mut directory, &mut index, 2, "alice", "r1", 1);

        let presence = PresenceBroadcaster::new(&directory, &index);
        assert_eq!(presence.roster_of("r1"), vec!["alice", "alice"]);
    }

    #[test]
    fn system_message_excludes_connection() {
        let mut directory = ConnectionDirectory::new();
        let mut index = RoomIndex::new();
        join(&mut directory, &mut index, 1, "alice", "r1", 0);
        join(&mut directory, &mut index, 2, "bob", "r1", 1);

        let presence = PresenceBroadcaster::new(&directory, &index);
        let action = presence.publish_system_message(
            "r1",
            SystemMessage::Joined,
            "bob",
            42,
            Some(ConnectionId::new(2)),
        );

        let ServerAction::BroadcastToRoom { room_id, recipients, event } = action else {
            panic!("expected broadcast");
        };
        assert_eq!(room_id, "r1");
        assert_eq!(recipients, vec![ConnectionId::new(1)]);
        assert_eq!(
            event,
            OutboundEvent::UserJoined(SystemNotice {
                user: "bob".to_string(),
                message: "bob has joined the room".to_string(),
                timestamp: 42,
            })
        );
    }

    #[test]
    fn roster_broadcast_reaches_every_member() {
        let mut directory = ConnectionDirectory::new();
        let mut index = RoomIndex::new();
        join(&mut directory, &mut index, 2, "bob", "r1", 0);
        join(&mut directory, &mut index, 1, "alice", "r1", 1);

        let presence = PresenceBroadcaster::new(&directory, &index);
        let ServerAction::BroadcastToRoom { recipients, event, .. } = presence.publish_roster("r1")
        else {
            panic!("expected broadcast");
        };

        assert_eq!(recipients, vec![ConnectionId::new(1), ConnectionId::new(2)]);
        assert_eq!(event, OutboundEvent::ActiveUsers(vec!["bob".to_string(), "alice".to_string()]));
    }
}
