//! Standard presence invariants.

use super::{Invariant, InvariantResult, PresenceSnapshot, Violation};

/// Every session is listed under its room in the index, under its own key.
pub struct DirectoryMatchesIndex;

impl Invariant for DirectoryMatchesIndex {
    fn name(&self) -> &'static str {
        "directory_matches_index"
    }

    fn check(&self, state: &PresenceSnapshot) -> InvariantResult {
        for (connection_id, session) in &state.sessions {
            if session.connection_id != *connection_id {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "session stored under {connection_id} names {}",
                        session.connection_id
                    ),
                });
            }

            let listed =
                state.rooms.get(&session.room_id).is_some_and(|m| m.contains(connection_id));
            if !listed {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{connection_id} has a session in {} but is not in its member set",
                        session.room_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Every room member holds a session naming that room.
pub struct IndexMatchesDirectory;

impl Invariant for IndexMatchesDirectory {
    fn name(&self) -> &'static str {
        "index_matches_directory"
    }

    fn check(&self, state: &PresenceSnapshot) -> InvariantResult {
        for (room_id, members) in &state.rooms {
            for connection_id in members {
                match state.sessions.get(connection_id) {
                    Some(session) if session.is_in(room_id) => {},
                    Some(session) => {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "{connection_id} listed in {room_id} but its session is in {}",
                                session.room_id
                            ),
                        });
                    },
                    None => {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "{connection_id} listed in {room_id} without a session"
                            ),
                        });
                    },
                }
            }
        }
        Ok(())
    }
}

/// No room (or typing set) entry is left behind empty.
pub struct NoEmptyRooms;

impl Invariant for NoEmptyRooms {
    fn name(&self) -> &'static str {
        "no_empty_rooms"
    }

    fn check(&self, state: &PresenceSnapshot) -> InvariantResult {
        if let Some((room_id, _)) = state.rooms.iter().find(|(_, m)| m.is_empty()) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("room {room_id} has no members"),
            });
        }
        if let Some((room_id, _)) = state.typing.iter().find(|(_, t)| t.is_empty()) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("room {room_id} has an empty typing set"),
            });
        }
        Ok(())
    }
}

/// Only members of a room can be typing in it.
pub struct TypingWithinRoom;

impl Invariant for TypingWithinRoom {
    fn name(&self) -> &'static str {
        "typing_within_room"
    }

    fn check(&self, state: &PresenceSnapshot) -> InvariantResult {
        for (room_id, typists) in &state.typing {
            let members = state.rooms.get(room_id);
            for connection_id in typists {
                if !members.is_some_and(|m| m.contains(connection_id)) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("{connection_id} typing in {room_id} without membership"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Sessions and pending joins only exist for live connections.
pub struct OnlyLiveConnections;

impl Invariant for OnlyLiveConnections {
    fn name(&self) -> &'static str {
        "only_live_connections"
    }

    fn check(&self, state: &PresenceSnapshot) -> InvariantResult {
        let ghost_session = state.sessions.keys().find(|id| !state.live.contains(id));
        if let Some(connection_id) = ghost_session {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{connection_id} has a session but is closed"),
            });
        }

        let ghost_pending = state.pending.keys().find(|id| !state.live.contains(id));
        if let Some(connection_id) = ghost_pending {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{connection_id} has a pending join but is closed"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use huddle_core::{ConnectionId, Session};

    use super::*;

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn joined(ids: &[(u64, &str)]) -> PresenceSnapshot {
        let mut state = PresenceSnapshot::empty();
        for (seq, (id, room_id)) in ids.iter().enumerate() {
            state.live.insert(conn(*id));
            state.sessions.insert(conn(*id), Session {
                connection_id: conn(*id),
                username: format!("user{id}"),
                room_id: (*room_id).to_string(),
                join_seq: seq as u64,
                joined_at: 0,
            });
            state.rooms.entry((*room_id).to_string()).or_default().insert(conn(*id));
        }
        state
    }

    #[test]
    fn consistent_state_passes() {
        let state = joined(&[(1, "r1"), (2, "r1"), (3, "r2")]);
        assert!(super::super::InvariantRegistry::standard().check_all(&state).is_ok());
    }

    #[test]
    fn session_missing_from_index() {
        let mut state = joined(&[(1, "r1"), (2, "r1")]);
        state.rooms.get_mut("r1").unwrap().remove(&conn(2));

        let violation = DirectoryMatchesIndex.check(&state).unwrap_err();
        assert_eq!(violation.invariant, "directory_matches_index");
    }

    #[test]
    fn index_member_in_wrong_room() {
        let mut state = joined(&[(1, "r1"), (2, "r2")]);
        state.rooms.get_mut("r1").unwrap().insert(conn(2));

        assert!(IndexMatchesDirectory.check(&state).is_err());
    }

    #[test]
    fn empty_room_detected() {
        let mut state = joined(&[(1, "r1")]);
        state.rooms.insert("r2".to_string(), BTreeSet::new());

        assert!(NoEmptyRooms.check(&state).is_err());
    }

    #[test]
    fn typist_outside_room_detected() {
        let mut state = joined(&[(1, "r1"), (2, "r2")]);
        state.typing.entry("r1".to_string()).or_default().insert(conn(2));

        assert!(TypingWithinRoom.check(&state).is_err());
    }

    #[test]
    fn closed_connection_with_session_detected() {
        let mut state = joined(&[(1, "r1")]);
        state.live.remove(&conn(1));

        assert!(OnlyLiveConnections.check(&state).is_err());
    }
}
