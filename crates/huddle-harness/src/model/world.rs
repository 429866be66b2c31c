//! Model world: the oracle the coordinator is checked against.

use std::collections::BTreeMap;

use super::{
    ClientId, ModelRoomId, Operation, OperationResult, room_id as wire_room_id, username,
};

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Non-empty rooms and their usernames in join order.
    pub rosters: BTreeMap<String, Vec<String>>,
    /// Room each client is in, by client index.
    pub client_rooms: Vec<Option<String>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ModelClient {
    connected: bool,
    room: Option<ModelRoomId>,
}

/// Model world: the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    clients: Vec<ModelClient>,
    /// Room -> clients in join order.
    rooms: BTreeMap<ModelRoomId, Vec<ClientId>>,
    registered_rooms: ModelRoomId,
}

impl ModelWorld {
    /// Create a world with connected clients and rooms `0..registered_rooms`.
    pub fn new(num_clients: usize, registered_rooms: ModelRoomId) -> Self {
        let clients = vec![ModelClient { connected: true, room: None }; num_clients];
        Self { clients, rooms: BTreeMap::new(), registered_rooms }
    }

    /// Number of clients in the world.
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// Whether a model room id is registered.
    pub fn is_registered(&self, room: ModelRoomId) -> bool {
        room < self.registered_rooms
    }

    /// Whether the client has a live connection.
    pub fn is_connected(&self, client_id: ClientId) -> bool {
        self.client(client_id).is_some_and(|c| c.connected)
    }

    /// Room the client is in.
    pub fn room_of(&self, client_id: ClientId) -> Option<ModelRoomId> {
        self.client(client_id).and_then(|c| c.room)
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let client_id = op.client_id();
        let Some(client) = self.client(client_id) else {
            return OperationResult::Skipped;
        };

        match (*op, client.connected) {
            (Operation::Reconnect { .. }, false) => {
                self.clients[client_id as usize].connected = true;
                OperationResult::Ok
            },
            (Operation::Reconnect { .. }, true) | (_, false) => OperationResult::Skipped,
            (Operation::Join { room_id, correct_password, .. }, true) => {
                if !self.is_registered(room_id) || !correct_password {
                    return OperationResult::Rejected;
                }
                self.remove_from_room(client_id);
                self.rooms.entry(room_id).or_default().push(client_id);
                self.clients[client_id as usize].room = Some(room_id);
                OperationResult::Ok
            },
            (Operation::Leave { .. }, true) => {
                self.remove_from_room(client_id);
                OperationResult::Ok
            },
            (Operation::Message { .. }, true) => match client.room {
                Some(room) => OperationResult::Delivered(self.member_count(room)),
                None => OperationResult::Dropped,
            },
            (Operation::Typing { .. }, true) => match client.room {
                Some(room) => OperationResult::Delivered(self.member_count(room) - 1),
                None => OperationResult::Dropped,
            },
            (Operation::Disconnect { .. }, true) => {
                self.remove_from_room(client_id);
                self.clients[client_id as usize].connected = false;
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let rosters = self
            .rooms
            .iter()
            .map(|(room, members)| {
                (wire_room_id(*room), members.iter().map(|c| username(*c)).collect())
            })
            .collect();
        let client_rooms = self.clients.iter().map(|c| c.room.map(wire_room_id)).collect();

        ObservableState { rosters, client_rooms }
    }

    fn client(&self, client_id: ClientId) -> Option<&ModelClient> {
        self.clients.get(client_id as usize)
    }

    fn member_count(&self, room: ModelRoomId) -> usize {
        self.rooms.get(&room).map_or(0, Vec::len)
    }

    fn remove_from_room(&mut self, client_id: ClientId) {
        let Some(room) = self.clients[client_id as usize].room.take() else {
            return;
        };
        if let Some(members) = self.rooms.get_mut(&room) {
            members.retain(|c| *c != client_id);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(client_id: ClientId, room_id: ModelRoomId) -> Operation {
        Operation::Join { client_id, room_id, correct_password: true }
    }

    #[test]
    fn join_appends_in_order() {
        let mut world = ModelWorld::new(3, 2);
        assert_eq!(world.apply(&join(1, 0)), OperationResult::Ok);
        assert_eq!(world.apply(&join(0, 0)), OperationResult::Ok);

        let state = world.observable_state();
        assert_eq!(state.rosters["room-0"], vec!["user1", "user0"]);
        assert_eq!(state.client_rooms, vec![
            Some("room-0".to_string()),
            Some("room-0".to_string()),
            None
        ]);
    }

    #[test]
    fn rejected_join_keeps_current_room() {
        let mut world = ModelWorld::new(1, 2);
        world.apply(&join(0, 0));

        let wrong = Operation::Join { client_id: 0, room_id: 1, correct_password: false };
        assert_eq!(world.apply(&wrong), OperationResult::Rejected);
        assert_eq!(world.apply(&join(0, 5)), OperationResult::Rejected);
        assert_eq!(world.room_of(0), Some(0));
    }

    #[test]
    fn switch_moves_client_and_drops_empty_room() {
        let mut world = ModelWorld::new(1, 2);
        world.apply(&join(0, 0));
        world.apply(&join(0, 1));

        let state = world.observable_state();
        assert!(!state.rosters.contains_key("room-0"));
        assert_eq!(state.rosters["room-1"], vec!["user0"]);
    }

    #[test]
    fn message_and_typing_counts() {
        let mut world = ModelWorld::new(3, 1);
        assert_eq!(world.apply(&Operation::Message { client_id: 0 }), OperationResult::Dropped);

        world.apply(&join(0, 0));
        world.apply(&join(1, 0));

        assert_eq!(
            world.apply(&Operation::Message { client_id: 0 }),
            OperationResult::Delivered(2)
        );
        assert_eq!(
            world.apply(&Operation::Typing { client_id: 0, is_typing: true }),
            OperationResult::Delivered(1)
        );
    }

    #[test]
    fn disconnected_client_is_skipped_until_reconnect() {
        let mut world = ModelWorld::new(1, 1);
        world.apply(&join(0, 0));
        assert_eq!(world.apply(&Operation::Disconnect { client_id: 0 }), OperationResult::Ok);
        assert!(world.observable_state().rosters.is_empty());

        assert_eq!(world.apply(&join(0, 0)), OperationResult::Skipped);
        assert_eq!(world.apply(&Operation::Reconnect { client_id: 0 }), OperationResult::Ok);
        assert_eq!(world.apply(&Operation::Reconnect { client_id: 0 }), OperationResult::Skipped);
        assert_eq!(world.room_of(0), None);
        assert_eq!(world.apply(&join(0, 0)), OperationResult::Ok);
    }
}
