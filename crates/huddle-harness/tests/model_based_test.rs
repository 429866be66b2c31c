//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! coordinator behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelWorld    RealWorld      Compare
//!      (reference)   (SimServer)    Results
//! ```

use huddle_core::ConnectionId;
use huddle_harness::{
    ClientId, InvariantRegistry, ModelRoomId, ModelWorld, ObservableState, Operation,
    OperationResult, SimServer, room_id, room_password, username,
};
use huddle_proto::OutboundEvent;
use huddle_server::{DriverConfig, ServerAction};
use proptest::prelude::*;

const NUM_CLIENTS: usize = 5;
const REGISTERED_ROOMS: ModelRoomId = 3;

/// Real system wrapper that mirrors `ModelWorld`'s interface.
struct RealWorld {
    server: SimServer,
    /// Current connection of each client, if any
    connections: Vec<Option<ConnectionId>>,
}

impl RealWorld {
    fn new(num_clients: usize, seed: u64) -> Self {
        let mut server = SimServer::with_seed(seed, DriverConfig::default());
        for room in 0..REGISTERED_ROOMS {
            server.register_room(&room_id(room), "owner", &room_password(room)).unwrap();
        }
        let connections = (0..num_clients).map(|_| Some(server.connect())).collect();

        Self { server, connections }
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        let client_id = op.client_id();
        let Some(slot) = self.connections.get(client_id as usize).copied() else {
            return OperationResult::Skipped;
        };

        let connection_id = match (op, slot) {
            (Operation::Reconnect { .. }, None) => {
                self.connections[client_id as usize] = Some(self.server.connect());
                return OperationResult::Ok;
            },
            (Operation::Reconnect { .. }, Some(_)) | (_, None) => {
                return OperationResult::Skipped;
            },
            (_, Some(connection_id)) => connection_id,
        };

        match *op {
            Operation::Join { room_id: room, correct_password, .. } => {
                self.apply_join(client_id, connection_id, room, correct_password)
            },
            Operation::Leave { .. } => {
                self.server.leave(connection_id).unwrap();
                OperationResult::Ok
            },
            Operation::Message { .. } => {
                let actions = self.server.message(connection_id, "hello").unwrap();
                delivered(&actions, "message")
            },
            Operation::Typing { is_typing, .. } => {
                let actions = self.server.typing(connection_id, is_typing).unwrap();
                delivered(&actions, "userTyping")
            },
            Operation::Disconnect { .. } => {
                self.server.disconnect(connection_id);
                self.connections[client_id as usize] = None;
                OperationResult::Ok
            },
            Operation::Reconnect { .. } => OperationResult::Skipped,
        }
    }

    fn apply_join(
        &mut self,
        client_id: ClientId,
        connection_id: ConnectionId,
        room: ModelRoomId,
        correct_password: bool,
    ) -> OperationResult {
        let password =
            if correct_password { room_password(room) } else { "wrong-pass".to_string() };
        let actions = self
            .server
            .join(connection_id, &room_id(room), &username(client_id), &password)
            .unwrap();

        let reply = actions.iter().find_map(|action| match action {
            ServerAction::SendToConnection { connection_id: to, event } if *to == connection_id => {
                Some(event)
            },
            _ => None,
        });
        match reply {
            Some(OutboundEvent::JoinSuccess(_)) => OperationResult::Ok,
            Some(OutboundEvent::JoinError(_)) => OperationResult::Rejected,
            other => panic!("unexpected join reply {other:?}"),
        }
    }

    fn observable_state(&self) -> ObservableState {
        let snapshot = self.server.snapshot();
        let rosters =
            snapshot.rooms.keys().map(|room| (room.clone(), snapshot.roster(room))).collect();
        let client_rooms = self
            .connections
            .iter()
            .map(|slot| {
                slot.and_then(|id| snapshot.sessions.get(&id))
                    .map(|session| session.room_id.clone())
            })
            .collect();

        ObservableState { rosters, client_rooms }
    }
}

/// Recipients of the first broadcast of `event_name`, or `Dropped`.
fn delivered(actions: &[ServerAction], event_name: &str) -> OperationResult {
    actions
        .iter()
        .find_map(|action| match action {
            ServerAction::BroadcastToRoom { recipients, event, .. }
                if event.name() == event_name =>
            {
                Some(OperationResult::Delivered(recipients.len()))
            },
            _ => None,
        })
        .unwrap_or(OperationResult::Dropped)
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let client = 0..NUM_CLIENTS as ClientId;
    let room = 0..=REGISTERED_ROOMS;

    prop_oneof![
        6 => (client.clone(), room, prop::bool::weighted(0.8)).prop_map(
            |(client_id, room_id, correct_password)| Operation::Join {
                client_id,
                room_id,
                correct_password,
            }
        ),
        2 => client.clone().prop_map(|client_id| Operation::Leave { client_id }),
        3 => client.clone().prop_map(|client_id| Operation::Message { client_id }),
        2 => (client.clone(), any::<bool>())
            .prop_map(|(client_id, is_typing)| Operation::Typing { client_id, is_typing }),
        1 => client.clone().prop_map(|client_id| Operation::Disconnect { client_id }),
        1 => client.prop_map(|client_id| Operation::Reconnect { client_id }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: the coordinator matches the model after every operation
    #[test]
    fn prop_coordinator_matches_model(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 1..60),
    ) {
        let mut model = ModelWorld::new(NUM_CLIENTS, REGISTERED_ROOMS);
        let mut real = RealWorld::new(NUM_CLIENTS, seed);
        let invariants = InvariantRegistry::standard();

        for (step, op) in ops.iter().enumerate() {
            let expected = model.apply(op);
            let actual = real.apply(op);
            prop_assert_eq!(actual, expected, "result diverged at step {} ({:?})", step, op);

            prop_assert_eq!(
                real.observable_state(),
                model.observable_state(),
                "state diverged at step {} ({:?})",
                step,
                op
            );

            if let Err(violations) = invariants.check_all(&real.server.snapshot()) {
                prop_assert!(false, "step {} ({:?}): {:?}", step, op, violations);
            }
        }
    }
}

#[test]
fn model_and_real_agree_on_a_fixed_story() {
    let ops = [
        Operation::Join { client_id: 0, room_id: 0, correct_password: true },
        Operation::Join { client_id: 3, room_id: 0, correct_password: true },
        Operation::Join { client_id: 1, room_id: 0, correct_password: false },
        Operation::Typing { client_id: 0, is_typing: true },
        Operation::Message { client_id: 3 },
        Operation::Join { client_id: 0, room_id: 1, correct_password: true },
        Operation::Disconnect { client_id: 3 },
        Operation::Message { client_id: 3 },
        Operation::Reconnect { client_id: 3 },
        Operation::Join { client_id: 3, room_id: REGISTERED_ROOMS, correct_password: true },
    ];

    let mut model = ModelWorld::new(NUM_CLIENTS, REGISTERED_ROOMS);
    let mut real = RealWorld::new(NUM_CLIENTS, 7);

    for op in &ops {
        assert_eq!(real.apply(op), model.apply(op), "{op:?}");
    }
    assert_eq!(real.observable_state(), model.observable_state());
    assert_eq!(model.observable_state().rosters["room-1"], vec!["user0"]);
}
