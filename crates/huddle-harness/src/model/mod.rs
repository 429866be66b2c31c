//! Reference model for model-based testing.
//!
//! [`ModelWorld`] is a deliberately naive presence tracker: a list of rooms,
//! each a join-ordered list of clients. Random [`Operation`] sequences are
//! applied to it and to the real coordinator, and their
//! [`ObservableState`]s must agree after every step.

mod operation;
mod world;

pub use operation::{ClientId, ModelRoomId, Operation, OperationResult};
pub use world::{ModelWorld, ObservableState};

/// Room id used on the wire for a model room.
pub fn room_id(room: ModelRoomId) -> String {
    format!("room-{room}")
}

/// Registered password of a model room.
pub fn room_password(room: ModelRoomId) -> String {
    format!("secret-{room}")
}

/// Username a client joins under.
///
/// Clients share names on purpose: presence must track connections, not
/// display names.
pub fn username(client: ClientId) -> String {
    format!("user{}", client % 3)
}
