//! Deterministic simulation harness for Huddle.
//!
//! Drives the [`huddle_server::SessionCoordinator`] without sockets or a
//! runtime, so every test is reproducible from a seed.
//!
//! - [`SimEnv`]: virtual clock and seeded RNG
//! - [`SimServer`]: feeds events, executes actions in memory and records what
//!   each connection received; credential checks can be resolved immediately
//!   or held back to exercise cancellation
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation. Operations are
//! applied to both the model and the real coordinator and their observable
//! states are compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks structural properties of a
//! [`PresenceSnapshot`](huddle_server::PresenceSnapshot) after every step. Use
//! [`InvariantRegistry::standard()`] for the full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    DirectoryMatchesIndex, IndexMatchesDirectory, Invariant, InvariantRegistry, InvariantResult,
    NoEmptyRooms, OnlyLiveConnections, TypingWithinRoom, Violation,
};
pub use model::{
    ClientId, ModelRoomId, ModelWorld, ObservableState, Operation, OperationResult, room_id,
    room_password, username,
};
pub use sim_env::SimEnv;
pub use sim_server::{BroadcastRecord, SimServer};
