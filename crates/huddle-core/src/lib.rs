//! Huddle core types.
//!
//! Everything the presence engine needs that is independent of any transport:
//!
//! - [`env::Environment`]: time and randomness, swappable for simulation
//! - [`ConnectionId`] and [`Session`]: who is connected and where they sit
//! - [`credentials`]: the credential store seam ([`RoomRegistry`]) and an
//!   in-memory implementation
//! - [`error`]: the error taxonomy shared by the server and harness

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod credentials;
pub mod env;
pub mod error;

pub use connection::{ConnectionId, Session};
pub use credentials::{MemoryRoomRegistry, RoomGrant, RoomRegistration, RoomRegistry};
pub use error::{CredentialError, RegistrationError, StateError, TransportError};
