//! Huddle wire protocol.
//!
//! Every WebSocket text frame carries exactly one JSON envelope of the form
//! `{"event": <name>, "data": <payload>}`. Clients send [`InboundEvent`]s and
//! the server answers with [`OutboundEvent`]s.
//!
//! The envelope is self-describing, so the server never needs a separate
//! opcode table: the `event` tag selects the variant and serde checks the
//! payload shape.
//!
//! # Invariants
//!
//! - Encoded events never exceed [`MAX_EVENT_SIZE`] bytes on decode.
//! - Each event variant maps to exactly one event name (see
//!   [`InboundEvent::name`] and [`OutboundEvent::name`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod events;
pub mod notices;

pub use errors::{ProtocolError, Result};
pub use events::{
    ChatMessage, InboundEvent, JoinRequest, JoinSuccess, OutboundEvent, Password, SystemNotice,
    TypingNotice,
};

/// Largest inbound frame the decoder accepts, in bytes.
pub const MAX_EVENT_SIZE: usize = 16 * 1024;
