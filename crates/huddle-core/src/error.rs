//! Error types for the Huddle core.
//!
//! The taxonomy mirrors how failures are surfaced:
//!
//! - [`CredentialError`]: join refused (or store down), reported to the
//!   joining connection as `joinError`
//! - [`StateError`]: an action that needs a session arrived without one,
//!   silently dropped
//! - [`TransportError`]: delivery to one connection failed, logged while the
//!   broadcast continues
//! - [`RegistrationError`]: a room could not be registered in the store

use thiserror::Error;

use crate::ConnectionId;

/// Why a credential check did not grant access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No room with this id is registered
    #[error("room not found")]
    NotFound,

    /// Room exists but the password does not match
    #[error("password mismatch")]
    Mismatch,

    /// Store could not answer (I/O failure, poisoned lock, ...)
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

impl CredentialError {
    /// Returns true if the store rejected the credentials.
    ///
    /// Unavailability is not a rejection: the same request may succeed later.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::NotFound | Self::Mismatch)
    }
}

/// Action requiring a joined session issued by an anonymous connection.
///
/// Typically a benign race between client UI state and server state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Connection holds no session
    #[error("{connection_id} is not in a room (attempted {operation})")]
    NotJoined {
        /// Connection that issued the action
        connection_id: ConnectionId,
        /// Inbound event name
        operation: &'static str,
    },
}

/// Delivery to one connection failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No outbound queue registered for this connection
    #[error("{0} is gone")]
    ConnectionGone(ConnectionId),

    /// Outbound queue is full, the client is not reading
    #[error("outbound queue full for {0}")]
    QueueFull(ConnectionId),

    /// Event could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Room registration rejected by the credential store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Room id shorter than the minimum
    #[error("room id must be at least {min} characters")]
    RoomIdTooShort {
        /// Minimum length
        min: usize,
    },

    /// Owner username shorter than the minimum
    #[error("username must be at least {min} characters")]
    UsernameTooShort {
        /// Minimum length
        min: usize,
    },

    /// Password shorter than the minimum
    #[error("password must be at least {min} characters")]
    PasswordTooShort {
        /// Minimum length
        min: usize,
    },

    /// Another room already uses this id
    #[error("room id already registered: {0}")]
    RoomTaken(String),

    /// Store could not persist the registration
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}
