//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound frame is larger than [`crate::MAX_EVENT_SIZE`]
    #[error("event too large: {size} bytes (max {max})")]
    EventTooLarge {
        /// Size of the rejected frame
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Frame is not a valid event envelope
    #[error("malformed event: {0}")]
    Malformed(String),

    /// Event could not be serialized
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Returns true if the peer sent something we could not understand.
    ///
    /// Encode failures are local bugs, everything else is the peer's fault.
    pub fn is_peer_error(&self) -> bool {
        matches!(self, Self::EventTooLarge { .. } | Self::Malformed(_))
    }
}
