//! Operations for model-based testing.
//!
//! Operations are generated randomly by proptest and applied to both the
//! model and the real coordinator.

/// Client identifier (0-indexed).
pub type ClientId = u8;

/// Room identifier (small to keep the test space dense).
pub type ModelRoomId = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Client asks to join (or switch to) a room.
    Join {
        /// Client performing the operation.
        client_id: ClientId,
        /// Target room; ids past the registered range do not exist.
        room_id: ModelRoomId,
        /// Whether the registered password is sent.
        correct_password: bool,
    },

    /// Client leaves its current room.
    Leave {
        /// Client leaving.
        client_id: ClientId,
    },

    /// Client sends a chat message to its room.
    Message {
        /// Sender.
        client_id: ClientId,
    },

    /// Client toggles its typing indicator.
    Typing {
        /// Client typing.
        client_id: ClientId,
        /// New indicator state.
        is_typing: bool,
    },

    /// Client's connection closes.
    Disconnect {
        /// Client disconnecting.
        client_id: ClientId,
    },

    /// Client opens a fresh connection after a disconnect.
    Reconnect {
        /// Client reconnecting.
        client_id: ClientId,
    },
}

impl Operation {
    /// Client the operation acts for.
    pub fn client_id(&self) -> ClientId {
        match self {
            Self::Join { client_id, .. }
            | Self::Leave { client_id }
            | Self::Message { client_id }
            | Self::Typing { client_id, .. }
            | Self::Disconnect { client_id }
            | Self::Reconnect { client_id } => *client_id,
        }
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation took effect (or was a valid no-op).
    Ok,
    /// Join refused by the credential check.
    Rejected,
    /// Room-scoped event from a client outside any room.
    Dropped,
    /// Broadcast reached this many connections.
    Delivered(usize),
    /// Operation does not apply to the client's connection state.
    Skipped,
}
