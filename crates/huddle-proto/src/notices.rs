//! Human-readable texts carried inside events.
//!
//! Clients display these verbatim, so they are part of the protocol.

/// `joinError` when the room id is not registered.
pub const ROOM_NOT_FOUND: &str = "Room not found";

/// `joinError` when the password does not match.
pub const INVALID_PASSWORD: &str = "Invalid password";

/// `joinError` for any credential rejection when rejections are not
/// distinguished.
pub const INVALID_CREDENTIALS: &str = "Invalid room or password";

/// `joinError` when the credential store could not answer.
pub const SERVER_ERROR: &str = "Server error occurred";

/// `joinError` when the username is empty or too long.
pub const INVALID_USERNAME: &str = "Invalid username";

/// `userJoined` text.
pub fn user_joined(username: &str) -> String {
    format!("{username} has joined the room")
}

/// `userLeft` text.
pub fn user_left(username: &str) -> String {
    format!("{username} has left the room")
}

/// `joinSuccess` text.
pub fn join_success(room_id: &str) -> String {
    format!("Successfully joined room {room_id}")
}
