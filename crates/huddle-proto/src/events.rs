//! Inbound and outbound event types.
//!
//! Event and field names follow the camelCase convention of browser clients
//! (`joinRoom`, `roomId`, `isTyping`), so the Rust types rename on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    MAX_EVENT_SIZE,
    errors::{ProtocolError, Result},
};

/// Room password as sent by the client.
///
/// Kept opaque so it never ends up in a log line through `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    /// Wrap a plaintext password.
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self(plaintext.into())
    }

    /// The plaintext. Only the credential check should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Request to join (or switch to) a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Room to join
    pub room_id: String,
    /// Display name inside the room
    pub username: String,
    /// Room password
    pub password: Password,
}

/// Events sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum InboundEvent {
    /// Join a room, leaving the current one first
    JoinRoom(JoinRequest),
    /// Chat message to the current room
    Message(String),
    /// Typing indicator for the current room
    Typing(bool),
    /// Leave the current room
    LeaveRoom,
}

impl InboundEvent {
    /// Wire name of this event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "joinRoom",
            Self::Message(_) => "message",
            Self::Typing(_) => "typing",
            Self::LeaveRoom => "leaveRoom",
        }
    }

    /// Decode one inbound event from a text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EventTooLarge` if `text` exceeds [`MAX_EVENT_SIZE`]
    /// - `ProtocolError::Malformed` if the envelope or payload is invalid
    ///
    /// # Security
    ///
    /// The size check runs before any parsing, so oversized frames are
    /// rejected without allocating for their contents.
    pub fn decode(text: &str) -> Result<Self> {
        if text.len() > MAX_EVENT_SIZE {
            return Err(ProtocolError::EventTooLarge { size: text.len(), max: MAX_EVENT_SIZE });
        }

        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Encode this event as a JSON envelope.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Acknowledgment sent to a connection that joined a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSuccess {
    /// Room that was joined
    pub room_id: String,
    /// Name the connection joined under
    pub username: String,
    /// Human-readable confirmation
    pub message: String,
}

/// Room-wide system notice (someone joined or left).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    /// User the notice is about
    pub user: String,
    /// Human-readable text
    pub message: String,
    /// Unix milliseconds (UTC)
    pub timestamp: u64,
}

/// Chat message fanned out to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author
    pub user: String,
    /// Message body
    pub text: String,
    /// Unix milliseconds (UTC)
    pub timestamp: u64,
}

/// Typing indicator for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    /// Member that started or stopped typing
    pub user: String,
    /// True while typing
    pub is_typing: bool,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundEvent {
    /// Join accepted (joining connection only)
    JoinSuccess(JoinSuccess),
    /// Join refused (joining connection only)
    JoinError(String),
    /// A member joined the room
    UserJoined(SystemNotice),
    /// A member left the room
    UserLeft(SystemNotice),
    /// Chat message, sender included
    Message(ChatMessage),
    /// Typing indicator, sender excluded
    UserTyping(TypingNotice),
    /// Current roster in join order
    ActiveUsers(Vec<String>),
}

impl OutboundEvent {
    /// Wire name of this event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinSuccess(_) => "joinSuccess",
            Self::JoinError(_) => "joinError",
            Self::UserJoined(_) => "userJoined",
            Self::UserLeft(_) => "userLeft",
            Self::Message(_) => "message",
            Self::UserTyping(_) => "userTyping",
            Self::ActiveUsers(_) => "activeUsers",
        }
    }

    /// Encode this event as a JSON envelope.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode one outbound event. Used by clients and tests.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn decode_join_room() {
        let text = concat!(
            r#"{"event":"joinRoom","#,
            r#""data":{"roomId":"r1","username":"alice","password":"hunter22"}}"#
        );
        let event = InboundEvent::decode(text).unwrap();

        assert_eq!(
            event,
            InboundEvent::JoinRoom(JoinRequest {
                room_id: "r1".to_string(),
                username: "alice".to_string(),
                password: Password::new("hunter22"),
            })
        );
        assert_eq!(event.name(), "joinRoom");
    }

    #[test]
    fn decode_message_typing_and_leave() {
        assert_eq!(
            InboundEvent::decode(r#"{"event":"message","data":"hi"}"#).unwrap(),
            InboundEvent::Message("hi".to_string())
        );
        assert_eq!(
            InboundEvent::decode(r#"{"event":"typing","data":true}"#).unwrap(),
            InboundEvent::Typing(true)
        );
        assert_eq!(
            InboundEvent::decode(r#"{"event":"leaveRoom"}"#).unwrap(),
            InboundEvent::LeaveRoom
        );
    }

    #[test]
    fn decode_rejects_unknown_event() {
        let err = InboundEvent::decode(r#"{"event":"dance","data":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_wrong_payload_shape() {
        let err = InboundEvent::decode(r#"{"event":"typing","data":"yes"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = InboundEvent::decode(r#"{"event":"joinRoom","data":{"roomId":"r1"}}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let text = format!(r#"{{"event":"message","data":"{}"}}"#, "x".repeat(MAX_EVENT_SIZE));
        let err = InboundEvent::decode(&text).unwrap_err();

        assert!(matches!(err, ProtocolError::EventTooLarge { max: MAX_EVENT_SIZE, .. }));
    }

    #[test]
    fn outbound_wire_shape() {
        let event = OutboundEvent::JoinSuccess(JoinSuccess {
            room_id: "r1".to_string(),
            username: "alice".to_string(),
            message: "Successfully joined room r1".to_string(),
        });
        assert_eq!(
            event.encode().unwrap(),
            concat!(
                r#"{"event":"joinSuccess","data":{"roomId":"r1","username":"alice","#,
                r#""message":"Successfully joined room r1"}}"#
            )
        );

        let event =
            OutboundEvent::UserTyping(TypingNotice { user: "bob".to_string(), is_typing: true });
        assert_eq!(
            event.encode().unwrap(),
            r#"{"event":"userTyping","data":{"user":"bob","isTyping":true}}"#
        );

        let event = OutboundEvent::ActiveUsers(vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(event.encode().unwrap(), r#"{"event":"activeUsers","data":["alice","bob"]}"#);

        let event = OutboundEvent::JoinError("Room not found".to_string());
        assert_eq!(event.encode().unwrap(), r#"{"event":"joinError","data":"Room not found"}"#);
    }

    #[test]
    fn outbound_names_match_wire_tags() {
        let events = [
            OutboundEvent::JoinError(String::new()),
            OutboundEvent::ActiveUsers(Vec::new()),
            OutboundEvent::Message(ChatMessage {
                user: "a".to_string(),
                text: "b".to_string(),
                timestamp: 1,
            }),
            OutboundEvent::UserLeft(SystemNotice {
                user: "a".to_string(),
                message: "a has left the room".to_string(),
                timestamp: 2,
            }),
        ];

        for event in events {
            let encoded = event.encode().unwrap();
            assert!(encoded.starts_with(&format!(r#"{{"event":"{}""#, event.name())));
        }
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let request = JoinRequest {
            room_id: "r1".to_string(),
            username: "alice".to_string(),
            password: Password::new("hunter22"),
        };

        let debug = format!("{request:?}");
        assert!(!debug.contains("hunter22"));
        assert!(debug.contains("Password(***)"));
        assert_eq!(request.password.expose(), "hunter22");
    }

    proptest! {
        /// Property: decoding never panics, whatever the client sends
        #[test]
        fn prop_decode_never_panics(text in ".{0,512}") {
            let _ = InboundEvent::decode(&text);
        }

        /// Property: any chat text survives the envelope unchanged
        #[test]
        fn prop_message_text_preserved(text in any::<String>()) {
            let event = InboundEvent::Message(text.clone());
            let encoded = event.encode()?;
            if encoded.len() <= MAX_EVENT_SIZE {
                prop_assert_eq!(InboundEvent::decode(&encoded)?, InboundEvent::Message(text));
            }
        }
    }
}
