//! Session coordinator.
//!
//! The state machine behind every connection: `Anonymous -> Joined ->
//! (closed)`, with `Joined` re-entered directly on a room switch. It is the
//! only writer of the [`ConnectionDirectory`] and [`RoomIndex`] and the only
//! producer of credential checks and presence broadcasts.
//!
//! The coordinator performs no I/O. The runtime feeds it [`ServerEvent`]s and
//! executes the [`ServerAction`]s it returns, in order.
//!
//! # Joining
//!
//! Credential checks may suspend, so a join is split in two transitions:
//!
//! 1. `joinRoom` records a pending join under a fresh ticket and emits
//!    [`ServerAction::VerifyCredentials`].
//! 2. [`ServerEvent::CredentialsVerified`] commits the join, but only if the
//!    connection is still live and the ticket matches its latest pending join.
//!    Anything else is a cancelled request and is discarded.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use huddle_core::{
    ConnectionId, CredentialError, RoomGrant, Session, StateError, env::Environment,
};
use huddle_proto::{
    ChatMessage, InboundEvent, JoinRequest, JoinSuccess, OutboundEvent, Password, TypingNotice,
    notices,
};

use crate::{
    ConnectionDirectory, PresenceBroadcaster, RoomIndex,
    driver_error::DriverError,
    presence::SystemMessage,
    snapshot::{PendingSnapshot, PresenceSnapshot},
};

/// How credential rejections are reported to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthErrorPolicy {
    /// "Room not found" and "Invalid password" are reported separately
    #[default]
    Distinct,
    /// Both rejections read "Invalid room or password", so clients cannot
    /// discover which room ids exist
    Unified,
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrently live connections
    pub max_connections: usize,
    /// Maximum chat message length in bytes
    pub max_message_len: usize,
    /// Maximum username length in characters, after trimming
    pub max_username_len: usize,
    /// Rejection reporting
    pub auth_error_policy: AuthErrorPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_message_len: 2_000,
            max_username_len: 32,
            auth_error_policy: AuthErrorPolicy::Distinct,
        }
    }
}

/// Events the coordinator processes.
///
/// Produced by the runtime (production or simulation).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Transport accepted a new connection
    ConnectionAccepted {
        /// Id assigned by the transport
        connection_id: ConnectionId,
    },

    /// A connection sent a decoded event
    EventReceived {
        /// Sender
        connection_id: ConnectionId,
        /// Decoded event
        event: InboundEvent,
    },

    /// A credential check requested by [`ServerAction::VerifyCredentials`]
    /// finished
    CredentialsVerified {
        /// Connection that asked to join
        connection_id: ConnectionId,
        /// Ticket from the originating action
        ticket: u64,
        /// Store verdict
        result: Result<RoomGrant, CredentialError>,
    },

    /// Transport closed a connection (peer, error, or server request)
    ConnectionClosed {
        /// Closed connection
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions the coordinator produces.
///
/// Executed by runtime-specific code, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send an event to one connection
    SendToConnection {
        /// Target connection
        connection_id: ConnectionId,
        /// Event to send
        event: OutboundEvent,
    },

    /// Send an event to a fixed set of room members
    BroadcastToRoom {
        /// Room the event concerns
        room_id: String,
        /// Members at transition time, exclusions already applied
        recipients: Vec<ConnectionId>,
        /// Event to send
        event: OutboundEvent,
    },

    /// Check credentials and report back with
    /// [`ServerEvent::CredentialsVerified`]
    VerifyCredentials {
        /// Connection that asked to join
        connection_id: ConnectionId,
        /// Ticket to echo back
        ticket: u64,
        /// Requested room
        room_id: String,
        /// Password to check
        password: Password,
    },

    /// Close a connection
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Log a message
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

#[derive(Debug, Clone)]
struct PendingJoin {
    ticket: u64,
    room_id: String,
    username: String,
}

/// Presence state machine over all connections.
pub struct SessionCoordinator<E: Environment> {
    env: E,
    config: DriverConfig,
    /// Accepted, not yet closed connections
    live: HashSet<ConnectionId>,
    directory: ConnectionDirectory,
    index: RoomIndex,
    /// Latest unverified join per connection
    pending: HashMap<ConnectionId, PendingJoin>,
    /// Room id -> connections currently typing there
    typing: HashMap<String, HashSet<ConnectionId>>,
    next_ticket: u64,
    next_join_seq: u64,
}

impl<E: Environment> SessionCoordinator<E> {
    /// Create a coordinator with no connections.
    pub fn new(env: E, config: DriverConfig) -> Self {
        Self {
            env,
            config,
            live: HashSet::new(),
            directory: ConnectionDirectory::new(),
            index: RoomIndex::new(),
            pending: HashMap::new(),
            typing: HashMap::new(),
            next_ticket: 0,
            next_join_seq: 0,
        }
    }

    /// Process an event and return the actions to execute.
    ///
    /// # Errors
    ///
    /// - `DriverError::ConnectionAlreadyExists` when accepting a live id
    /// - `DriverError::ConnectionNotFound` when a non-live connection sends
    ///   an inbound event
    ///
    /// Closing an unknown connection and verdicts for closed connections are
    /// not errors: both are ordinary races and yield no state change.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            ServerEvent::EventReceived { connection_id, event } => {
                self.handle_event_received(connection_id, event)
            },
            ServerEvent::CredentialsVerified { connection_id, ticket, result } => {
                Ok(self.handle_credentials_verified(connection_id, ticket, result))
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                Ok(self.handle_connection_closed(connection_id, &reason))
            },
        }
    }

    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if self.live.contains(&connection_id) {
            return Err(DriverError::ConnectionAlreadyExists(connection_id));
        }

        if self.live.len() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseConnection {
                    connection_id,
                    reason: "max connections exceeded".to_string(),
                },
                log(LogLevel::Warn, format!("{connection_id} refused: max connections exceeded")),
            ]);
        }

        self.live.insert(connection_id);

        Ok(vec![log(LogLevel::Debug, format!("{connection_id} accepted"))])
    }

    fn handle_event_received(
        &mut self,
        connection_id: ConnectionId,
        event: InboundEvent,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if !self.live.contains(&connection_id) {
            return Err(DriverError::ConnectionNotFound(connection_id));
        }

        let actions = match event {
            InboundEvent::JoinRoom(request) => self.handle_join_request(connection_id, request),
            InboundEvent::Message(text) => self.handle_message(connection_id, &text),
            InboundEvent::Typing(is_typing) => self.handle_typing(connection_id, is_typing),
            InboundEvent::LeaveRoom => self.handle_leave(connection_id),
        };

        Ok(actions)
    }

    /// First phase of a join: validate, record as pending, ask for a check.
    fn handle_join_request(
        &mut self,
        connection_id: ConnectionId,
        request: JoinRequest,
    ) -> Vec<ServerAction> {
        let JoinRequest { room_id, username, password } = request;
        let username = username.trim();

        if username.is_empty() || username.chars().count() > self.config.max_username_len {
            return vec![
                ServerAction::SendToConnection {
                    connection_id,
                    event: OutboundEvent::JoinError(notices::INVALID_USERNAME.to_string()),
                },
                log(LogLevel::Debug, format!("{connection_id} join rejected: invalid username")),
            ];
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let superseded = self.pending.insert(
            connection_id,
            PendingJoin { ticket, room_id: room_id.clone(), username: username.to_string() },
        );

        let mut actions = Vec::with_capacity(2);
        if let Some(old) = superseded {
            actions.push(log(
                LogLevel::Debug,
                format!("{connection_id} join to {} superseded by join to {room_id}", old.room_id),
            ));
        }
        actions.push(ServerAction::VerifyCredentials { connection_id, ticket, room_id, password });
        actions
    }

    /// Second phase of a join: commit or reject.
    fn handle_credentials_verified(
        &mut self,
        connection_id: ConnectionId,
        ticket: u64,
        result: Result<RoomGrant, CredentialError>,
    ) -> Vec<ServerAction> {
        if !self.live.contains(&connection_id) {
            return vec![log(
                LogLevel::Debug,
                format!("{connection_id} closed before credential check finished"),
            )];
        }

        let is_current = self.pending.get(&connection_id).is_some_and(|p| p.ticket == ticket);
        if !is_current {
            return vec![log(
                LogLevel::Debug,
                format!("{connection_id} discarded stale credential result (ticket {ticket})"),
            )];
        }

        let Some(mut pending) = self.pending.remove(&connection_id) else {
            return Vec::new();
        };

        match result {
            Ok(grant) => {
                // The store's id is canonical (it may differ in case or form)
                pending.room_id = grant.room_id;
                self.commit_join(connection_id, pending)
            },
            Err(err) => self.reject_join(connection_id, &pending, &err),
        }
    }

    fn reject_join(
        &self,
        connection_id: ConnectionId,
        pending: &PendingJoin,
        err: &CredentialError,
    ) -> Vec<ServerAction> {
        let reason = match (err, self.config.auth_error_policy) {
            (CredentialError::NotFound, AuthErrorPolicy::Distinct) => notices::ROOM_NOT_FOUND,
            (CredentialError::Mismatch, AuthErrorPolicy::Distinct) => notices::INVALID_PASSWORD,
            (CredentialError::NotFound | CredentialError::Mismatch, AuthErrorPolicy::Unified) => {
                notices::INVALID_CREDENTIALS
            },
            (CredentialError::Unavailable(_), _) => notices::SERVER_ERROR,
        };
        // Rejections are ordinary client mistakes, an unreachable store is not
        let level = if err.is_rejection() { LogLevel::Debug } else { LogLevel::Error };

        vec![
            ServerAction::SendToConnection {
                connection_id,
                event: OutboundEvent::JoinError(reason.to_string()),
            },
            log(level, format!("{connection_id} join to {} failed: {err}", pending.room_id)),
        ]
    }

    /// Retract any prior session, then bind the new one.
    fn commit_join(
        &mut self,
        connection_id: ConnectionId,
        pending: PendingJoin,
    ) -> Vec<ServerAction> {
        let mut actions = self.leave(connection_id);

        let PendingJoin { room_id, username, .. } = pending;
        let join_seq = self.next_join_seq;
        self.next_join_seq += 1;
        let joined_at = self.env.wall_clock_millis();

        let replaced = self.directory.set(Session {
            connection_id,
            username: username.clone(),
            room_id: room_id.clone(),
            join_seq,
            joined_at,
        });
        debug_assert!(replaced.is_none());
        self.index.add(&room_id, connection_id);

        let presence = self.presence();
        actions.push(presence.publish_system_message(
            &room_id,
            SystemMessage::Joined,
            &username,
            joined_at,
            None,
        ));
        actions.push(presence.publish_roster(&room_id));
        actions.push(ServerAction::SendToConnection {
            connection_id,
            event: OutboundEvent::JoinSuccess(JoinSuccess {
                message: notices::join_success(&room_id),
                room_id: room_id.clone(),
                username: username.clone(),
            }),
        });
        actions.push(log(
            LogLevel::Info,
            format!("{connection_id} joined {room_id} as {username}"),
        ));

        actions
    }

    fn handle_message(&mut self, connection_id: ConnectionId, text: &str) -> Vec<ServerAction> {
        let Some(session) = self.directory.get(connection_id) else {
            return not_joined(connection_id, "message");
        };

        if text.trim().is_empty() {
            return vec![log(LogLevel::Warn, format!("{connection_id} sent an empty message"))];
        }
        if text.len() > self.config.max_message_len {
            return vec![log(
                LogLevel::Warn,
                format!(
                    "{connection_id} message dropped: {} bytes (max {})",
                    text.len(),
                    self.config.max_message_len
                ),
            )];
        }

        let event = OutboundEvent::Message(ChatMessage {
            user: session.username.clone(),
            text: text.to_string(),
            timestamp: self.env.wall_clock_millis(),
        });

        vec![self.presence().broadcast(&session.room_id, event, None)]
    }

    fn handle_typing(&mut self, connection_id: ConnectionId, is_typing: bool) -> Vec<ServerAction> {
        let Some(session) = self.directory.get(connection_id) else {
            return not_joined(connection_id, "typing");
        };
        let room_id = session.room_id.clone();
        let username = session.username.clone();

        if is_typing {
            self.typing.entry(room_id.clone()).or_default().insert(connection_id);
        } else {
            self.clear_typing(&room_id, connection_id);
        }

        let event = OutboundEvent::UserTyping(TypingNotice { user: username, is_typing });
        vec![self.presence().broadcast(&room_id, event, Some(connection_id))]
    }

    fn handle_leave(&mut self, connection_id: ConnectionId) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        if let Some(cancelled) = self.pending.remove(&connection_id) {
            actions.push(log(
                LogLevel::Debug,
                format!("{connection_id} join to {} cancelled by leave", cancelled.room_id),
            ));
        }
        actions.extend(self.leave(connection_id));
        actions
    }

    fn handle_connection_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Vec<ServerAction> {
        if !self.live.remove(&connection_id) {
            return Vec::new();
        }

        self.pending.remove(&connection_id);
        let mut actions = self.leave(connection_id);
        actions.push(log(LogLevel::Debug, format!("{connection_id} closed: {reason}")));
        actions
    }

    /// Retract the session of a connection, if it has one.
    ///
    /// Directory, index and typing set change together, then the remaining
    /// members hear about it. Without a session this is a no-op.
    fn leave(&mut self, connection_id: ConnectionId) -> Vec<ServerAction> {
        let Some(session) = self.directory.remove(connection_id) else {
            return Vec::new();
        };

        let removed = self.index.remove(&session.room_id, connection_id);
        debug_assert!(removed, "directory and index disagree on {connection_id}");
        let was_typing = self.clear_typing(&session.room_id, connection_id);
        let now = self.env.wall_clock_millis();

        let presence = self.presence();
        let mut actions = Vec::with_capacity(4);
        if was_typing {
            let event = OutboundEvent::UserTyping(TypingNotice {
                user: session.username.clone(),
                is_typing: false,
            });
            actions.push(presence.broadcast(&session.room_id, event, None));
        }
        actions.push(presence.publish_system_message(
            &session.room_id,
            SystemMessage::Left,
            &session.username,
            now,
            None,
        ));
        actions.push(presence.publish_roster(&session.room_id));
        actions.push(log(
            LogLevel::Info,
            format!("{connection_id} left {} ({})", session.room_id, session.username),
        ));

        actions
    }

    /// Returns true if the connection was marked as typing in the room.
    fn clear_typing(&mut self, room_id: &str, connection_id: ConnectionId) -> bool {
        let Some(typists) = self.typing.get_mut(room_id) else {
            return false;
        };
        let removed = typists.remove(&connection_id);
        if typists.is_empty() {
            self.typing.remove(room_id);
        }
        removed
    }

    fn presence(&self) -> PresenceBroadcaster<'_> {
        PresenceBroadcaster::new(&self.directory, &self.index)
    }

    /// Usernames in a room, in join order.
    pub fn roster(&self, room_id: &str) -> Vec<String> {
        self.presence().roster_of(room_id)
    }

    /// Connections in a room, sorted by id.
    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.presence().recipients(room_id, None)
    }

    /// Usernames currently typing in a room, in join order.
    pub fn typing_users(&self, room_id: &str) -> Vec<String> {
        let Some(typists) = self.typing.get(room_id) else {
            return Vec::new();
        };
        let mut sessions: Vec<&Session> =
            typists.iter().filter_map(|id| self.directory.get(*id)).collect();
        sessions.sort_by_key(|session| session.join_seq);
        sessions.into_iter().map(|session| session.username.clone()).collect()
    }

    /// Current session of a connection.
    pub fn session(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.directory.get(connection_id)
    }

    /// Returns true if the connection is accepted and not closed.
    pub fn is_live(&self, connection_id: ConnectionId) -> bool {
        self.live.contains(&connection_id)
    }

    /// Returns true if the connection has a join awaiting its credential check.
    pub fn is_pending(&self, connection_id: ConnectionId) -> bool {
        self.pending.contains_key(&connection_id)
    }

    /// Number of live connections, joined or not.
    pub fn connection_count(&self) -> usize {
        self.live.len()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.index.room_count()
    }

    /// Copy of the full presence state.
    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            live: self.live.iter().copied().collect(),
            sessions: self.directory.iter().map(|s| (s.connection_id, s.clone())).collect(),
            rooms: self
                .index
                .iter()
                .map(|(room_id, members)| (room_id.to_string(), sorted(members)))
                .collect(),
            typing: self
                .typing
                .iter()
                .map(|(room_id, typists)| (room_id.clone(), sorted(typists)))
                .collect::<BTreeMap<_, _>>(),
            pending: self
                .pending
                .iter()
                .map(|(id, pending)| {
                    (*id, PendingSnapshot {
                        ticket: pending.ticket,
                        room_id: pending.room_id.clone(),
                        username: pending.username.clone(),
                    })
                })
                .collect(),
        }
    }
}

fn sorted(ids: &HashSet<ConnectionId>) -> BTreeSet<ConnectionId> {
    ids.iter().copied().collect()
}

fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}

fn not_joined(connection_id: ConnectionId, operation: &'static str) -> Vec<ServerAction> {
    let err = StateError::NotJoined { connection_id, operation };
    vec![log(LogLevel::Debug, format!("dropped: {err}"))]
}
