//! In-memory server for deterministic tests.
//!
//! `SimServer` wraps [`SessionCoordinator`] the way the production runtime
//! does, but executes actions synchronously: sends land in per-connection
//! mailboxes, broadcasts are also appended to a global log, and credential
//! checks are answered from a [`MemoryRoomRegistry`].
//!
//! Credential checks resolve immediately by default. With
//! [`SimServer::set_auto_verify`] turned off they queue up instead, so a test
//! can disconnect, leave or re-join before the verdict arrives.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use huddle_core::{
    ConnectionId, CredentialError, MemoryRoomRegistry, RegistrationError, RoomRegistration,
};
use huddle_proto::{InboundEvent, JoinRequest, OutboundEvent, Password};
use huddle_server::{
    DriverConfig, DriverError, LogLevel, PresenceSnapshot, ServerAction, ServerEvent,
    SessionCoordinator,
};

use crate::SimEnv;

/// One executed `BroadcastToRoom` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRecord {
    /// Room the event concerned
    pub room_id: String,
    /// Connections it was delivered to
    pub recipients: Vec<ConnectionId>,
    /// The event
    pub event: OutboundEvent,
}

/// Credential check waiting to be answered.
#[derive(Debug, Clone)]
struct CredentialCheck {
    connection_id: ConnectionId,
    ticket: u64,
    room_id: String,
    password: Password,
}

/// Simulation server.
///
/// Designed for test-driven usage: tests call `connect`, `join`, `message`
/// and friends, then inspect mailboxes, the broadcast log and snapshots.
pub struct SimServer {
    coordinator: SessionCoordinator<SimEnv>,
    env: SimEnv,
    registry: MemoryRoomRegistry,
    /// Connections whose transport is still open
    open: BTreeSet<ConnectionId>,
    /// Connections the server asked to close
    closed_by_server: BTreeSet<ConnectionId>,
    /// Everything each connection received, in delivery order
    mailboxes: BTreeMap<ConnectionId, Vec<OutboundEvent>>,
    broadcasts: Vec<BroadcastRecord>,
    logs: Vec<(LogLevel, String)>,
    checks: VecDeque<CredentialCheck>,
    auto_verify: bool,
    store_unavailable: bool,
    next_connection_id: u64,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    /// Server with default config and seed 0.
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    /// Server with custom coordinator config.
    pub fn with_config(config: DriverConfig) -> Self {
        Self::with_seed(0, config)
    }

    /// Server with a specific RNG seed and config.
    pub fn with_seed(seed: u64, config: DriverConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        Self {
            coordinator: SessionCoordinator::new(env.clone(), config),
            env,
            registry: MemoryRoomRegistry::new(),
            open: BTreeSet::new(),
            closed_by_server: BTreeSet::new(),
            mailboxes: BTreeMap::new(),
            broadcasts: Vec::new(),
            logs: Vec::new(),
            checks: VecDeque::new(),
            auto_verify: true,
            store_unavailable: false,
            next_connection_id: 1,
        }
    }

    /// Register a room in the credential store.
    pub fn register_room(
        &mut self,
        room_id: &str,
        owner: &str,
        password: &str,
    ) -> Result<(), RegistrationError> {
        self.registry.register(&self.env, RoomRegistration {
            room_id: room_id.to_string(),
            owner: owner.to_string(),
            password: password.to_string(),
        })
    }

    /// Answer credential checks as soon as they are requested (default), or
    /// queue them until [`resolve_next`](Self::resolve_next).
    pub fn set_auto_verify(&mut self, auto_verify: bool) {
        self.auto_verify = auto_verify;
    }

    /// Make the credential store fail every check with `Unavailable`.
    pub fn set_store_unavailable(&mut self, unavailable: bool) {
        self.store_unavailable = unavailable;
    }

    /// Open a new connection and return its id.
    pub fn connect(&mut self) -> ConnectionId {
        let connection_id = ConnectionId::new(self.next_connection_id);
        self.next_connection_id += 1;

        self.open.insert(connection_id);
        self.mailboxes.entry(connection_id).or_default();

        let accepted = self.process(ServerEvent::ConnectionAccepted { connection_id });
        debug_assert!(accepted.is_ok(), "fresh {connection_id} rejected: {accepted:?}");

        connection_id
    }

    /// Send an inbound event from a connection.
    pub fn send(
        &mut self,
        connection_id: ConnectionId,
        event: InboundEvent,
    ) -> Result<Vec<ServerAction>, DriverError> {
        self.process(ServerEvent::EventReceived { connection_id, event })
    }

    /// Request to join a room.
    ///
    /// With auto-verify on, the returned actions include the verdict's.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        room_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        self.send(
            connection_id,
            InboundEvent::JoinRoom(JoinRequest {
                room_id: room_id.to_string(),
                username: username.to_string(),
                password: Password::new(password),
            }),
        )
    }

    /// Send a chat message.
    pub fn message(
        &mut self,
        connection_id: ConnectionId,
        text: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        self.send(connection_id, InboundEvent::Message(text.to_string()))
    }

    /// Send a typing indicator.
    pub fn typing(
        &mut self,
        connection_id: ConnectionId,
        is_typing: bool,
    ) -> Result<Vec<ServerAction>, DriverError> {
        self.send(connection_id, InboundEvent::Typing(is_typing))
    }

    /// Leave the current room.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Result<Vec<ServerAction>, DriverError> {
        self.send(connection_id, InboundEvent::LeaveRoom)
    }

    /// Close a connection from the client side.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Vec<ServerAction> {
        self.open.remove(&connection_id);
        // Closing is never an error, known connection or not
        self.process(ServerEvent::ConnectionClosed {
            connection_id,
            reason: "client disconnected".to_string(),
        })
        .unwrap_or_default()
    }

    /// Number of credential checks waiting for an answer.
    pub fn pending_checks(&self) -> usize {
        self.checks.len()
    }

    /// Answer the oldest queued credential check.
    ///
    /// Returns `None` if nothing is queued.
    pub fn resolve_next(&mut self) -> Option<Vec<ServerAction>> {
        let check = self.checks.pop_front()?;
        Some(self.resolve(check))
    }

    /// Answer the newest queued credential check.
    pub fn resolve_last(&mut self) -> Option<Vec<ServerAction>> {
        let check = self.checks.pop_back()?;
        Some(self.resolve(check))
    }

    /// Answer every queued credential check, oldest first.
    pub fn resolve_all(&mut self) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        while let Some(more) = self.resolve_next() {
            actions.extend(more);
        }
        actions
    }

    fn resolve(&mut self, check: CredentialCheck) -> Vec<ServerAction> {
        let CredentialCheck { connection_id, ticket, room_id, password } = check;
        let result = if self.store_unavailable {
            Err(CredentialError::Unavailable("store offline".to_string()))
        } else {
            self.registry.verify(&room_id, password.expose())
        };

        // Verdicts never fail, even for closed connections
        self.process(ServerEvent::CredentialsVerified { connection_id, ticket, result })
            .unwrap_or_default()
    }

    /// Feed a raw event and execute the resulting actions.
    ///
    /// Returns every action executed, including those of credential checks
    /// resolved along the way.
    pub fn process(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        let actions = self.coordinator.process_event(event)?;
        let mut executed = actions.clone();

        let mut queued = Vec::new();
        for action in actions {
            if let Some(check) = self.execute(action) {
                queued.push(check);
            }
        }

        for check in queued {
            if self.auto_verify {
                executed.extend(self.resolve(check));
            } else {
                self.checks.push_back(check);
            }
        }

        Ok(executed)
    }

    fn execute(&mut self, action: ServerAction) -> Option<CredentialCheck> {
        match action {
            ServerAction::SendToConnection { connection_id, event } => {
                self.deliver(connection_id, event);
            },

            ServerAction::BroadcastToRoom { room_id, recipients, event } => {
                for connection_id in &recipients {
                    self.deliver(*connection_id, event.clone());
                }
                self.broadcasts.push(BroadcastRecord { room_id, recipients, event });
            },

            ServerAction::VerifyCredentials { connection_id, ticket, room_id, password } => {
                return Some(CredentialCheck { connection_id, ticket, room_id, password });
            },

            ServerAction::CloseConnection { connection_id, reason } => {
                tracing::debug!(%connection_id, %reason, "server closed connection");
                self.open.remove(&connection_id);
                self.closed_by_server.insert(connection_id);
            },

            ServerAction::Log { level, message } => {
                self.log(level, &message);
                self.logs.push((level, message));
            },
        }

        None
    }

    fn deliver(&mut self, connection_id: ConnectionId, event: OutboundEvent) {
        if self.open.contains(&connection_id) {
            self.mailboxes.entry(connection_id).or_default().push(event);
        } else {
            tracing::warn!(%connection_id, event = event.name(), "delivery to closed connection");
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
    }

    /// Everything a connection received so far.
    pub fn received(&self, connection_id: ConnectionId) -> &[OutboundEvent] {
        self.mailboxes.get(&connection_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Drain a connection's mailbox.
    pub fn take_received(&mut self, connection_id: ConnectionId) -> Vec<OutboundEvent> {
        self.mailboxes.get_mut(&connection_id).map(std::mem::take).unwrap_or_default()
    }

    /// Empty every mailbox and the broadcast log.
    pub fn clear_received(&mut self) {
        self.mailboxes.values_mut().for_each(Vec::clear);
        self.broadcasts.clear();
    }

    /// Every broadcast executed so far, in order.
    pub fn broadcasts(&self) -> &[BroadcastRecord] {
        &self.broadcasts
    }

    /// Broadcasts of one event kind (`"userLeft"`, `"activeUsers"`, ...) in
    /// one room.
    pub fn broadcasts_of(&self, room_id: &str, event_name: &str) -> Vec<&BroadcastRecord> {
        self.broadcasts
            .iter()
            .filter(|b| b.room_id == room_id && b.event.name() == event_name)
            .collect()
    }

    /// Log lines emitted at `level`.
    pub fn logs_at(&self, level: LogLevel) -> Vec<&str> {
        self.logs.iter().filter(|(l, _)| *l == level).map(|(_, m)| m.as_str()).collect()
    }

    /// Returns true if the server asked to close this connection.
    pub fn was_closed_by_server(&self, connection_id: ConnectionId) -> bool {
        self.closed_by_server.contains(&connection_id)
    }

    /// Roster of a room.
    pub fn roster(&self, room_id: &str) -> Vec<String> {
        self.coordinator.roster(room_id)
    }

    /// Coordinator state.
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.coordinator.snapshot()
    }

    /// The wrapped coordinator.
    pub fn coordinator(&self) -> &SessionCoordinator<SimEnv> {
        &self.coordinator
    }

    /// The simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> SimServer {
        let mut server = SimServer::new();
        server.register_room("lobby", "alice", "hunter22").unwrap();
        server
    }

    #[test]
    fn connect_assigns_sequential_ids() {
        let mut server = server();
        assert_eq!(server.connect(), ConnectionId::new(1));
        assert_eq!(server.connect(), ConnectionId::new(2));
        assert_eq!(server.coordinator().connection_count(), 2);
    }

    #[test]
    fn connect_over_capacity_is_refused_not_failed() {
        let config = DriverConfig { max_connections: 1, ..DriverConfig::default() };
        let mut server = SimServer::with_config(config);

        let c1 = server.connect();
        let c2 = server.connect();

        assert!(server.coordinator().is_live(c1));
        assert!(!server.coordinator().is_live(c2));
        assert!(server.was_closed_by_server(c2));
        assert!(server.logs_at(LogLevel::Warn).iter().any(|l| l.contains("max connections")));
    }

    #[test]
    fn auto_verify_commits_join() {
        let mut server = server();
        let c1 = server.connect();

        server.join(c1, "lobby", "alice", "hunter22").unwrap();

        assert_eq!(server.roster("lobby"), vec!["alice"]);
        assert_eq!(server.pending_checks(), 0);
        assert!(matches!(server.received(c1).last(), Some(OutboundEvent::JoinSuccess(_))));
    }

    #[test]
    fn deferred_checks_wait_for_resolution() {
        let mut server = server();
        server.set_auto_verify(false);
        let c1 = server.connect();

        server.join(c1, "lobby", "alice", "hunter22").unwrap();
        assert_eq!(server.pending_checks(), 1);
        assert!(server.roster("lobby").is_empty());

        server.resolve_all();
        assert_eq!(server.roster("lobby"), vec!["alice"]);
    }

    #[test]
    fn closed_connections_receive_nothing() {
        let mut server = server();
        let c1 = server.connect();
        server.disconnect(c1);

        assert_eq!(
            server.join(c1, "lobby", "alice", "hunter22"),
            Err(DriverError::ConnectionNotFound(c1))
        );
        assert!(server.received(c1).is_empty());
    }

    #[test]
    fn take_received_drains() {
        let mut server = server();
        let c1 = server.connect();
        server.join(c1, "lobby", "alice", "hunter22").unwrap();

        assert!(!server.take_received(c1).is_empty());
        assert!(server.received(c1).is_empty());
    }
}
