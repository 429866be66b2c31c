//! Huddle production server.
//!
//! Presence and broadcast engine for password-protected chat rooms, served
//! over WebSocket.
//!
//! # Architecture
//!
//! [`SessionCoordinator`] follows the Sans-IO pattern: it consumes
//! [`ServerEvent`]s and returns [`ServerAction`]s, never touching a socket.
//! [`Server`] is the production glue around it:
//!
//! - one coordinator task owns the coordinator and every connection's
//!   outbound queue, so transitions never run concurrently
//! - one reader and one writer task per connection
//! - one short-lived task per credential check, whose verdict re-enters the
//!   coordinator inbox
//!
//! # Components
//!
//! - [`ConnectionDirectory`]: connection -> session
//! - [`RoomIndex`]: room -> connections
//! - [`PresenceBroadcaster`]: rosters and room fan-out
//! - [`SessionCoordinator`]: the join/leave/message/typing state machine
//! - [`WebSocketTransport`]: TCP listener + WebSocket handshake
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod coordinator;
mod directory;
mod driver_error;
mod error;
mod executor;
mod presence;
mod room_index;
mod snapshot;
mod system_env;
mod transport;

use std::{net::SocketAddr, sync::Arc};

pub use coordinator::{
    AuthErrorPolicy, DriverConfig, LogLevel, ServerAction, ServerEvent, SessionCoordinator,
};
pub use directory::ConnectionDirectory;
pub use driver_error::DriverError;
pub use error::ServerError;
use executor::{ActionExecutor, Outgoing, RuntimeEvent};
use futures_util::{SinkExt, StreamExt};
use huddle_core::{ConnectionId, RoomRegistry};
use huddle_proto::InboundEvent;
pub use presence::{PresenceBroadcaster, SystemMessage};
pub use room_index::RoomIndex;
pub use snapshot::{PendingSnapshot, PresenceSnapshot};
pub use system_env::SystemEnv;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::tungstenite::{
    Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
pub use transport::WebSocketTransport;

/// Capacity of the coordinator inbox shared by all connections.
const INBOX_CAPACITY: usize = 1024;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000")
    pub bind_address: String,
    /// Outbound queue length per connection. A client that falls this far
    /// behind starts missing events.
    pub outbound_buffer: usize,
    /// Coordinator configuration (limits, error policy)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            outbound_buffer: 256,
            driver: DriverConfig::default(),
        }
    }
}

/// Production Huddle server.
///
/// Wraps [`SessionCoordinator`] with the WebSocket transport and the system
/// environment.
pub struct Server {
    coordinator: SessionCoordinator<SystemEnv>,
    transport: WebSocketTransport,
    registry: Arc<dyn RoomRegistry>,
    outbound_buffer: usize,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// `registry` answers every credential check.
    pub async fn bind(
        config: ServerRuntimeConfig,
        registry: Arc<dyn RoomRegistry>,
    ) -> Result<Self, ServerError> {
        if config.outbound_buffer == 0 {
            return Err(ServerError::Config("outbound buffer must be at least 1".to_string()));
        }

        let coordinator = SessionCoordinator::new(SystemEnv::new(), config.driver);
        let transport = WebSocketTransport::bind(&config.bind_address).await?;

        Ok(Self { coordinator, transport, registry, outbound_buffer: config.outbound_buffer })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections and processing events.
    ///
    /// Runs until the task is cancelled. Accept errors are logged and do not
    /// stop the server.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let Self { coordinator, transport, registry, outbound_buffer } = self;
        let (inbox, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let executor = ActionExecutor::new(registry, inbox.clone());

        tokio::spawn(run_coordinator(coordinator, executor, inbox_rx));

        let mut next_connection_id: u64 = 1;
        loop {
            match transport.accept().await {
                Ok((stream, peer)) => {
                    let connection_id = ConnectionId::new(next_connection_id);
                    next_connection_id += 1;
                    let inbox = inbox.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, peer, connection_id, inbox, outbound_buffer)
                                .await
                        {
                            tracing::debug!(%connection_id, "Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

/// Coordinator task: the only place presence state is touched.
async fn run_coordinator(
    mut coordinator: SessionCoordinator<SystemEnv>,
    mut executor: ActionExecutor,
    mut inbox: mpsc::Receiver<RuntimeEvent>,
) {
    while let Some(event) = inbox.recv().await {
        let event = match event {
            RuntimeEvent::Connected { connection_id, outbox } => {
                executor.register(connection_id, outbox);
                ServerEvent::ConnectionAccepted { connection_id }
            },
            RuntimeEvent::Driver(event) => event,
        };

        let closed = match &event {
            ServerEvent::ConnectionClosed { connection_id, .. } => Some(*connection_id),
            _ => None,
        };

        match coordinator.process_event(event) {
            Ok(actions) => executor.execute(actions),
            Err(e) => tracing::warn!("Event rejected: {}", e),
        }

        if let Some(connection_id) = closed {
            executor.unregister(connection_id);
        }
    }
}

/// Handle a single WebSocket connection.
///
/// Reads frames until the peer goes away, then reports the closure. Outbound
/// frames are written by a separate task draining the connection's outbox.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    connection_id: ConnectionId,
    inbox: mpsc::Sender<RuntimeEvent>,
    outbound_buffer: usize,
) -> Result<(), ServerError> {
    let ws = transport::upgrade(stream).await?;
    tracing::debug!(%connection_id, %peer, "WebSocket connection established");

    let (mut sink, mut source) = ws.split();
    let (outbox, mut outgoing) = mpsc::channel(outbound_buffer);

    inbox
        .send(RuntimeEvent::Connected { connection_id, outbox })
        .await
        .map_err(|_| ServerError::Internal("coordinator stopped".to_string()))?;

    tokio::spawn(async move {
        while let Some(item) = outgoing.recv().await {
            match item {
                Outgoing::Frame(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::debug!(%connection_id, "Write error: {}", e);
                        break;
                    }
                },
                Outgoing::Close(reason) => {
                    let frame = CloseFrame { code: CloseCode::Policy, reason: reason.into() };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!(%connection_id, "Close error: {}", e);
                    }
                    break;
                },
            }
        }

        if let Err(e) = sink.close().await {
            tracing::trace!(%connection_id, "Sink close error: {}", e);
        }
    });

    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => match InboundEvent::decode(text.as_str()) {
                Ok(event) => {
                    let event = ServerEvent::EventReceived { connection_id, event };
                    if inbox.send(RuntimeEvent::Driver(event)).await.is_err() {
                        break "coordinator stopped".to_string();
                    }
                },
                Err(e) if e.is_peer_error() => {
                    tracing::warn!(%connection_id, "Dropping undecodable frame: {}", e);
                },
                Err(e) => {
                    tracing::error!(%connection_id, "Dropping frame: {}", e);
                },
            },
            Some(Ok(Message::Binary(_))) => {
                tracing::warn!(%connection_id, "Dropping binary frame");
            },
            Some(Ok(Message::Close(_))) | None => break "closed by peer".to_string(),
            // Ping/pong are answered by tungstenite itself
            Some(Ok(_)) => {},
            Some(Err(e)) => break e.to_string(),
        }
    };

    inbox
        .send(RuntimeEvent::Driver(ServerEvent::ConnectionClosed { connection_id, reason }))
        .await
        .map_err(|_| ServerError::Internal("coordinator stopped".to_string()))
}
