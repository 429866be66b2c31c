//! Action execution for the production runtime.
//!
//! The coordinator task owns one [`ActionExecutor`]. It turns
//! [`ServerAction`]s into queued frames on per-connection outboxes and spawns
//! credential checks whose verdicts come back through the coordinator inbox.
//!
//! Delivery never blocks the coordinator: outboxes are bounded and filled with
//! `try_send`. A full or closed outbox is a [`TransportError`] for that one
//! recipient, logged, and the remaining recipients are still served.

use std::{collections::HashMap, sync::Arc};

use huddle_core::{ConnectionId, RoomRegistry, TransportError};
use huddle_proto::OutboundEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::{LogLevel, ServerAction, ServerEvent};

/// Item queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outgoing {
    /// Encoded event, shared between all recipients of a broadcast
    Frame(Utf8Bytes),
    /// Send a close frame and stop writing
    Close(String),
}

/// Message into the coordinator task.
#[derive(Debug)]
pub(crate) enum RuntimeEvent {
    /// Connection upgraded, its writer listens on `outbox`
    Connected {
        /// Id assigned by the accept loop
        connection_id: ConnectionId,
        /// Queue drained by the connection's writer task
        outbox: mpsc::Sender<Outgoing>,
    },
    /// Event for the coordinator
    Driver(ServerEvent),
}

/// Executes coordinator actions against live connections.
pub(crate) struct ActionExecutor {
    outboxes: HashMap<ConnectionId, mpsc::Sender<Outgoing>>,
    registry: Arc<dyn RoomRegistry>,
    inbox: mpsc::Sender<RuntimeEvent>,
}

impl ActionExecutor {
    pub(crate) fn new(registry: Arc<dyn RoomRegistry>, inbox: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { outboxes: HashMap::new(), registry, inbox }
    }

    pub(crate) fn register(&mut self, connection_id: ConnectionId, outbox: mpsc::Sender<Outgoing>) {
        self.outboxes.insert(connection_id, outbox);
    }

    /// Forget a connection. Dropping its outbox stops the writer task.
    pub(crate) fn unregister(&mut self, connection_id: ConnectionId) {
        self.outboxes.remove(&connection_id);
    }

    pub(crate) fn execute(&mut self, actions: Vec<ServerAction>) {
        for action in actions {
            match action {
                ServerAction::SendToConnection { connection_id, event } => {
                    let result =
                        encode(&event).and_then(|frame| self.deliver(connection_id, frame));
                    if let Err(e) = result {
                        tracing::warn!(
                            %connection_id,
                            event = event.name(),
                            error = %e,
                            "send failed"
                        );
                    }
                },

                ServerAction::BroadcastToRoom { room_id, recipients, event } => {
                    let frame = match encode(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!(
                                %room_id,
                                event = event.name(),
                                error = %e,
                                "broadcast dropped"
                            );
                            continue;
                        },
                    };

                    for connection_id in recipients {
                        if let Err(e) = self.deliver(connection_id, frame.clone()) {
                            tracing::warn!(
                                %room_id,
                                %connection_id,
                                event = event.name(),
                                error = %e,
                                "broadcast delivery failed"
                            );
                        }
                    }
                },

                ServerAction::VerifyCredentials { connection_id, ticket, room_id, password } => {
                    let registry = Arc::clone(&self.registry);
                    let inbox = self.inbox.clone();

                    tokio::spawn(async move {
                        let result =
                            registry.verify_room_credentials(&room_id, password.expose()).await;
                        let verdict =
                            ServerEvent::CredentialsVerified { connection_id, ticket, result };
                        if inbox.send(RuntimeEvent::Driver(verdict)).await.is_err() {
                            tracing::debug!(%connection_id, "coordinator stopped before verdict");
                        }
                    });
                },

                ServerAction::CloseConnection { connection_id, reason } => {
                    tracing::info!("Closing connection {}: {}", connection_id, reason);
                    if let Some(outbox) = self.outboxes.remove(&connection_id) {
                        if outbox.try_send(Outgoing::Close(reason)).is_err() {
                            tracing::debug!(%connection_id, "writer gone before close");
                        }
                    }
                },

                ServerAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }

    fn deliver(&self, connection_id: ConnectionId, frame: Utf8Bytes) -> Result<(), TransportError> {
        let outbox =
            self.outboxes.get(&connection_id).ok_or(TransportError::ConnectionGone(connection_id))?;

        outbox.try_send(Outgoing::Frame(frame)).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull(connection_id),
            TrySendError::Closed(_) => TransportError::ConnectionGone(connection_id),
        })
    }

    #[cfg(test)]
    fn outbox_count(&self) -> usize {
        self.outboxes.len()
    }
}

fn encode(event: &OutboundEvent) -> Result<Utf8Bytes, TransportError> {
    event.encode().map(Utf8Bytes::from).map_err(|e| TransportError::Encode(e.to_string()))
}
