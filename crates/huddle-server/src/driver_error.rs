//! Coordinator error types.
//!
//! Returned by [`SessionCoordinator::process_event`](crate::SessionCoordinator)
//! when the runtime hands it an event that does not fit the connection table.
//! Both are runtime bugs or races, never client faults, and neither is fatal:
//! the runtime logs them and keeps going.

use huddle_core::ConnectionId;
use thiserror::Error;

/// Errors from driving the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Event for a connection that was never accepted or is already closed.
    ///
    /// Usually a late event racing a disconnect. Dropping it is correct.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Accept for a connection id that is already live.
    ///
    /// Connection ids must be unique for the lifetime of the process.
    #[error("connection already exists: {0}")]
    ConnectionAlreadyExists(ConnectionId),
}
