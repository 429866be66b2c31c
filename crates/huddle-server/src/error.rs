//! Runtime error types.

use thiserror::Error;

use crate::driver_error::DriverError;

/// Errors that can occur in the server runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad room seed, etc.).
    ///
    /// Fatal, prevents startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, handshake failure, I/O error).
    ///
    /// Fatal when binding, confined to one connection afterwards.
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal error (coordinator task gone, logic bug).
    ///
    /// Should never happen in a correct implementation.
    #[error("internal error: {0}")]
    Internal(String),

    /// Coordinator rejected an event. See [`DriverError`].
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use huddle_core::ConnectionId;

    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("invalid bind address 'nope'".to_string());
        assert_eq!(err.to_string(), "configuration error: invalid bind address 'nope'");

        let err = ServerError::from(DriverError::ConnectionNotFound(ConnectionId::new(3)));
        assert_eq!(err.to_string(), "driver error: connection not found: conn-3");

        let err = ServerError::from(std::io::Error::other("refused"));
        assert!(matches!(err, ServerError::Transport(_)));
    }
}
