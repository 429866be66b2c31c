//! WebSocket transport over TCP.
//!
//! Accepts TCP connections and performs the WebSocket handshake. Each
//! upgraded connection carries one JSON event per text frame, see
//! [`huddle_proto`].

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;

use crate::error::ServerError;

/// Listening WebSocket endpoint.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Bind to `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if the address does not parse
    /// - `ServerError::Transport` if the socket cannot be bound
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("WebSocket transport bound to {}", listener.local_addr()?);

        Ok(Self { listener })
    }

    /// Accept the next TCP connection.
    ///
    /// The handshake is not performed here so that a slow client cannot stall
    /// the accept loop. Call [`upgrade`] from the connection task.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

/// Perform the server side of the WebSocket handshake.
pub async fn upgrade(stream: TcpStream) -> Result<WebSocketStream<TcpStream>, ServerError> {
    Ok(tokio_tungstenite::accept_async(stream).await?)
}
