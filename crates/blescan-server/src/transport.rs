//! Transport abstraction.
//!
//! The session layer only needs non-blocking accept/read/write/close; how
//! the bytes travel (WebSocket, raw TCP, an in-memory pipe in tests) is up
//! to the implementation.

use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer went away or the connection was closed locally.
    #[error("Connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One client connection.
pub trait Connection {
    /// Human readable peer identity, used in logs.
    fn peer(&self) -> String;

    /// Return whatever bytes arrived since the last call. An empty vector
    /// means nothing is available right now, not end of stream.
    fn read(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Send one text message.
    fn write(&mut self, text: &str) -> Result<(), TransportError>;

    /// Release the connection. Further reads and writes fail with
    /// [`TransportError::Closed`].
    fn close(&mut self);
}

/// Source of new connections.
pub trait Listener {
    type Connection: Connection;

    /// Next pending connection, or `None` when nobody is waiting.
    fn accept(&mut self) -> Result<Option<Self::Connection>, TransportError>;

    /// Port the listener is bound to.
    fn local_port(&self) -> u16;

    /// Stop listening.
    fn close(&mut self);
}
