//! # blescan-server
//!
//! Tick-driven session server for the BLE controller.
//!
//! A single thread calls [`SessionServer::process_tick`] in a loop. Each
//! tick accepts pending connections, then lets every session handle its
//! input and push the scan results its radio handler queued since the last
//! tick. The radio and the store are owned by the server and lent to each
//! session in turn.
//!
//! Enable features based on target platform:
//! - `tokio-runtime` (default) - WebSocket transport for Linux/desktop

pub mod server;
pub mod session;
pub mod transport;

#[cfg(feature = "tokio-runtime")]
pub mod ws;

pub use blescan_core::{PersistentStore, RadioController, RadioState};
pub use server::{ServerConfig, ServerError, SessionServer};
pub use session::{CommandSession, Device, SessionError, SessionOptions, SessionState};
pub use transport::{Connection, Listener, TransportError};

#[cfg(feature = "tokio-runtime")]
pub use ws::{WsConnection, WsListener};
