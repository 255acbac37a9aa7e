//! Session server.
//!
//! This module provides the tick-driven server that handles:
//! - Accepting connections up to the configured limit
//! - Per-session input processing and scan result delivery
//! - Shutdown of every session and the listener

use blescan_protocol::{validate_command_table, CommandError};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::session::{CommandSession, Device, SessionOptions};
use crate::transport::Listener;

/// Configuration for the session server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name used in logs.
    pub name: String,
    /// Port the transport listens on.
    pub port: u16,
    /// Simultaneous connections; further clients wait in the listener.
    pub max_connections: usize,
    /// Persist scan results into the store as they are delivered.
    pub persist_scanned: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "blescan-server".to_string(),
            port: 55555,
            max_connections: 5,
            persist_scanned: false,
        }
    }
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid command table: {0}")]
    CommandTable(#[from] CommandError),
}

/// Owns the listener, the live sessions and the device they share.
pub struct SessionServer<L: Listener> {
    config: ServerConfig,
    listener: L,
    device: Device,
    sessions: Vec<CommandSession<L::Connection>>,
    next_id: u64,
}

impl<L: Listener> SessionServer<L> {
    /// Start serving on an already bound listener.
    pub fn start(config: ServerConfig, device: Device, listener: L) -> Result<Self, ServerError> {
        validate_command_table()?;
        info!(
            "{} listening on port {} (max {} connections)",
            config.name,
            listener.local_port(),
            config.max_connections
        );
        Ok(Self {
            config,
            listener,
            device,
            sessions: Vec::new(),
            next_id: 1,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    /// Live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// One round of work: accept, then for every session in order handle
    /// input and deliver queued scan results.
    pub fn process_tick(&mut self) {
        self.accept_pending();

        for session in &mut self.sessions {
            session.process(&mut self.device);
            session.drain_events(&mut self.device);
        }
        self.sessions.retain(|session| session.is_open());
    }

    fn accept_pending(&mut self) {
        while self.sessions.len() < self.config.max_connections {
            match self.listener.accept() {
                Ok(Some(connection)) => {
                    let id = self.next_id;
                    self.next_id += 1;
                    let session = CommandSession::new(
                        id,
                        connection,
                        SessionOptions {
                            persist_scanned: self.config.persist_scanned,
                        },
                    );
                    info!("New connection from {} (session {})", session.peer(), id);
                    self.sessions.push(session);
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    break;
                }
            }
        }
    }

    /// Close every session and the listener.
    pub fn stop(&mut self) {
        for session in &mut self.sessions {
            session.close(&mut self.device);
        }
        debug!("Closed {} sessions", self.sessions.len());
        self.sessions.clear();
        self.listener.close();
        info!("{} stopped", self.config.name);
    }
}
