//! Per-connection command session.
//!
//! A session owns its connection, the framing buffer and the queue its
//! radio handler feeds. The radio and the store live in [`Device`], which
//! the server lends to each session for the duration of a call.

use std::sync::Arc;

use blescan_core::radio::{AdvertisementHandler, DEFAULT_ADV_INTERVAL_MS};
use blescan_core::{
    DeferredEventQueue, PersistentStore, RadioController, RadioError, RadioState, ScannedDevice,
    StoreError,
};
use blescan_protocol::{
    decode_stored_devices, encode_stored_devices, CodecError, Command, LineFramer, Response,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::transport::{Connection, TransportError};

/// Process-wide hardware and persistent state.
///
/// There is one radio and one store per device; sessions borrow them.
pub struct Device {
    pub radio: RadioController,
    pub store: PersistentStore,
}

impl Device {
    pub fn new(radio: RadioController, store: PersistentStore) -> Self {
        Self { radio, store }
    }
}

/// Failure of a single command. Reported to the client; the session keeps
/// running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// Behaviour switches shared by all sessions of a server.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Record every drained scan result in the store's scanned-device map.
    pub persist_scanned: bool,
}

/// Server-side state of one client connection.
pub struct CommandSession<C: Connection> {
    id: u64,
    peer: String,
    connection: C,
    framer: LineFramer,
    pending: Arc<DeferredEventQueue>,
    /// Radio handler this session installed with its last `scan`.
    handler: Option<AdvertisementHandler>,
    state: SessionState,
    options: SessionOptions,
}

impl<C: Connection> CommandSession<C> {
    pub fn new(id: u64, connection: C, options: SessionOptions) -> Self {
        Self {
            id,
            peer: connection.peer(),
            connection,
            framer: LineFramer::new(),
            pending: Arc::new(DeferredEventQueue::new()),
            handler: None,
            state: SessionState::Open,
            options,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Scan results queued for this session and not yet sent.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Read available input and execute every complete command in it.
    pub fn process(&mut self, device: &mut Device) {
        if !self.is_open() {
            return;
        }
        let bytes = match self.connection.read() {
            Ok(bytes) => bytes,
            Err(TransportError::Closed) => {
                self.teardown(device);
                return;
            }
            Err(e) => {
                warn!("Read error from {}: {}", self.peer, e);
                self.teardown(device);
                return;
            }
        };
        if bytes.is_empty() {
            return;
        }

        for line in self.framer.push(&bytes) {
            let response = self.execute(&line, device);
            if !self.send(&response, device) {
                return;
            }
        }
    }

    /// Send a `new-device` line for every scan result queued since the
    /// last call.
    pub fn drain_events(&mut self, device: &mut Device) {
        if !self.is_open() {
            return;
        }
        let events = self.pending.drain_all();
        if events.is_empty() {
            return;
        }

        if self.options.persist_scanned {
            let observed = events.iter().map(|event| {
                (
                    event.address.to_string(),
                    ScannedDevice {
                        rssi: event.rssi as i32,
                        data: event.payload_hex(),
                    },
                )
            });
            if let Err(e) = device.store.merge_scanned(observed) {
                warn!("Failed to persist scan results: {}", e);
            }
        }

        for event in &events {
            if !self.send(&Response::new_device(event), device) {
                return;
            }
        }
    }

    /// Parse and run one request line, always producing a response.
    pub fn execute(&mut self, line: &str, device: &mut Device) -> Response {
        debug!("{} command: {:?}", self.peer, line);
        let response = match Command::parse(line) {
            Ok(command) => self
                .dispatch(command, device)
                .unwrap_or_else(|e| Response::error(e)),
            Err(e) => Response::from(e),
        };
        if response.is_error() {
            warn!("Command {:?} from {} failed: {}", line, self.peer, response);
        }
        debug!("{} return: {}", self.peer, response);
        response
    }

    fn dispatch(&mut self, command: Command, device: &mut Device) -> Result<Response, SessionError> {
        let response = match command {
            Command::Scan {
                duration_s,
                window_fraction,
            } => {
                let pending = self.pending.clone();
                self.handler = Some(device.radio.set_handler(move |event| pending.push(event)));
                device
                    .radio
                    .scan(duration_s.saturating_mul(1000), window_fraction)?;
                Response::Status(device.radio.state())
            }
            Command::Simulate { payload } => {
                device
                    .radio
                    .advertise(payload.as_str(), DEFAULT_ADV_INTERVAL_MS)?;
                Response::Status(device.radio.state())
            }
            Command::Stop => {
                device.radio.stop()?;
                Response::Status(device.radio.state())
            }
            Command::Status => Response::Status(device.radio.state()),
            Command::Store { blob: None } => {
                Response::StoredDevices(encode_stored_devices(device.store.stored())?)
            }
            Command::Store { blob: Some(blob) } => {
                let stored = decode_stored_devices(&blob)?;
                device.store.set_stored(stored)?;
                Response::Ok
            }
        };
        Ok(response)
    }

    /// Write one line; a failed write tears the session down.
    fn send(&mut self, response: &Response, device: &mut Device) -> bool {
        match self.connection.write(&response.to_string()) {
            Ok(()) => true,
            Err(TransportError::Closed) => {
                self.teardown(device);
                false
            }
            Err(e) => {
                error!("Failed to send to {}: {}", self.peer, e);
                self.teardown(device);
                false
            }
        }
    }

    /// Close the session from the server side.
    pub fn close(&mut self, device: &mut Device) {
        self.teardown(device);
    }

    fn teardown(&mut self, device: &mut Device) {
        if !self.is_open() {
            return;
        }
        info!("Client {} disconnected", self.peer);

        if device.radio.state() == RadioState::Scanning {
            if let Err(e) = device.radio.stop() {
                warn!("Failed to stop scan for {}: {}", self.peer, e);
            }
            device.radio.clear_handler();
        }
        // A later advertise leaves the scan running; stop routing its
        // results into this session's queue.
        if let Some(handler) = self.handler.take() {
            device.radio.clear_handler_if(&handler);
        }
        let dropped = self.pending.clear();
        if dropped > 0 {
            debug!("Dropped {} undelivered scan results for {}", dropped, self.peer);
        }
        self.framer.clear();
        self.connection.close();
        self.state = SessionState::Closed;
    }
}
