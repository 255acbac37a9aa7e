//! Test doubles shared by the server integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use blescan_core::radio::{encode_scan_result, IrqCallback, IRQ_SCAN_RESULT};
use blescan_core::store::STORE_FILE;
use blescan_core::{BleRadio, MemoryStorage, PersistentStore, RadioController, RadioError};
use blescan_server::{Connection, Device, Listener, TransportError};

// ============================================================================
// Radio
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RadioCall {
    Activate(bool),
    Advertise(Option<u32>, Vec<u8>),
    Scan(u32, u32, u32),
}

#[derive(Default)]
struct RadioLog {
    calls: Vec<RadioCall>,
    active: bool,
    irq: Option<Arc<IrqCallback>>,
}

/// Radio driver that records calls and can raise scan-result interrupts.
#[derive(Clone, Default)]
pub struct RecordingRadio(Arc<Mutex<RadioLog>>);

impl RecordingRadio {
    pub fn calls(&self) -> Vec<RadioCall> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn is_powered(&self) -> bool {
        self.0.lock().unwrap().active
    }

    /// Raise a scan-result interrupt the way the hardware would.
    pub fn advertisement(&self, address: [u8; 6], rssi: i8, data: &[u8]) {
        let irq = self.0.lock().unwrap().irq.clone();
        if let Some(irq) = irq {
            irq(IRQ_SCAN_RESULT, &encode_scan_result(0, address, 0x00, rssi, data));
        }
    }
}

impl BleRadio for RecordingRadio {
    fn activate(&mut self, active: bool) -> Result<(), RadioError> {
        let mut log = self.0.lock().unwrap();
        log.active = active;
        log.calls.push(RadioCall::Activate(active));
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.0.lock().unwrap().active
    }

    fn advertise(&mut self, interval_ms: Option<u32>, payload: &[u8]) -> Result<(), RadioError> {
        self.0
            .lock()
            .unwrap()
            .calls
            .push(RadioCall::Advertise(interval_ms, payload.to_vec()));
        Ok(())
    }

    fn scan(&mut self, duration_ms: u32, interval_us: u32, window_us: u32) -> Result<(), RadioError> {
        self.0
            .lock()
            .unwrap()
            .calls
            .push(RadioCall::Scan(duration_ms, interval_us, window_us));
        Ok(())
    }

    fn register_irq(&mut self, callback: IrqCallback) {
        self.0.lock().unwrap().irq = Some(Arc::new(callback));
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
struct Pipe {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<String>,
    client_gone: bool,
    closed: bool,
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    peer: String,
    pipe: Arc<Mutex<Pipe>>,
}

/// Client side of an in-memory connection.
#[derive(Clone)]
pub struct Client {
    pipe: Arc<Mutex<Pipe>>,
}

impl Client {
    pub fn send(&self, bytes: &[u8]) {
        self.pipe.lock().unwrap().inbound.push_back(bytes.to_vec());
    }

    /// Everything the server wrote since the last call.
    pub fn take_replies(&self) -> Vec<String> {
        std::mem::take(&mut self.pipe.lock().unwrap().outbound)
    }

    pub fn disconnect(&self) {
        self.pipe.lock().unwrap().client_gone = true;
    }

    pub fn is_closed_by_server(&self) -> bool {
        self.pipe.lock().unwrap().closed
    }
}

impl Connection for MemoryConnection {
    fn peer(&self) -> String {
        self.peer.clone()
    }

    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut pipe = self.pipe.lock().unwrap();
        if pipe.closed || pipe.client_gone {
            return Err(TransportError::Closed);
        }
        Ok(pipe.inbound.pop_front().unwrap_or_default())
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        let mut pipe = self.pipe.lock().unwrap();
        if pipe.closed || pipe.client_gone {
            return Err(TransportError::Closed);
        }
        pipe.outbound.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.pipe.lock().unwrap().closed = true;
    }
}

/// Listener fed by [`Connector::connect`].
pub struct MemoryListener {
    pending: Arc<Mutex<VecDeque<MemoryConnection>>>,
}

#[derive(Clone)]
pub struct Connector {
    pending: Arc<Mutex<VecDeque<MemoryConnection>>>,
    count: Arc<Mutex<u32>>,
}

impl Connector {
    pub fn connect(&self) -> Client {
        let pipe = Arc::new(Mutex::new(Pipe::default()));
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.pending.lock().unwrap().push_back(MemoryConnection {
            peer: format!("client-{}", *count),
            pipe: pipe.clone(),
        });
        Client { pipe }
    }

    pub fn waiting(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

pub fn memory_listener() -> (MemoryListener, Connector) {
    let pending = Arc::new(Mutex::new(VecDeque::new()));
    (
        MemoryListener {
            pending: pending.clone(),
        },
        Connector {
            pending,
            count: Arc::new(Mutex::new(0)),
        },
    )
}

impl Listener for MemoryListener {
    type Connection = MemoryConnection;

    fn accept(&mut self) -> Result<Option<MemoryConnection>, TransportError> {
        Ok(self.pending.lock().unwrap().pop_front())
    }

    fn local_port(&self) -> u16 {
        0
    }

    fn close(&mut self) {
        self.pending.lock().unwrap().clear();
    }
}

// ============================================================================
// Device
// ============================================================================

pub fn device(radio: &RecordingRadio, storage: &MemoryStorage) -> Device {
    Device::new(
        RadioController::new(radio.clone()).unwrap(),
        PersistentStore::open(storage.clone(), STORE_FILE),
    )
}
