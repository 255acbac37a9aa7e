//! BLE radio controller.
//!
//! [`RadioController`] owns the driver and the idle/scanning/advertising
//! state machine. Scan results arrive through the driver's interrupt
//! callback, are decoded by [`InterruptRouter`] and forwarded to whichever
//! advertisement handler is currently registered.

use crate::model::{AdvData, AdvertisementEvent, BdAddr, RadioState};
use critical_section::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Interrupt code for a single scan result.
pub const IRQ_SCAN_RESULT: u16 = 5;
/// Interrupt code raised when a scan has run for its full duration.
pub const IRQ_SCAN_DONE: u16 = 6;

/// Scan interval, fixed for every scan.
pub const SCAN_INTERVAL_US: u32 = 128_000;
pub const DEFAULT_SCAN_DURATION_MS: u32 = 10_000;
pub const DEFAULT_WINDOW_FRACTION: f32 = 0.1;
pub const DEFAULT_ADV_INTERVAL_MS: u32 = 100;

/// Advertising PDU types that accept connections (ADV_IND, ADV_DIRECT_IND).
const CONNECTABLE_ADV_TYPES: [u8; 2] = [0x00, 0x01];

/// Size of a raw scan-result record without its advertising data.
const SCAN_RESULT_HEADER: usize = 10;

/// Callback the driver invokes from interrupt context with an event code
/// and the raw event record.
pub type IrqCallback = Box<dyn Fn(u16, &[u8]) + Send + Sync + 'static>;

/// Receiver of decoded advertisements. Runs in interrupt context, so it
/// must only enqueue.
pub type AdvertisementHandler = Arc<dyn Fn(AdvertisementEvent) + Send + Sync + 'static>;

/// Errors raised by the radio controller or its driver.
#[derive(Debug, Error)]
pub enum RadioError {
    /// Advertising payload could not be decoded.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Scan window fraction outside (0, 1].
    #[error("Scan window fraction must be in (0, 1], got {0}")]
    InvalidWindowFraction(f32),

    /// The underlying driver rejected the request.
    #[error("Radio driver error: {0}")]
    Driver(String),
}

/// BLE radio driver.
///
/// Implemented by the platform (ESP-IDF on the device, a simulation on a
/// host) and by test doubles.
pub trait BleRadio: Send {
    /// Power the radio up or down.
    fn activate(&mut self, active: bool) -> Result<(), RadioError>;

    /// Whether the radio is powered.
    fn is_active(&self) -> bool;

    /// Start advertising `payload` every `interval_ms`, or stop advertising
    /// when `interval_ms` is `None`.
    fn advertise(&mut self, interval_ms: Option<u32>, payload: &[u8]) -> Result<(), RadioError>;

    /// Start a scan. A `duration_ms` of zero scans until the radio is stopped.
    fn scan(&mut self, duration_ms: u32, interval_us: u32, window_us: u32) -> Result<(), RadioError>;

    /// Install the interrupt callback, replacing any previous one.
    fn register_irq(&mut self, callback: IrqCallback);
}

/// Advertising payload as given by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisingData {
    /// Already encoded bytes.
    Raw(Vec<u8>),
    /// Hex string that must decode to the payload bytes.
    Hex(String),
}

impl AdvertisingData {
    pub fn into_bytes(self) -> Result<Vec<u8>, RadioError> {
        match self {
            AdvertisingData::Raw(bytes) => Ok(bytes),
            AdvertisingData::Hex(text) => {
                hex::decode(text.trim()).map_err(|e| RadioError::InvalidPayload(e.to_string()))
            }
        }
    }
}

impl From<Vec<u8>> for AdvertisingData {
    fn from(bytes: Vec<u8>) -> Self {
        AdvertisingData::Raw(bytes)
    }
}

impl From<&[u8]> for AdvertisingData {
    fn from(bytes: &[u8]) -> Self {
        AdvertisingData::Raw(bytes.to_vec())
    }
}

impl From<&str> for AdvertisingData {
    fn from(text: &str) -> Self {
        AdvertisingData::Hex(text.to_string())
    }
}

impl From<String> for AdvertisingData {
    fn from(text: String) -> Self {
        AdvertisingData::Hex(text)
    }
}

/// Decode a raw scan-result record.
///
/// Layout: address type (1), address (6), advertising PDU type (1),
/// rssi as i8 (1), data length (1), data. Returns `None` for truncated
/// records. Never allocates.
pub fn decode_scan_result(data: &[u8]) -> Option<AdvertisementEvent> {
    if data.len() < SCAN_RESULT_HEADER {
        return None;
    }
    let len = data[9] as usize;
    let adv = data.get(SCAN_RESULT_HEADER..SCAN_RESULT_HEADER + len)?;

    let mut address = [0u8; 6];
    address.copy_from_slice(&data[1..7]);

    Some(AdvertisementEvent {
        address_type: data[0],
        address: BdAddr::new(address),
        connectable: CONNECTABLE_ADV_TYPES.contains(&data[7]),
        rssi: data[8] as i8,
        payload: AdvData::from_slice(adv).ok()?,
    })
}

/// Encode a raw scan-result record, as a driver would deliver it.
pub fn encode_scan_result(
    address_type: u8,
    address: [u8; 6],
    adv_type: u8,
    rssi: i8,
    adv_data: &[u8],
) -> Vec<u8> {
    let len = adv_data.len().min(u8::MAX as usize);
    let mut record = Vec::with_capacity(SCAN_RESULT_HEADER + len);
    record.push(address_type);
    record.extend_from_slice(&address);
    record.push(adv_type);
    record.push(rssi as u8);
    record.push(len as u8);
    record.extend_from_slice(&adv_data[..len]);
    record
}

/// Routes driver interrupts to the registered advertisement handler.
///
/// Shared between the controller (main loop) and the driver callback
/// (interrupt context). The handler slot is read and written only inside a
/// critical section; the handler itself is invoked outside of it.
pub struct InterruptRouter {
    handler: Mutex<RefCell<Option<AdvertisementHandler>>>,
    dropped: AtomicU32,
}

impl InterruptRouter {
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(RefCell::new(None)),
            dropped: AtomicU32::new(0),
        }
    }

    /// Entry point for the driver's interrupt callback.
    ///
    /// Only scan results are decoded and forwarded; every other event code
    /// is ignored.
    pub fn on_interrupt(&self, event_code: u16, data: &[u8]) {
        if event_code != IRQ_SCAN_RESULT {
            return;
        }
        let Some(event) = decode_scan_result(data) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let handler = critical_section::with(|cs| self.handler.borrow_ref(cs).clone());
        if let Some(handler) = handler {
            handler(event);
        }
    }

    fn set_handler(&self, handler: Option<AdvertisementHandler>) {
        critical_section::with(|cs| {
            *self.handler.borrow_ref_mut(cs) = handler;
        });
    }

    fn has_handler(&self) -> bool {
        critical_section::with(|cs| self.handler.borrow_ref(cs).is_some())
    }

    fn clear_handler_if(&self, handler: &AdvertisementHandler) -> bool {
        critical_section::with(|cs| {
            let mut slot = self.handler.borrow_ref_mut(cs);
            let owned = slot
                .as_ref()
                .is_some_and(|current| same_handler(current, handler));
            if owned {
                *slot = None;
            }
            owned
        })
    }

    /// Number of truncated scan-result records dropped so far.
    pub fn dropped_records(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn same_handler(a: &AdvertisementHandler, b: &AdvertisementHandler) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

impl Default for InterruptRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// The radio state machine.
///
/// There is a single physical radio, so one controller exists per process.
/// State changes only as a direct result of the calls below; a scan that
/// ends in hardware leaves the state at `Scanning` until `stop` is called.
pub struct RadioController {
    driver: Box<dyn BleRadio>,
    state: RadioState,
    router: Arc<InterruptRouter>,
}

impl RadioController {
    /// Take ownership of the driver and make sure the radio starts powered
    /// down.
    pub fn new(driver: impl BleRadio + 'static) -> Result<Self, RadioError> {
        let mut driver: Box<dyn BleRadio> = Box::new(driver);
        driver.activate(false)?;
        Ok(Self {
            driver,
            state: RadioState::Idle,
            router: Arc::new(InterruptRouter::new()),
        })
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Router the driver callback forwards to.
    pub fn router(&self) -> Arc<InterruptRouter> {
        self.router.clone()
    }

    /// Broadcast `data` every `interval_ms`.
    ///
    /// A hex payload that does not decode fails with
    /// [`RadioError::InvalidPayload`] before the radio is touched.
    pub fn advertise(
        &mut self,
        data: impl Into<AdvertisingData>,
        interval_ms: u32,
    ) -> Result<(), RadioError> {
        let payload = data.into().into_bytes()?;
        if !self.driver.is_active() {
            self.driver.activate(true)?;
        }
        self.driver.advertise(Some(interval_ms), &payload)?;
        self.state = RadioState::Advertising;
        info!(
            "Advertising {} bytes every {} ms",
            payload.len(),
            interval_ms
        );
        Ok(())
    }

    /// Scan for `duration_ms`, listening `window_fraction` of every
    /// interval.
    pub fn scan(&mut self, duration_ms: u32, window_fraction: f32) -> Result<(), RadioError> {
        if !(window_fraction > 0.0 && window_fraction <= 1.0) {
            return Err(RadioError::InvalidWindowFraction(window_fraction));
        }
        let window_us = ((SCAN_INTERVAL_US as f64 * window_fraction as f64).round() as u32).max(1);

        self.driver.activate(true)?;
        let router = self.router.clone();
        self.driver
            .register_irq(Box::new(move |code: u16, data: &[u8]| {
                router.on_interrupt(code, data)
            }));
        self.driver.scan(duration_ms, SCAN_INTERVAL_US, window_us)?;
        self.state = RadioState::Scanning;
        info!(
            "Scanning for {} ms (interval {} us, window {} us)",
            duration_ms, SCAN_INTERVAL_US, window_us
        );
        Ok(())
    }

    /// Replace the advertisement handler. Last writer wins.
    ///
    /// Returns the installed handler, which identifies this registration
    /// for [`clear_handler_if`](Self::clear_handler_if).
    pub fn set_handler<F>(&mut self, handler: F) -> AdvertisementHandler
    where
        F: Fn(AdvertisementEvent) + Send + Sync + 'static,
    {
        let handler: AdvertisementHandler = Arc::new(handler);
        self.router.set_handler(Some(handler.clone()));
        handler
    }

    /// Remove the advertisement handler; later scan results are discarded.
    pub fn clear_handler(&mut self) {
        self.router.set_handler(None);
    }

    /// Remove the handler only if `handler` is still the registered one.
    /// Returns whether it was removed.
    pub fn clear_handler_if(&mut self, handler: &AdvertisementHandler) -> bool {
        self.router.clear_handler_if(handler)
    }

    pub fn has_handler(&self) -> bool {
        self.router.has_handler()
    }

    /// Stop advertising and power the radio down. Idempotent.
    pub fn stop(&mut self) -> Result<(), RadioError> {
        self.driver.advertise(None, &[])?;
        self.driver.activate(false)?;
        if self.state != RadioState::Idle {
            debug!("Radio stopped (was {})", self.state);
        }
        self.state = RadioState::Idle;
        Ok(())
    }
}
