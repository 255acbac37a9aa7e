//! Simulated radio for hosts without BLE hardware.
//!
//! A scan starts a background thread that raises scan-result interrupts for
//! a handful of made-up peripherals, then a scan-done interrupt when the
//! duration runs out. Starting another scan or powering down ends the
//! previous thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use blescan_core::radio::{encode_scan_result, IrqCallback, IRQ_SCAN_DONE, IRQ_SCAN_RESULT};
use blescan_core::{BleRadio, RadioError};
use tracing::debug;

/// Address, base RSSI and advertising data of each simulated peripheral.
const PERIPHERALS: [([u8; 6], i8, &[u8]); 3] = [
    (
        [0xc4, 0x7c, 0x8d, 0x6a, 0x10, 0x01],
        -48,
        &[0x02, 0x01, 0x06, 0x05, 0x09, b'T', b'a', b'g', b'1'],
    ),
    (
        [0xe2, 0x15, 0x3a, 0x90, 0x22, 0x7f],
        -67,
        &[0x02, 0x01, 0x06, 0x03, 0x03, 0x0f, 0x18],
    ),
    ([0x5d, 0x01, 0xaa, 0x42, 0x0b, 0xe9], -82, &[0x02, 0x01, 0x1a]),
];

struct Shared {
    active: AtomicBool,
    /// Bumped on every scan and power change; a scan thread exits once it
    /// no longer matches.
    generation: AtomicU64,
    irq: Mutex<Option<Arc<IrqCallback>>>,
}

impl Shared {
    fn raise(&self, code: u16, data: &[u8]) {
        let irq = match self.irq.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => return,
        };
        if let Some(irq) = irq {
            irq(code, data);
        }
    }
}

/// Host stand-in for the BLE driver.
pub struct SimulatedRadio {
    shared: Arc<Shared>,
    period: Duration,
}

impl SimulatedRadio {
    /// `period` is the delay between two simulated scan results.
    pub fn new(period: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                irq: Mutex::new(None),
            }),
            period,
        }
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

impl BleRadio for SimulatedRadio {
    fn activate(&mut self, active: bool) -> Result<(), RadioError> {
        self.shared.active.store(active, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    fn advertise(&mut self, interval_ms: Option<u32>, payload: &[u8]) -> Result<(), RadioError> {
        if !self.is_active() && interval_ms.is_some() {
            return Err(RadioError::Driver("radio is not active".to_string()));
        }
        match interval_ms {
            Some(interval) => debug!(
                "Simulated advertising of {} bytes every {} ms",
                payload.len(),
                interval
            ),
            None => debug!("Simulated advertising stopped"),
        }
        Ok(())
    }

    fn scan(&mut self, duration_ms: u32, interval_us: u32, window_us: u32) -> Result<(), RadioError> {
        if !self.is_active() {
            return Err(RadioError::Driver("radio is not active".to_string()));
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = self.shared.clone();
        let period = self.period;
        let deadline = (duration_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(duration_ms as u64));
        debug!(
            "Simulated scan for {} ms (interval {} us, window {} us)",
            duration_ms, interval_us, window_us
        );

        thread::Builder::new()
            .name("sim-scan".to_string())
            .spawn(move || scan_loop(shared, generation, period, deadline))
            .map_err(|e| RadioError::Driver(e.to_string()))?;
        Ok(())
    }

    fn register_irq(&mut self, callback: IrqCallback) {
        if let Ok(mut slot) = self.shared.irq.lock() {
            *slot = Some(Arc::new(callback));
        }
    }
}

fn scan_loop(shared: Arc<Shared>, generation: u64, period: Duration, deadline: Option<Instant>) {
    let current = || shared.generation.load(Ordering::SeqCst) == generation;
    let mut tick: usize = 0;
    loop {
        thread::sleep(period);
        if !current() {
            return;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            shared.raise(IRQ_SCAN_DONE, &[]);
            return;
        }
        let (address, rssi, data) = PERIPHERALS[tick % PERIPHERALS.len()];
        let jitter = (tick % 7) as i8 - 3;
        shared.raise(
            IRQ_SCAN_RESULT,
            &encode_scan_result(0, address, 0x00, rssi.saturating_add(jitter), data),
        );
        tick = tick.wrapping_add(1);
    }
}
