//! Data model types shared by the radio, the event queue and the protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest advertising payload carried by a scan result.
///
/// The raw record encodes the payload length in a single byte, so this is
/// also the upper bound of what a driver can report.
pub const MAX_ADV_DATA: usize = 255;

/// Fixed-capacity advertising payload, filled without touching the heap.
pub type AdvData = heapless::Vec<u8, MAX_ADV_DATA>;

/// Radio state. Exactly one at a time, owned by the radio controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioState {
    #[default]
    Idle,
    Scanning,
    Advertising,
}

impl RadioState {
    /// Name used on the wire (`status <state>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            RadioState::Idle => "idle",
            RadioState::Scanning => "scanning",
            RadioState::Advertising => "advertising",
        }
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 48-bit Bluetooth device address, in the order the driver reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for BdAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BdAddr {
    /// Lowercase, colon separated: `aa:bb:cc:dd:ee:ff`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// One advertisement observed during a scan.
///
/// Built in interrupt context, moved into a [`DeferredEventQueue`] and
/// consumed by the main loop.
///
/// [`DeferredEventQueue`]: crate::queue::DeferredEventQueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementEvent {
    pub address_type: u8,
    pub address: BdAddr,
    pub connectable: bool,
    pub rssi: i8,
    pub payload: AdvData,
}

impl AdvertisementEvent {
    /// Advertising payload as lowercase hex.
    pub fn payload_hex(&self) -> String {
        hex::encode(&self.payload)
    }
}
