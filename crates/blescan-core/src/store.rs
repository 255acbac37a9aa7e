//! Persistent device store.
//!
//! Holds two collections that survive a restart:
//! - the scanned-device map (address -> last rssi and payload)
//! - the stored-device list, an opaque JSON value owned by the client
//!
//! Both are written together as one JSON document:
//!
//! ```json
//! {"scanned": {"aa:bb:cc:dd:ee:ff": {"rssi": -60, "data": "020106"}}, "stored": []}
//! ```

use crate::storage::{BlobStorage, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Default blob name of the store document.
pub const STORE_FILE: &str = "ble.json";

/// Last observation of a scanned device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedDevice {
    pub rssi: i32,
    /// Advertising payload as lowercase hex.
    pub data: String,
}

/// Scanned devices keyed by address string.
pub type ScannedDeviceMap = BTreeMap<String, ScannedDevice>;

/// Everything the store persists, serialized as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scanned: ScannedDeviceMap,
    pub stored: Value,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            scanned: ScannedDeviceMap::new(),
            stored: Value::Array(Vec::new()),
        }
    }
}

/// Errors raised while persisting or reading the store document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to encode store: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode store: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Scanned and stored devices, mirrored to durable storage.
///
/// Every setter saves synchronously; getters never touch storage.
pub struct PersistentStore {
    storage: Box<dyn BlobStorage>,
    name: String,
    snapshot: Snapshot,
}

impl PersistentStore {
    /// Open the store document `name` and load it.
    ///
    /// A missing or unreadable document yields an empty store.
    pub fn open(storage: impl BlobStorage + 'static, name: &str) -> Self {
        let mut store = Self {
            storage: Box::new(storage),
            name: name.to_string(),
            snapshot: Snapshot::default(),
        };
        store.load();
        store
    }

    /// Reload from storage, falling back to empty collections on any
    /// failure.
    pub fn load(&mut self) {
        self.snapshot = match self.read_snapshot() {
            Ok(snapshot) => {
                debug!(
                    "Loaded {} ({} scanned devices)",
                    self.name,
                    snapshot.scanned.len()
                );
                snapshot
            }
            Err(StoreError::Storage(StorageError::NotFound(_))) => {
                debug!("No {} yet, starting empty", self.name);
                Snapshot::default()
            }
            Err(e) => {
                warn!("Could not load {}, starting empty: {}", self.name, e);
                Snapshot::default()
            }
        };
    }

    fn read_snapshot(&self) -> Result<Snapshot, StoreError> {
        let bytes = self.storage.read_all(&self.name)?;
        serde_json::from_slice(&bytes).map_err(StoreError::Decode)
    }

    /// Write both collections.
    pub fn save(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&self.snapshot).map_err(StoreError::Encode)?;
        self.storage.write_all(&self.name, &bytes)?;
        Ok(())
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn scanned(&self) -> &ScannedDeviceMap {
        &self.snapshot.scanned
    }

    pub fn set_scanned(&mut self, scanned: ScannedDeviceMap) -> Result<(), StoreError> {
        self.snapshot.scanned = scanned;
        self.save()
    }

    /// Record a batch of observations, overwriting earlier entries for the
    /// same address, and save once.
    pub fn merge_scanned<I>(&mut self, devices: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (String, ScannedDevice)>,
    {
        let before = self.snapshot.scanned.clone();
        self.snapshot.scanned.extend(devices);
        if self.snapshot.scanned == before {
            return Ok(());
        }
        self.save()
    }

    pub fn stored(&self) -> &Value {
        &self.snapshot.stored
    }

    /// Replace the stored-device list.
    pub fn set_stored(&mut self, stored: Value) -> Result<(), StoreError> {
        self.snapshot.stored = stored;
        self.save()
    }
}
