//! # blescan-core
//!
//! Core model of the BLE scan/advertise controller.
//!
//! This crate provides:
//! - Data model types (RadioState, BdAddr, AdvertisementEvent)
//! - The radio state machine and the interrupt router that decodes raw
//!   scan results coming from the driver
//! - The critical-section guarded queue that hands interrupt-produced
//!   events over to the main loop
//! - The persistent store of scanned and stored devices, on top of an
//!   abstract blob storage
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! so the same logic runs on the microcontroller and on a Linux host.

pub mod model;
pub mod queue;
pub mod radio;
pub mod storage;
pub mod store;

pub use model::*;
pub use queue::DeferredEventQueue;
pub use radio::{AdvertisingData, BleRadio, InterruptRouter, RadioController, RadioError};
pub use storage::{BlobStorage, FileStorage, MemoryStorage, StorageError};
pub use store::{PersistentStore, ScannedDevice, ScannedDeviceMap, Snapshot, StoreError};
