//! CoreBluetooth-style central role API on top of an Android-like BLE host stack.
//!
//! The host stack is reached through the [`transport::GattTransport`] trait and reports its
//! asynchronous completions back through the callback traits of the same module. On top of
//! it, [`CentralManager`] scans, connects and tracks peripherals, and each [`Peripheral`]
//! runs its GATT requests one at a time, as the radio stack requires. Results are delivered
//! to the application through [`CentralManagerDelegate`] and [`PeripheralDelegate`].
//!
//! The library only uses the `log` facade; install a logger to see its output.

pub use btuuid::BluetoothUuidExt;
pub use cbuuid::CbUuid;
pub use central::{CentralManager, CentralManagerConfig, ScanOptions};
pub use characteristic::Characteristic;
pub use delegate::{CentralManagerDelegate, PeripheralDelegate};
pub use descriptor::Descriptor;
pub use error::Error;
pub use peripheral::{Peripheral, DEFAULT_MTU};
pub use service::Service;

/// Convenience alias for a result with [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use uuid::Uuid;
pub mod btuuid;
pub mod error;
pub mod transport;
mod types;
pub use types::*;

mod async_util;
mod callback;
mod cbuuid;
mod central;
mod characteristic;
mod delegate;
mod descriptor;
mod gatt_tree;
mod operation_queue;
mod peripheral;
mod registry;
mod service;
mod util;

#[cfg(test)]
mod test_util;
