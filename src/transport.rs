//! The contract between this crate and the host BLE stack.
//!
//! The host stack drives the radio. It is called through [`GattTransport`] and reports
//! completions back through [`GattCallback`], [`ScanCallback`] and [`BroadcastReceiver`],
//! possibly from its own threads and possibly in parallel. Fallible calls return an
//! error only when the stack rejects the request synchronously.

use std::fmt;
use std::sync::Arc;

use crate::service::Service;
use crate::types::{
    BondState, Capability, ConnectionState, DeviceAddress, GattStatus, ManagerState, WriteType,
};
use crate::{CbUuid, Result};

/// One GATT connection owned by the host stack, tagged with the address of its device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    id: u64,
    address: DeviceAddress,
}

impl ConnectionHandle {
    pub fn new(id: u64, address: DeviceAddress) -> Self {
        Self { id, address }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.id)
    }
}

/// Identifies a registered [`BroadcastReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(pub u64);

/// Power/latency trade-off of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanMode {
    LowPower,
    #[default]
    Balanced,
    LowLatency,
}

/// Whether every advertisement or only the first one of each device is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanCallbackType {
    AllMatches,
    FirstMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanSettings {
    pub scan_mode: ScanMode,
    pub callback_type: ScanCallbackType,
}

/// A scan filter; the stack reports devices matching any of the filters it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub service_uuid: Option<CbUuid>,
    pub service_solicitation_uuid: Option<CbUuid>,
}

/// One advertisement reported by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub address: DeviceAddress,
    pub device_name: Option<String>,
    pub rssi: i16,
    /// Raw TX power level; `i32::MIN` means the device did not report one.
    pub tx_power_level: i32,
    pub service_uuids: Option<Vec<CbUuid>>,
    pub is_connectable: bool,
}

/// Operations the host BLE stack provides.
pub trait GattTransport: Send + Sync {
    /// Checks a runtime permission.
    fn has_capability(&self, capability: Capability) -> bool;

    fn adapter_state(&self) -> ManagerState;

    fn start_scan(
        &self,
        filters: &[ScanFilter],
        settings: &ScanSettings,
        callback: Arc<dyn ScanCallback>,
    ) -> Result<()>;

    fn stop_scan(&self) -> Result<()>;

    /// Starts connecting to the device; completion is reported through `callback`.
    fn connect(
        &self,
        address: &DeviceAddress,
        auto_connect: bool,
        callback: Arc<dyn GattCallback>,
    ) -> Result<ConnectionHandle>;

    fn disconnect(&self, gatt: &ConnectionHandle);

    /// Releases every resource held for the connection.
    fn close(&self, gatt: &ConnectionHandle);

    fn discover_services(&self, gatt: &ConnectionHandle) -> Result<()>;

    fn read_characteristic(&self, gatt: &ConnectionHandle, characteristic: u16) -> Result<()>;

    fn write_characteristic(
        &self,
        gatt: &ConnectionHandle,
        characteristic: u16,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<()>;

    fn read_descriptor(&self, gatt: &ConnectionHandle, descriptor: u16) -> Result<()>;

    fn write_descriptor(&self, gatt: &ConnectionHandle, descriptor: u16, value: &[u8]) -> Result<()>;

    /// Registers for value change pushes locally; does not touch the radio.
    fn set_characteristic_notification(
        &self,
        gatt: &ConnectionHandle,
        characteristic: u16,
        enabled: bool,
    ) -> Result<()>;

    fn read_remote_rssi(&self, gatt: &ConnectionHandle) -> Result<()>;

    fn request_mtu(&self, gatt: &ConnectionHandle, mtu: u16) -> Result<()>;

    /// Subscribes to system broadcasts (bond state, adapter state).
    fn register_receiver(&self, receiver: Arc<dyn BroadcastReceiver>) -> ReceiverId;

    fn unregister_receiver(&self, id: ReceiverId);
}

/// Completion callbacks of one GATT connection. Attributes are identified by handle.
pub trait GattCallback: Send + Sync {
    fn on_connection_state_change(
        &self,
        gatt: &ConnectionHandle,
        status: GattStatus,
        new_state: ConnectionState,
    );

    fn on_services_discovered(&self, gatt: &ConnectionHandle, status: GattStatus, services: Vec<Service>);

    fn on_characteristic_read(
        &self,
        gatt: &ConnectionHandle,
        characteristic: u16,
        value: Vec<u8>,
        status: GattStatus,
    );

    fn on_characteristic_write(&self, gatt: &ConnectionHandle, characteristic: u16, status: GattStatus);

    /// A notification or indication pushed by the device.
    fn on_characteristic_changed(&self, gatt: &ConnectionHandle, characteristic: u16, value: Vec<u8>);

    fn on_descriptor_read(
        &self,
        gatt: &ConnectionHandle,
        descriptor: u16,
        value: Vec<u8>,
        status: GattStatus,
    );

    fn on_descriptor_write(&self, gatt: &ConnectionHandle, descriptor: u16, status: GattStatus);

    fn on_read_remote_rssi(&self, gatt: &ConnectionHandle, rssi: i16, status: GattStatus);

    fn on_mtu_changed(&self, gatt: &ConnectionHandle, mtu: u16, status: GattStatus);
}

pub trait ScanCallback: Send + Sync {
    fn on_scan_result(&self, result: ScanResult);

    fn on_scan_failed(&self, error_code: i32);
}

/// System-wide broadcasts the host stack forwards to registered receivers.
pub trait BroadcastReceiver: Send + Sync {
    fn on_bond_state_changed(&self, address: &DeviceAddress, name: Option<String>, state: BondState);

    fn on_adapter_state_changed(&self, state: ManagerState);
}
