use std::fmt;

use uuid::Uuid;

use crate::cbuuid::CbUuid;
use crate::characteristic::Characteristic;

/// Address of a remote Bluetooth device as reported by the host stack
/// (normally a MAC address such as `AA:BB:CC:DD:EE:FF`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Namespace for deriving [`PeripheralId`] values from device addresses.
const PERIPHERAL_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d2c_41f0_8b0e_4c55_9a57_3e2f_0b1d_c0de);

/// Stable identifier of a peripheral, derived from its [`DeviceAddress`].
///
/// The same address always yields the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralId(Uuid);

impl PeripheralId {
    pub fn from_address(address: &DeviceAddress) -> Self {
        Self(Uuid::new_v5(&PERIPHERAL_ID_NAMESPACE, address.as_str().as_bytes()))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Status value delivered with every GATT callback of the host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattStatus(i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    pub const READ_NOT_PERMITTED: GattStatus = GattStatus(0x02);
    pub const WRITE_NOT_PERMITTED: GattStatus = GattStatus(0x03);
    pub const INSUFFICIENT_AUTHENTICATION: GattStatus = GattStatus(0x05);
    pub const REQUEST_NOT_SUPPORTED: GattStatus = GattStatus(0x06);
    pub const INVALID_OFFSET: GattStatus = GattStatus(0x07);
    pub const INSUFFICIENT_AUTHORIZATION: GattStatus = GattStatus(0x08);
    pub const INVALID_ATTRIBUTE_LENGTH: GattStatus = GattStatus(0x0d);
    pub const INSUFFICIENT_ENCRYPTION: GattStatus = GattStatus(0x0f);
    /// Generic error reported by the host stack, often on connection setup.
    pub const ERROR: GattStatus = GattStatus(0x85);
    pub const CONNECTION_CONGESTED: GattStatus = GattStatus(0x8f);
    pub const CONNECTION_TIMEOUT: GattStatus = GattStatus(0x93);
    pub const FAILURE: GattStatus = GattStatus(0x101);

    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Converts the status into `Ok(())` or the corresponding error.
    pub fn check(self) -> crate::Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.into())
        }
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Connection state of a peripheral as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeripheralState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Profile connection state reported by the host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl From<ConnectionState> for PeripheralState {
    fn from(value: ConnectionState) -> Self {
        match value {
            ConnectionState::Disconnected => PeripheralState::Disconnected,
            ConnectionState::Connecting => PeripheralState::Connecting,
            ConnectionState::Connected => PeripheralState::Connected,
            ConnectionState::Disconnecting => PeripheralState::Disconnecting,
        }
    }
}

/// State of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ManagerState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

/// Bond state carried by the host stack's bond-state-changed broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BondState {
    None,
    Bonding,
    Bonded,
}

/// Runtime capabilities (permissions) the host stack may withhold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Scan,
    Connect,
}

/// How a characteristic value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
}

/// Bit values of the characteristic properties field.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
    pub authenticated_signed_writes: bool,
    pub extended_properties: bool,
}

impl CharacteristicProperties {
    /// Raw transmutation from [`u32`].
    pub fn from_bits(bits: u32) -> Self {
        CharacteristicProperties {
            broadcast: (bits & (1 << 0)) != 0,
            read: (bits & (1 << 1)) != 0,
            write_without_response: (bits & (1 << 2)) != 0,
            write: (bits & (1 << 3)) != 0,
            notify: (bits & (1 << 4)) != 0,
            indicate: (bits & (1 << 5)) != 0,
            authenticated_signed_writes: (bits & (1 << 6)) != 0,
            extended_properties: (bits & (1 << 7)) != 0,
        }
    }

    /// Raw transmutation to [`u32`].
    pub fn to_bits(self) -> u32 {
        u32::from(self.broadcast)
            | (u32::from(self.read) << 1)
            | (u32::from(self.write_without_response) << 2)
            | (u32::from(self.write) << 3)
            | (u32::from(self.notify) << 4)
            | (u32::from(self.indicate) << 5)
            | (u32::from(self.authenticated_signed_writes) << 6)
            | (u32::from(self.extended_properties) << 7)
    }
}

/// Data included in a device's advertisement.
///
/// Manufacturer data and solicited service UUIDs are not reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertisementData {
    /// The (possibly shortened) local name of the device.
    pub local_name: Option<String>,
    /// The transmit power level, when the device reports one.
    pub tx_power_level: Option<i32>,
    /// Advertised GATT service UUIDs.
    pub service_uuids: Vec<CbUuid>,
    /// Whether the advertisement accepts connections.
    pub is_connectable: bool,
}

/// A remote central, as seen from the (unimplemented) peripheral role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Central {
    identifier: PeripheralId,
    address: DeviceAddress,
}

impl Central {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            identifier: PeripheralId::from_address(&address),
            address,
        }
    }

    pub fn identifier(&self) -> PeripheralId {
        self.identifier
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }
}

/// An attribute read or write request from a remote central (peripheral role placeholder).
#[derive(Debug, Clone)]
pub struct AttRequest {
    pub id: i32,
    pub central: Central,
    pub characteristic: Characteristic,
    pub offset: usize,
    pub value: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_per_address() {
        let a = DeviceAddress::from("AA:BB:CC:DD:EE:FF");
        let b = DeviceAddress::from("AA:BB:CC:DD:EE:00");
        assert_eq!(PeripheralId::from_address(&a), PeripheralId::from_address(&a.clone()));
        assert_ne!(PeripheralId::from_address(&a), PeripheralId::from_address(&b));
        assert_eq!(Central::new(a.clone()).identifier(), PeripheralId::from_address(&a));
    }

    #[test]
    fn properties_bits() {
        let props = CharacteristicProperties::from_bits(0x12);
        assert!(props.read && props.notify);
        assert!(!props.indicate && !props.write);
        assert_eq!(props.to_bits(), 0x12);
    }

    #[test]
    fn gatt_status_check() {
        assert!(GattStatus::SUCCESS.check().is_ok());
        assert!(GattStatus::FAILURE.check().is_err());
    }
}
