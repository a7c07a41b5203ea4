//! Bluetooth UUID extensions and utilities.

use uuid::Uuid;

/// The base UUID for Bluetooth short-form UUIDs, `00000000-0000-1000-8000-00805F9B34FB`.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Mask of the 96 bits shared by every UUID derived from [`BLUETOOTH_BASE_UUID`].
const BASE_MASK: u128 = 0x00000000_ffff_ffff_ffff_ffffffffffff;

/// Const function to create a Bluetooth UUID from a 16-bit short form.
#[must_use]
pub const fn bluetooth_uuid_from_u16(uuid: u16) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Const function to create a Bluetooth UUID from a 32-bit short form.
#[must_use]
pub const fn bluetooth_uuid_from_u32(uuid: u32) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// Extension trait for [`Uuid`] with helper methods for Bluetooth short forms.
pub trait BluetoothUuidExt: private::Sealed {
    /// Creates a UUID from a 16-bit Bluetooth UUID.
    fn from_u16(uuid: u16) -> Self;

    /// Creates a UUID from a 32-bit Bluetooth UUID.
    fn from_u32(uuid: u32) -> Self;

    /// Returns `true` if self is a valid 16-bit Bluetooth UUID.
    fn is_u16_uuid(&self) -> bool;

    /// Returns `true` if self is a valid 32-bit Bluetooth UUID.
    fn is_u32_uuid(&self) -> bool;

    /// Returns the 16-bit short form if self is a 16-bit Bluetooth UUID.
    fn try_to_u16(&self) -> Option<u16>;

    /// Returns the 32-bit short form if self is derived from the Bluetooth base UUID.
    fn try_to_u32(&self) -> Option<u32>;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(uuid: u16) -> Self {
        bluetooth_uuid_from_u16(uuid)
    }

    fn from_u32(uuid: u32) -> Self {
        bluetooth_uuid_from_u32(uuid)
    }

    fn is_u16_uuid(&self) -> bool {
        self.try_to_u16().is_some()
    }

    fn is_u32_uuid(&self) -> bool {
        self.try_to_u32().is_some()
    }

    fn try_to_u16(&self) -> Option<u16> {
        self.try_to_u32().and_then(|x| x.try_into().ok())
    }

    fn try_to_u32(&self) -> Option<u32> {
        let val = self.as_u128();
        if val & BASE_MASK == BLUETOOTH_BASE_UUID {
            Some((val >> 96) as u32)
        } else {
            None
        }
    }
}

mod private {
    use uuid::Uuid;

    pub trait Sealed {}

    impl Sealed for Uuid {}
}

/// Bluetooth GATT descriptor 16-bit UUIDs.
pub mod descriptors {
    use super::bluetooth_uuid_from_u16;
    use uuid::Uuid;

    pub const CHARACTERISTIC_EXTENDED_PROPERTIES: Uuid = bluetooth_uuid_from_u16(0x2900);
    pub const CHARACTERISTIC_USER_DESCRIPTION: Uuid = bluetooth_uuid_from_u16(0x2901);
    /// Used to enable or disable notifications and indications of a characteristic.
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = bluetooth_uuid_from_u16(0x2902);
    pub const SERVER_CHARACTERISTIC_CONFIGURATION: Uuid = bluetooth_uuid_from_u16(0x2903);
    pub const CHARACTERISTIC_PRESENTATION_FORMAT: Uuid = bluetooth_uuid_from_u16(0x2904);
    pub const CHARACTERISTIC_AGGREGATE_FORMAT: Uuid = bluetooth_uuid_from_u16(0x2905);
    pub const VALID_RANGE: Uuid = bluetooth_uuid_from_u16(0x2906);
}

/// Short-form strings of the standard descriptors, as CoreBluetooth names them.
pub mod descriptor_strings {
    pub const CHARACTERISTIC_EXTENDED_PROPERTIES: &str = "2900";
    pub const CHARACTERISTIC_USER_DESCRIPTION: &str = "2901";
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: &str = "2902";
    pub const SERVER_CHARACTERISTIC_CONFIGURATION: &str = "2903";
    pub const CHARACTERISTIC_FORMAT: &str = "2904";
    pub const CHARACTERISTIC_AGGREGATE_FORMAT: &str = "2905";
    pub const CHARACTERISTIC_VALID_RANGE: &str = "2906";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_forms() {
        let cccd = Uuid::parse_str("00002902-0000-1000-8000-00805f9b34fb").unwrap();
        assert_eq!(cccd, descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION);
        assert_eq!(cccd.try_to_u16(), Some(0x2902));
        assert!(cccd.is_u16_uuid());

        let wide = Uuid::from_u32(0x1234_5678);
        assert_eq!(wide.try_to_u16(), None);
        assert_eq!(wide.try_to_u32(), Some(0x1234_5678));

        let random = Uuid::parse_str("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
        assert!(!random.is_u32_uuid());
    }
}
