use std::sync::{Arc, OnceLock};

use async_lock::Mutex;

use crate::btuuid::descriptors::CLIENT_CHARACTERISTIC_CONFIGURATION;
use crate::CbUuid;

/// Value written to the CCCD to enable notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// Value written to the CCCD to enable indications.
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
/// Value written to the CCCD to disable both.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// A Bluetooth GATT descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    inner: Arc<DescriptorInner>,
}

#[derive(Debug)]
struct DescriptorInner {
    uuid: CbUuid,
    handle: u16,
    char_handle: OnceLock<u16>,
    value: Mutex<Option<Vec<u8>>>,
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle == other.inner.handle && self.inner.uuid == other.inner.uuid
    }
}

impl Eq for Descriptor {}

impl Descriptor {
    /// Creates a descriptor as reported by service discovery.
    pub fn new(uuid: impl Into<CbUuid>, handle: u16) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                uuid: uuid.into(),
                handle,
                char_handle: OnceLock::new(),
                value: Mutex::new(None),
            }),
        }
    }

    /// The [CbUuid] identifying the type of this GATT descriptor.
    pub fn uuid(&self) -> CbUuid {
        self.inner.uuid.clone()
    }

    /// The attribute handle of this descriptor.
    pub fn handle(&self) -> u16 {
        self.inner.handle
    }

    /// The attribute handle of the characteristic containing this descriptor.
    pub fn characteristic_handle(&self) -> Option<u16> {
        self.inner.char_handle.get().copied()
    }

    /// The cached value of this descriptor, available after a successful read.
    pub fn value(&self) -> Option<Vec<u8>> {
        self.inner.value.lock_blocking().clone()
    }

    /// Is this the Client Characteristic Configuration Descriptor?
    pub fn is_cccd(&self) -> bool {
        self.inner.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION
    }

    pub(crate) fn attach_to(&self, char_handle: u16) {
        let _ = self.inner.char_handle.set(char_handle);
    }

    pub(crate) fn set_value(&self, value: Vec<u8>) {
        self.inner.value.lock_blocking().replace(value);
    }
}
