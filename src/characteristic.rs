use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_lock::Mutex;

use crate::async_util::Notifier;
use crate::descriptor::Descriptor;
use crate::{CbUuid, CharacteristicProperties};

/// A Bluetooth GATT characteristic.
///
/// Clones share the cached value and the notification state.
#[derive(Clone)]
pub struct Characteristic {
    inner: Arc<CharacteristicInner>,
}

struct CharacteristicInner {
    uuid: CbUuid,
    handle: u16,
    properties: CharacteristicProperties,
    descriptors: Vec<Descriptor>,
    value: Mutex<Option<Vec<u8>>>,
    is_notifying: AtomicBool,
    notify: Notifier<Vec<u8>>,
}

impl PartialEq for Characteristic {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle == other.inner.handle && self.inner.uuid == other.inner.uuid
    }
}

impl Eq for Characteristic {}

impl std::hash::Hash for Characteristic {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.handle.hash(state);
        self.inner.uuid.hash(state);
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.inner.uuid)
            .field("handle", &self.inner.handle)
            .field("properties", &self.inner.properties)
            .finish()
    }
}

impl Characteristic {
    /// Creates a characteristic as reported by service discovery.
    pub fn new(
        uuid: impl Into<CbUuid>,
        handle: u16,
        properties: CharacteristicProperties,
        descriptors: Vec<Descriptor>,
    ) -> Self {
        for desc in &descriptors {
            desc.attach_to(handle);
        }
        Self {
            inner: Arc::new(CharacteristicInner {
                uuid: uuid.into(),
                handle,
                properties,
                descriptors,
                value: Mutex::new(None),
                is_notifying: AtomicBool::new(false),
                notify: Notifier::new(16),
            }),
        }
    }

    /// The [CbUuid] identifying the type of this GATT characteristic.
    pub fn uuid(&self) -> CbUuid {
        self.inner.uuid.clone()
    }

    /// The attribute handle of this characteristic.
    pub fn handle(&self) -> u16 {
        self.inner.handle
    }

    /// The properties of this GATT characteristic.
    ///
    /// Characteristic properties indicate which operations (e.g. read, write, notify, etc)
    /// may be performed on this characteristic.
    pub fn properties(&self) -> CharacteristicProperties {
        self.inner.properties
    }

    /// The cached value of this characteristic, updated by reads and notifications.
    pub fn value(&self) -> Option<Vec<u8>> {
        self.inner.value.lock_blocking().clone()
    }

    /// Is the device currently sending notifications or indications for this characteristic?
    pub fn is_notifying(&self) -> bool {
        self.inner.is_notifying.load(Ordering::SeqCst)
    }

    /// Descriptors discovered together with this characteristic.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.inner.descriptors
    }

    pub(crate) fn descriptor(&self, handle: u16) -> Option<&Descriptor> {
        self.inner.descriptors.iter().find(|d| d.handle() == handle)
    }

    pub(crate) fn cccd(&self) -> Option<&Descriptor> {
        self.inner.descriptors.iter().find(|d| d.is_cccd())
    }

    pub(crate) fn set_value(&self, value: Vec<u8>) {
        self.inner.value.lock_blocking().replace(value);
    }

    pub(crate) fn set_notifying(&self, notifying: bool) {
        self.inner.is_notifying.store(notifying, Ordering::SeqCst);
    }

    pub(crate) fn notifier(&self) -> &Notifier<Vec<u8>> {
        &self.inner.notify
    }
}
