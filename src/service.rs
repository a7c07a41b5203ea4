use std::sync::Arc;

use async_lock::Mutex;

use crate::characteristic::Characteristic;
use crate::CbUuid;

/// A Bluetooth GATT service.
#[derive(Debug, Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

#[derive(Debug)]
struct ServiceInner {
    uuid: CbUuid,
    is_primary: bool,
    chars: Vec<Characteristic>,
    char_filter: Mutex<Option<Vec<CbUuid>>>,
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.uuid == other.inner.uuid && self.inner.chars == other.inner.chars)
    }
}

impl Eq for Service {}

impl Service {
    /// Creates a service as reported by service discovery.
    pub fn new(uuid: impl Into<CbUuid>, is_primary: bool, characteristics: Vec<Characteristic>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                uuid: uuid.into(),
                is_primary,
                chars: characteristics,
                char_filter: Mutex::new(None),
            }),
        }
    }

    /// The [CbUuid] identifying the type of this GATT service.
    pub fn uuid(&self) -> CbUuid {
        self.inner.uuid.clone()
    }

    /// Whether this is a primary service of the device.
    pub fn is_primary(&self) -> bool {
        self.inner.is_primary
    }

    /// Characteristics of this service, restricted to the filter given to the last
    /// `Peripheral::discover_characteristics` call (if any).
    pub fn characteristics(&self) -> Vec<Characteristic> {
        let filter = self.inner.char_filter.lock_blocking();
        self.inner
            .chars
            .iter()
            .filter(|ch| filter.as_ref().map_or(true, |uuids| uuids.contains(&ch.uuid())))
            .cloned()
            .collect()
    }

    pub(crate) fn all_characteristics(&self) -> &[Characteristic] {
        &self.inner.chars
    }

    pub(crate) fn set_characteristic_filter(&self, filter: Option<Vec<CbUuid>>) {
        *self.inner.char_filter.lock_blocking() = filter;
    }
}
