use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_lock::Mutex;
use log::{debug, info};

use crate::transport::{ConnectionHandle, GattTransport};
use crate::{DeviceAddress, Peripheral};

/// Tracks every address with a connection attempt or an open connection.
///
/// An address is admitted once by [`ConnectionRegistry::try_begin_connect`] and stays
/// tracked until [`ConnectionRegistry::clear`], so repeated connect requests (bonding
/// broadcasts may arrive more than once) reach the radio only once.
pub(crate) struct ConnectionRegistry {
    transport: Arc<dyn GattTransport>,
    inner: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    active: HashSet<DeviceAddress>,
    records: HashMap<DeviceAddress, ConnectionRecord>,
}

#[derive(Default)]
struct ConnectionRecord {
    handle: Option<ConnectionHandle>,
    peripheral: Option<Peripheral>,
    connected: bool,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn GattTransport>) -> Self {
        Self {
            transport,
            inner: Mutex::new(RegistryState::default()),
        }
    }

    /// Admits a connection attempt; `false` if the address is already connecting or connected.
    pub fn try_begin_connect(&self, address: &DeviceAddress) -> bool {
        let admitted = self.inner.lock_blocking().active.insert(address.clone());
        if !admitted {
            debug!("{address} is already connecting or connected");
        }
        admitted
    }

    pub fn is_active(&self, address: &DeviceAddress) -> bool {
        self.inner.lock_blocking().active.contains(address)
    }

    /// Remembers the peripheral a connection attempt is for.
    pub fn set_pending(&self, address: &DeviceAddress, peripheral: Peripheral) {
        let mut state = self.inner.lock_blocking();
        if state.active.contains(address) {
            state.records.entry(address.clone()).or_default().peripheral = Some(peripheral);
        }
    }

    /// Stores the transport handle of an admitted attempt. Returns `false` if the address
    /// is no longer tracked or already has another handle; the caller then owns the handle
    /// and must release it.
    pub fn attach_handle(&self, gatt: &ConnectionHandle) -> bool {
        let mut state = self.inner.lock_blocking();
        if !state.active.contains(gatt.address()) {
            return false;
        }
        let record = state.records.entry(gatt.address().clone()).or_default();
        if record.handle.as_ref().is_some_and(|current| current != gatt) {
            debug!("{gatt} is not the current connection of {}", gatt.address());
            return false;
        }
        record.handle = Some(gatt.clone());
        true
    }

    /// Marks the connection on `gatt` as established with `session` as its peripheral.
    /// Returns `false`, leaving the registry untouched, if the address was cleared or
    /// belongs to another connection meanwhile.
    pub fn register_session(&self, gatt: &ConnectionHandle, session: Peripheral) -> bool {
        let mut state = self.inner.lock_blocking();
        if !state.active.contains(gatt.address()) {
            return false;
        }
        let record = state.records.entry(gatt.address().clone()).or_default();
        if record.handle.as_ref().is_some_and(|current| current != gatt) {
            return false;
        }
        record.handle = Some(gatt.clone());
        record.peripheral = Some(session);
        record.connected = true;
        true
    }

    /// True if `gatt` is the connection tracked for its address, or the address is still
    /// waiting for its handle.
    pub fn is_current(&self, gatt: &ConnectionHandle) -> bool {
        self.inner
            .lock_blocking()
            .records
            .get(gatt.address())
            .is_some_and(|record| record.handle.as_ref().map_or(true, |current| current == gatt))
    }

    /// The peripheral of an established connection.
    pub fn lookup_session(&self, address: &DeviceAddress) -> Option<Peripheral> {
        self.inner
            .lock_blocking()
            .records
            .get(address)
            .filter(|record| record.connected)
            .and_then(|record| record.peripheral.clone())
    }

    /// The peripheral of the established connection on `gatt`.
    pub fn session_for(&self, gatt: &ConnectionHandle) -> Option<Peripheral> {
        self.inner
            .lock_blocking()
            .records
            .get(gatt.address())
            .filter(|record| record.connected && record.handle.as_ref() == Some(gatt))
            .and_then(|record| record.peripheral.clone())
    }

    /// The peripheral of a tracked address, connected or not.
    pub fn peripheral(&self, address: &DeviceAddress) -> Option<Peripheral> {
        self.inner
            .lock_blocking()
            .records
            .get(address)
            .and_then(|record| record.peripheral.clone())
    }

    pub fn handle(&self, address: &DeviceAddress) -> Option<ConnectionHandle> {
        self.inner
            .lock_blocking()
            .records
            .get(address)
            .and_then(|record| record.handle.clone())
    }

    /// Peripherals of every established connection.
    pub fn sessions(&self) -> Vec<Peripheral> {
        self.inner
            .lock_blocking()
            .records
            .values()
            .filter(|record| record.connected)
            .filter_map(|record| record.peripheral.clone())
            .collect()
    }

    /// Forgets the address, releasing its transport handle and detaching its peripheral.
    /// Returns the peripheral that was tracked. Does nothing for an unknown address.
    pub fn clear(&self, address: &DeviceAddress) -> Option<Peripheral> {
        let record = {
            let mut state = self.inner.lock_blocking();
            state.active.remove(address);
            state.records.remove(address)
        }?;
        self.release(address, record)
    }

    /// Like [`ConnectionRegistry::clear`], but only if `gatt` is the tracked connection
    /// of its address.
    pub fn clear_connection(&self, gatt: &ConnectionHandle) -> Option<Peripheral> {
        let address = gatt.address();
        let record = {
            let mut state = self.inner.lock_blocking();
            let current = state
                .records
                .get(address)
                .is_some_and(|record| record.handle.as_ref().map_or(true, |current| current == gatt));
            if !current {
                return None;
            }
            state.active.remove(address);
            state.records.remove(address)
        }?;
        self.release(address, record)
    }

    /// Forgets every address.
    pub fn clear_all(&self) -> Vec<Peripheral> {
        let records: Vec<_> = {
            let mut state = self.inner.lock_blocking();
            state.active.clear();
            state.records.drain().collect()
        };
        records
            .into_iter()
            .filter_map(|(address, record)| self.release(&address, record))
            .collect()
    }

    fn release(&self, address: &DeviceAddress, record: ConnectionRecord) -> Option<Peripheral> {
        if let Some(gatt) = record.handle {
            info!("releasing connection {gatt}");
            self.transport.disconnect(&gatt);
            self.transport.close(&gatt);
        } else {
            debug!("cleared {address} before the host stack returned a connection");
        }
        if let Some(peripheral) = &record.peripheral {
            peripheral.unbind();
        }
        record.peripheral
    }
}
