use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_lock::Mutex;
use log::{debug, error, info, warn};

use crate::callback::GattEventDispatcher;
use crate::delegate::CentralManagerDelegate;
use crate::error::ErrorKind;
use crate::registry::ConnectionRegistry;
use crate::transport::{GattTransport, ReceiverId, ScanCallbackType, ScanFilter, ScanMode, ScanSettings};
use crate::{
    Capability, CbUuid, DeviceAddress, Error, ManagerState, Peripheral, PeripheralId,
    PeripheralState, Result,
};

/// Settings of a [`CentralManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralManagerConfig {
    /// MTU requested right after each connection is established.
    pub request_mtu_on_connect: Option<u16>,
    /// Passed to the host stack's connect call.
    pub auto_connect: bool,
    /// Connect to a device as soon as bonding with it completes.
    pub reconnect_on_bond: bool,
    pub scan_mode: ScanMode,
}

impl Default for CentralManagerConfig {
    fn default() -> Self {
        Self {
            request_mtu_on_connect: None,
            auto_connect: false,
            reconnect_on_bond: true,
            scan_mode: ScanMode::default(),
        }
    }
}

impl CentralManagerConfig {
    pub fn request_mtu_on_connect(mut self, mtu: u16) -> Self {
        self.request_mtu_on_connect = Some(mtu);
        self
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn reconnect_on_bond(mut self, reconnect: bool) -> Self {
        self.reconnect_on_bond = reconnect;
        self
    }

    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }
}

/// Options of [`CentralManager::scan_for_peripherals`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Report every advertisement instead of only the first one of each device.
    pub allow_duplicates: bool,
    /// Also match devices soliciting one of these services.
    pub solicited_service_uuids: Vec<CbUuid>,
}

/// Scans for, connects to and tracks remote peripherals.
///
/// Events are reported to the [`CentralManagerDelegate`]. Dropping the manager stops
/// scanning, releases every connection and unsubscribes from system broadcasts.
#[derive(Clone)]
pub struct CentralManager {
    inner: Arc<CentralInner>,
}

pub(crate) struct CentralInner {
    transport: Arc<dyn GattTransport>,
    config: CentralManagerConfig,
    registry: ConnectionRegistry,
    dispatcher: Arc<GattEventDispatcher>,
    receiver: OnceLock<ReceiverId>,
    peripherals: Mutex<HashMap<DeviceAddress, Peripheral>>,
    delegate: Mutex<Option<Arc<dyn CentralManagerDelegate>>>,
    state: Mutex<ManagerState>,
    scanning: AtomicBool,
}

impl std::fmt::Debug for CentralManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralManager")
            .field("state", &self.state())
            .field("scanning", &self.is_scanning())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl CentralManager {
    /// Creates a manager on top of the host stack and subscribes to its broadcasts.
    pub fn new(transport: Arc<dyn GattTransport>, config: CentralManagerConfig) -> Self {
        let inner = Arc::new_cyclic(|weak| CentralInner {
            registry: ConnectionRegistry::new(transport.clone()),
            dispatcher: Arc::new(GattEventDispatcher::new(weak.clone())),
            state: Mutex::new(transport.adapter_state()),
            transport,
            config,
            receiver: OnceLock::new(),
            peripherals: Mutex::new(HashMap::new()),
            delegate: Mutex::new(None),
            scanning: AtomicBool::new(false),
        });
        let id = inner.transport.register_receiver(inner.dispatcher.clone());
        let _ = inner.receiver.set(id);
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<CentralInner>) -> Self {
        Self { inner }
    }

    /// Installs the delegate, which is immediately told the current state.
    pub fn set_delegate(&self, delegate: Arc<dyn CentralManagerDelegate>) {
        self.inner.delegate.lock_blocking().replace(delegate.clone());
        delegate.did_update_state(self);
    }

    pub fn state(&self) -> ManagerState {
        *self.inner.state.lock_blocking()
    }

    /// Starts scanning for devices advertising any of `services` (all devices if `None`
    /// or empty). Restarts a scan that is already running.
    pub fn scan_for_peripherals(&self, services: Option<&[CbUuid]>, options: &ScanOptions) -> Result<()> {
        self.check_capability(Capability::Scan, "scan")?;
        let filters: Vec<ScanFilter> = services
            .unwrap_or_default()
            .iter()
            .map(|uuid| ScanFilter {
                service_uuid: Some(uuid.clone()),
                ..Default::default()
            })
            .chain(options.solicited_service_uuids.iter().map(|uuid| ScanFilter {
                service_solicitation_uuid: Some(uuid.clone()),
                ..Default::default()
            }))
            .collect();
        let settings = ScanSettings {
            scan_mode: self.inner.config.scan_mode,
            callback_type: if options.allow_duplicates {
                ScanCallbackType::AllMatches
            } else {
                ScanCallbackType::FirstMatch
            },
        };
        if self.inner.scanning.swap(true, Ordering::SeqCst) {
            debug!("restarting the running scan");
            if let Err(e) = self.inner.transport.stop_scan() {
                self.set_scanning(false);
                return Err(e);
            }
        }
        info!("scanning with {} filters", filters.len());
        self.inner
            .transport
            .start_scan(&filters, &settings, self.inner.dispatcher.clone())
            .map_err(|e| {
                self.set_scanning(false);
                e
            })
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.check_capability(Capability::Scan, "stop scan")?;
        if !self.inner.scanning.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("stopping scan");
        self.inner.transport.stop_scan()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::SeqCst)
    }

    /// Starts connecting to `peripheral`; the result is reported through
    /// [`CentralManagerDelegate::did_connect`] or
    /// [`CentralManagerDelegate::did_fail_to_connect`].
    ///
    /// Does nothing if the peripheral is already connecting or connected.
    pub fn connect(&self, peripheral: &Peripheral) -> Result<()> {
        self.check_capability(Capability::Connect, "connect")?;
        let address = peripheral.address();
        let registry = &self.inner.registry;
        if !registry.try_begin_connect(address) {
            return Ok(());
        }
        self.remember(peripheral);
        registry.set_pending(address, peripheral.clone());
        peripheral.set_state(PeripheralState::Connecting);
        info!("connecting to {address}");

        match self
            .inner
            .transport
            .connect(address, self.inner.config.auto_connect, self.inner.dispatcher.clone())
        {
            Ok(gatt) => {
                if !registry.attach_handle(&gatt) {
                    debug!("connection to {address} was cancelled meanwhile");
                    self.inner.transport.disconnect(&gatt);
                    self.inner.transport.close(&gatt);
                }
                Ok(())
            }
            Err(e) => {
                error!("connect to {address} refused: {e}");
                registry.clear(address);
                Err(e)
            }
        }
    }

    /// Disconnects or aborts the connection attempt. Local state is always cleaned up;
    /// the delegate gets `did_disconnect` if the peripheral was connected.
    pub fn cancel_connection(&self, peripheral: &Peripheral) {
        let address = peripheral.address();
        info!("disconnecting {address}");
        let was_connected = self.inner.registry.lookup_session(address).is_some();
        peripheral.set_state(PeripheralState::Disconnecting);
        let cleared = self.inner.registry.clear(address);
        peripheral.unbind();
        if let (true, Some(peripheral)) = (was_connected, cleared) {
            if let Some(delegate) = self.delegate() {
                delegate.did_disconnect(self, &peripheral, None);
            }
        }
    }

    /// Known peripherals (seen while scanning or connected) with one of the identifiers.
    pub fn retrieve_peripherals(&self, identifiers: &[PeripheralId]) -> Vec<Peripheral> {
        self.inner
            .peripherals
            .lock_blocking()
            .values()
            .filter(|peripheral| identifiers.contains(&peripheral.identifier()))
            .cloned()
            .collect()
    }

    /// Connected peripherals offering one of `services` (all connected ones if empty).
    /// Only services found by a completed discovery are considered.
    pub fn retrieve_connected_peripherals(&self, services: &[CbUuid]) -> Vec<Peripheral> {
        let sessions = self.inner.registry.sessions();
        if services.is_empty() {
            return sessions;
        }
        sessions
            .into_iter()
            .filter(|peripheral| {
                peripheral
                    .tree()
                    .is_some_and(|tree| services.iter().any(|uuid| tree.contains_service(uuid)))
            })
            .collect()
    }

    /// Forgets the tracking state of one address, or of all addresses if `None`,
    /// releasing the connections. No delegate callback is raised.
    pub fn clear_connected_device(&self, address: Option<&DeviceAddress>) {
        match address {
            Some(address) => {
                self.inner.registry.clear(address);
            }
            None => {
                self.inner.registry.clear_all();
            }
        }
    }

    pub(crate) fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub(crate) fn transport(&self) -> &Arc<dyn GattTransport> {
        &self.inner.transport
    }

    pub(crate) fn config(&self) -> &CentralManagerConfig {
        &self.inner.config
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn CentralManagerDelegate>> {
        self.inner.delegate.lock_blocking().clone()
    }

    /// The peripheral object of an address, created on first sight.
    pub(crate) fn peripheral_for(&self, address: &DeviceAddress, name: Option<String>) -> Peripheral {
        let mut peripherals = self.inner.peripherals.lock_blocking();
        let peripheral = peripherals
            .entry(address.clone())
            .or_insert_with(|| Peripheral::new(address.clone(), None));
        peripheral.set_name(name);
        peripheral.clone()
    }

    pub(crate) fn set_scanning(&self, scanning: bool) {
        self.inner.scanning.store(scanning, Ordering::SeqCst);
    }

    pub(crate) fn set_state(&self, state: ManagerState) {
        *self.inner.state.lock_blocking() = state;
    }

    fn remember(&self, peripheral: &Peripheral) {
        self.inner
            .peripherals
            .lock_blocking()
            .entry(peripheral.address().clone())
            .or_insert_with(|| peripheral.clone());
    }

    fn check_capability(&self, capability: Capability, what: &str) -> Result<()> {
        if self.inner.transport.has_capability(capability) {
            return Ok(());
        }
        error!("{what}: missing {capability:?} permission");
        Err(Error::new(
            ErrorKind::NotAuthorized,
            None,
            format!("{capability:?} permission is not granted"),
        ))
    }
}

impl Drop for CentralInner {
    fn drop(&mut self) {
        if let Some(id) = self.receiver.get() {
            self.transport.unregister_receiver(*id);
        }
        if self.scanning.load(Ordering::SeqCst) {
            if let Err(e) = self.transport.stop_scan() {
                warn!("stopping the scan on teardown failed: {e}");
            }
        }
        self.registry.clear_all();
    }
}
