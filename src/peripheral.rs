use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_lock::Mutex;
use futures_core::Stream;
use log::{debug, info};

use crate::delegate::PeripheralDelegate;
use crate::descriptor::{
    DISABLE_NOTIFICATION_VALUE, ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE,
};
use crate::error::ErrorKind;
use crate::gatt_tree::GattTree;
use crate::operation_queue::{GattOperation, OperationQueue};
use crate::transport::{ConnectionHandle, GattTransport};
use crate::util::OptionExt;
use crate::{
    CbUuid, Characteristic, Descriptor, DeviceAddress, PeripheralId, PeripheralState, Result,
    Service, WriteType,
};

/// ATT MTU in effect before any exchange.
pub const DEFAULT_MTU: u16 = 23;

// opcode + attribute handle
const WRITE_HEADER_LEN: u16 = 3;

/// A remote BLE peripheral.
///
/// Clones refer to the same peripheral. GATT requests return as soon as they are queued;
/// results arrive through the [`PeripheralDelegate`]. Requests on a peripheral that is
/// not connected, or on attributes that are not part of its discovered services, fail
/// with [`ErrorKind::NotFound`] without reaching the radio.
#[derive(Clone)]
pub struct Peripheral {
    inner: Arc<PeripheralInner>,
}

struct PeripheralInner {
    id: PeripheralId,
    address: DeviceAddress,
    name: Mutex<Option<String>>,
    state: Mutex<PeripheralState>,
    mtu: AtomicU16,
    services: Mutex<Option<GattTree>>,
    service_filter: Mutex<Option<Vec<CbUuid>>>,
    delegate: Mutex<Option<Arc<dyn PeripheralDelegate>>>,
    link: Mutex<Option<Link>>,
}

#[derive(Clone)]
struct Link {
    transport: Arc<dyn GattTransport>,
    queue: Arc<OperationQueue>,
}

impl PartialEq for Peripheral {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Peripheral {}

impl std::hash::Hash for Peripheral {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = f.debug_struct("Peripheral");
        f.field("name", &self.name().unwrap_or("(Unknown name)".into()));
        f.field("address", &self.inner.address);
        f.field("state", &self.state());
        f.finish()
    }
}

impl std::fmt::Display for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name().as_deref().unwrap_or("(Unknown name)"))
    }
}

impl Peripheral {
    pub(crate) fn new(address: DeviceAddress, name: Option<String>) -> Self {
        Self {
            inner: Arc::new(PeripheralInner {
                id: PeripheralId::from_address(&address),
                address,
                name: Mutex::new(name),
                state: Mutex::new(PeripheralState::Disconnected),
                mtu: AtomicU16::new(DEFAULT_MTU),
                services: Mutex::new(None),
                service_filter: Mutex::new(None),
                delegate: Mutex::new(None),
                link: Mutex::new(None),
            }),
        }
    }

    /// Stable identifier of this peripheral.
    pub fn identifier(&self) -> PeripheralId {
        self.inner.id
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.inner.address
    }

    /// The advertised or bonded name, if any was seen.
    pub fn name(&self) -> Option<String> {
        self.inner.name.lock_blocking().clone()
    }

    pub fn state(&self) -> PeripheralState {
        *self.inner.state.lock_blocking()
    }

    /// The negotiated ATT MTU.
    pub fn mtu(&self) -> u16 {
        self.inner.mtu.load(Ordering::SeqCst)
    }

    pub fn set_delegate(&self, delegate: Arc<dyn PeripheralDelegate>) {
        self.inner.delegate.lock_blocking().replace(delegate);
    }

    /// Services found by the last completed discovery; `None` before that.
    pub fn services(&self) -> Option<Vec<Service>> {
        self.tree().map(|tree| tree.services().to_vec())
    }

    /// Starts service discovery. When `filter` is given, only the listed services are kept.
    pub fn discover_services(&self, filter: Option<&[CbUuid]>) -> Result<()> {
        let link = self.link()?;
        *self.inner.service_filter.lock_blocking() = filter.map(<[CbUuid]>::to_vec);
        info!("discovering services of {}", self.inner.address);
        link.transport.discover_services(link.queue.gatt())
    }

    /// Selects the characteristics of an already discovered service; answered immediately
    /// through [`PeripheralDelegate::did_discover_characteristics_for`].
    pub fn discover_characteristics(&self, filter: Option<&[CbUuid]>, service: &Service) -> Result<()> {
        let tree = self.tree().ok_or_not_found("service list")?;
        tree.contains_service(&service.uuid())
            .then_some(())
            .ok_or_not_found(&format!("service {}", service.uuid()))?;
        service.set_characteristic_filter(filter.filter(|uuids| !uuids.is_empty()).map(<[CbUuid]>::to_vec));
        if let Some(delegate) = self.delegate() {
            delegate.did_discover_characteristics_for(self, service, None);
        }
        Ok(())
    }

    /// Reports the already known descriptors of `characteristic` through
    /// [`PeripheralDelegate::did_discover_descriptors_for`].
    pub fn discover_descriptors(&self, characteristic: &Characteristic) -> Result<()> {
        let characteristic = self.tracked_characteristic(characteristic)?;
        if let Some(delegate) = self.delegate() {
            delegate.did_discover_descriptors_for(self, &characteristic, None);
        }
        Ok(())
    }

    pub fn read_value(&self, characteristic: &Characteristic) -> Result<()> {
        let link = self.link()?;
        let characteristic = self.tracked_characteristic(characteristic)?;
        link.queue.enqueue(GattOperation::ReadCharacteristic {
            handle: characteristic.handle(),
        });
        Ok(())
    }

    pub fn write_value(&self, data: &[u8], characteristic: &Characteristic, write_type: WriteType) -> Result<()> {
        let link = self.link()?;
        let characteristic = self.tracked_characteristic(characteristic)?;
        link.queue.enqueue(GattOperation::WriteCharacteristic {
            handle: characteristic.handle(),
            value: data.to_vec(),
            write_type,
        });
        Ok(())
    }

    /// Enables or disables notifications: registers locally, then writes the Client
    /// Characteristic Configuration Descriptor. Indications are preferred when the
    /// characteristic supports both. The delegate is told once the descriptor write completes.
    pub fn set_notify_value(&self, enabled: bool, characteristic: &Characteristic) -> Result<()> {
        let link = self.link()?;
        let characteristic = self.tracked_characteristic(characteristic)?;
        let cccd = characteristic
            .cccd()
            .ok_or_not_found(&format!("configuration descriptor of {}", characteristic.uuid()))?;
        let props = characteristic.properties();
        let value = match (enabled, props.indicate, props.notify) {
            (false, _, _) => DISABLE_NOTIFICATION_VALUE,
            (true, true, _) => ENABLE_INDICATION_VALUE,
            (true, false, true) => ENABLE_NOTIFICATION_VALUE,
            (true, false, false) => {
                return Err(crate::Error::new(
                    ErrorKind::NotSupported,
                    None,
                    format!("{} supports neither notify nor indicate", characteristic.uuid()),
                ))
            }
        };
        link.transport
            .set_characteristic_notification(link.queue.gatt(), characteristic.handle(), enabled)?;
        link.queue.enqueue(GattOperation::WriteDescriptor {
            handle: cccd.handle(),
            value: value.to_vec(),
        });
        Ok(())
    }

    pub fn read_descriptor_value(&self, descriptor: &Descriptor) -> Result<()> {
        let link = self.link()?;
        let descriptor = self.tracked_descriptor(descriptor)?;
        link.queue.enqueue(GattOperation::ReadDescriptor {
            handle: descriptor.handle(),
        });
        Ok(())
    }

    pub fn write_descriptor_value(&self, data: &[u8], descriptor: &Descriptor) -> Result<()> {
        let link = self.link()?;
        let descriptor = self.tracked_descriptor(descriptor)?;
        link.queue.enqueue(GattOperation::WriteDescriptorValue {
            handle: descriptor.handle(),
            value: data.to_vec(),
        });
        Ok(())
    }

    /// Requests the signal strength; not ordered with queued GATT requests.
    pub fn read_rssi(&self) -> Result<()> {
        let link = self.link()?;
        link.transport.read_remote_rssi(link.queue.gatt())
    }

    /// Largest value accepted by a single write of the given type.
    pub fn maximum_write_value_length(&self, _write_type: WriteType) -> usize {
        usize::from(self.mtu().saturating_sub(WRITE_HEADER_LEN))
    }

    /// True when a write without response would be issued immediately.
    pub fn can_send_write_without_response(&self) -> bool {
        self.link().map_or(false, |link| link.queue.is_idle())
    }

    /// Subscribes to value pushes of `characteristic`.
    ///
    /// The first subscriber enables notifications and dropping the last one disables them.
    /// The stream ends when the peripheral disconnects.
    pub async fn notifications(
        &self,
        characteristic: &Characteristic,
    ) -> Result<impl Stream<Item = Vec<u8>> + Send + Unpin + '_> {
        let characteristic = self.tracked_characteristic(characteristic)?;
        let (this, char_for_stop) = (self.clone(), characteristic.clone());
        characteristic
            .notifier()
            .subscribe(
                || self.set_notify_value(true, &characteristic),
                move || {
                    if let Err(e) = this.set_notify_value(false, &char_for_stop) {
                        debug!("notifications of {} not disabled: {e}", char_for_stop.uuid());
                    }
                },
            )
            .await
    }

    /// Attaches the connection; the peripheral becomes usable for GATT requests.
    pub(crate) fn bind(&self, transport: Arc<dyn GattTransport>, gatt: ConnectionHandle) {
        let weak = Arc::downgrade(&self.inner);
        let queue = OperationQueue::new(transport.clone(), gatt, move |op, error| {
            if let Some(inner) = weak.upgrade() {
                crate::callback::report_rejected(&Peripheral { inner }, op, error);
            }
        });
        self.inner.mtu.store(DEFAULT_MTU, Ordering::SeqCst);
        self.inner.link.lock_blocking().replace(Link {
            transport,
            queue: Arc::new(queue),
        });
    }

    /// Detaches the connection: drops waiting requests, forgets discovered services and
    /// ends notification streams.
    pub(crate) fn unbind(&self) {
        if let Some(link) = self.inner.link.lock_blocking().take() {
            link.queue.clear();
        }
        let tree = self.inner.services.lock_blocking().take();
        if let Some(tree) = tree {
            tree.close_notifiers();
        }
        self.inner.mtu.store(DEFAULT_MTU, Ordering::SeqCst);
        self.set_state(PeripheralState::Disconnected);
    }

    pub(crate) fn gatt(&self) -> Option<ConnectionHandle> {
        self.inner
            .link
            .lock_blocking()
            .as_ref()
            .map(|link| link.queue.gatt().clone())
    }

    pub(crate) fn queue(&self) -> Option<Arc<OperationQueue>> {
        self.inner.link.lock_blocking().as_ref().map(|link| link.queue.clone())
    }

    pub(crate) fn tree(&self) -> Option<GattTree> {
        self.inner.services.lock_blocking().clone()
    }

    /// Stores a discovery result, applying the filter of the `discover_services` call.
    pub(crate) fn set_services(&self, services: Vec<Service>) {
        let filter = self.inner.service_filter.lock_blocking().clone();
        let tree = GattTree::new(services, filter.as_deref());
        let old = self.inner.services.lock_blocking().replace(tree);
        if let Some(old) = old {
            old.close_notifiers();
        }
    }

    pub(crate) fn set_name(&self, name: Option<String>) {
        if name.is_some() {
            *self.inner.name.lock_blocking() = name;
        }
    }

    pub(crate) fn set_state(&self, state: PeripheralState) {
        *self.inner.state.lock_blocking() = state;
    }

    pub(crate) fn set_mtu(&self, mtu: u16) {
        self.inner.mtu.store(mtu, Ordering::SeqCst);
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn PeripheralDelegate>> {
        self.inner.delegate.lock_blocking().clone()
    }

    fn link(&self) -> Result<Link> {
        self.inner
            .link
            .lock_blocking()
            .clone()
            .ok_or_not_found(&format!("connection to {}", self.inner.address))
    }

    fn tracked_characteristic(&self, characteristic: &Characteristic) -> Result<Characteristic> {
        self.tree()
            .and_then(|tree| tree.find_characteristic(characteristic.handle()))
            .filter(|found| found == characteristic)
            .ok_or_not_found(&format!("characteristic {}", characteristic.uuid()))
    }

    fn tracked_descriptor(&self, descriptor: &Descriptor) -> Result<Descriptor> {
        self.tree()
            .and_then(|tree| tree.find_descriptor(descriptor.handle()))
            .map(|(_, found)| found)
            .filter(|found| found == descriptor)
            .ok_or_not_found(&format!("descriptor {}", descriptor.uuid()))
    }
}

#[cfg(test)]
mod tests {
    use futures_lite::future::block_on;
    use futures_lite::StreamExt;

    use super::*;
    use crate::test_util::{init_logger, sample_services, FakeTransport, TransportCall};

    fn connected(transport: &Arc<FakeTransport>) -> Peripheral {
        init_logger();
        let peripheral = Peripheral::new(DeviceAddress::from("AA:BB"), Some("Sensor".into()));
        peripheral.bind(transport.clone(), ConnectionHandle::new(1, peripheral.address().clone()));
        peripheral.set_services(sample_services());
        peripheral
    }

    fn characteristic(peripheral: &Peripheral, service: usize) -> Characteristic {
        peripheral.services().unwrap()[service].characteristics()[0].clone()
    }

    #[test]
    fn requests_fail_when_not_connected() {
        let peripheral = Peripheral::new(DeviceAddress::from("AA:BB"), None);
        let orphan = sample_services()[0].characteristics()[0].clone();
        let err = peripheral.read_value(&orphan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(peripheral.read_rssi().unwrap_err().kind(), ErrorKind::NotFound);
        assert!(!peripheral.can_send_write_without_response());
        assert_eq!(peripheral.services(), None);
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let transport = FakeTransport::new();
        let peripheral = connected(&transport);
        let foreign = sample_services()[0].characteristics()[0].clone();
        // same handle, but not an attribute of this connection
        let err = peripheral.read_value(&Characteristic::new(
            CbUuid::from_u16(0x2a00),
            foreign.handle(),
            foreign.properties(),
            vec![],
        ));
        assert_eq!(err.unwrap_err().kind(), ErrorKind::NotFound);
        assert!(transport.gatt_calls().is_empty());
    }

    #[test]
    fn notify_prefers_indication() {
        let transport = FakeTransport::new();
        let peripheral = connected(&transport);
        let battery = characteristic(&peripheral, 1);
        peripheral.set_notify_value(true, &battery).unwrap();
        assert_eq!(
            transport.calls()[..],
            [
                TransportCall::SetNotification(0x0020, true),
                TransportCall::WriteDescriptor(0x0021, ENABLE_INDICATION_VALUE.to_vec()),
            ]
        );
        // local registration alone does not change the state
        assert!(!battery.is_notifying());

        let control = characteristic(&peripheral, 2);
        let err = peripheral.set_notify_value(true, &control).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn write_length_follows_mtu() {
        let transport = FakeTransport::new();
        let peripheral = connected(&transport);
        assert_eq!(peripheral.maximum_write_value_length(WriteType::WithoutResponse), 20);
        peripheral.set_mtu(185);
        assert_eq!(peripheral.maximum_write_value_length(WriteType::WithResponse), 182);
        peripheral.unbind();
        assert_eq!(peripheral.mtu(), DEFAULT_MTU);
        assert_eq!(peripheral.state(), PeripheralState::Disconnected);
    }

    #[test]
    fn service_filter_applies_to_discovery_result() {
        let transport = FakeTransport::new();
        let peripheral = connected(&transport);
        let wanted = [CbUuid::from_u16(0x180f)];
        peripheral.discover_services(Some(&wanted[..])).unwrap();
        assert!(transport
            .calls()
            .contains(&TransportCall::DiscoverServices(DeviceAddress::from("AA:BB"))));
        peripheral.set_services(sample_services());
        let services = peripheral.services().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].uuid(), CbUuid::from_u16(0x180f));
    }

    #[test]
    fn notification_stream_lifecycle() {
        let transport = FakeTransport::new();
        let peripheral = connected(&transport);
        let heart_rate = characteristic(&peripheral, 0);

        block_on(async {
            let mut stream = peripheral.notifications(&heart_rate).await.unwrap();
            assert_eq!(
                transport.gatt_calls(),
                vec![TransportCall::WriteDescriptor(0x0011, ENABLE_NOTIFICATION_VALUE.to_vec())]
            );
            heart_rate.notifier().notify(vec![0x06, 0x48]);
            assert_eq!(stream.next().await, Some(vec![0x06, 0x48]));
        });

        // the disable write waits behind the enable write
        assert_eq!(transport.gatt_calls().len(), 1);
        peripheral.queue().unwrap().on_operation_complete();
        assert_eq!(
            transport.gatt_calls()[1],
            TransportCall::WriteDescriptor(0x0011, DISABLE_NOTIFICATION_VALUE.to_vec())
        );
        assert_eq!(transport.count(&TransportCall::SetNotification(0x0010, false)), 1);
    }

    #[test]
    fn disconnect_ends_notification_stream() {
        let transport = FakeTransport::new();
        let peripheral = connected(&transport);
        let heart_rate = characteristic(&peripheral, 0);
        let mut stream = block_on(peripheral.notifications(&heart_rate)).unwrap();
        peripheral.unbind();
        assert_eq!(block_on(stream.next()), None);
        assert!(peripheral.queue().is_none());
    }
}
