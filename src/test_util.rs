//! Recording host stack and delegates shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::delegate::{CentralManagerDelegate, PeripheralDelegate};
use crate::descriptor::Descriptor;
use crate::error::ErrorKind;
use crate::transport::{
    BroadcastReceiver, ConnectionHandle, GattCallback, GattTransport, ReceiverId, ScanCallback,
    ScanFilter, ScanSettings,
};
use crate::{
    AdvertisementData, BondState, Capability, CbUuid, CentralManager, Characteristic,
    CharacteristicProperties, DeviceAddress, Error, ManagerState, Peripheral, Service, WriteType,
};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportCall {
    StartScan(Vec<ScanFilter>, ScanSettings),
    StopScan,
    Connect(DeviceAddress),
    Disconnect(DeviceAddress),
    Close(DeviceAddress),
    DiscoverServices(DeviceAddress),
    ReadCharacteristic(u16),
    WriteCharacteristic(u16, Vec<u8>, WriteType),
    ReadDescriptor(u16),
    WriteDescriptor(u16, Vec<u8>),
    SetNotification(u16, bool),
    ReadRssi(DeviceAddress),
    RequestMtu(u16),
}

impl TransportCall {
    fn is_gatt_operation(&self) -> bool {
        matches!(
            self,
            TransportCall::ReadCharacteristic(..)
                | TransportCall::WriteCharacteristic(..)
                | TransportCall::ReadDescriptor(..)
                | TransportCall::WriteDescriptor(..)
        )
    }
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    calls: Mutex<Vec<TransportCall>>,
    denied: Mutex<HashSet<Capability>>,
    rejected_reads: Mutex<HashSet<u16>>,
    reject_connect: Mutex<bool>,
    reject_stop_scan: Mutex<bool>,
    next_id: AtomicU64,
    receivers: Mutex<Vec<(ReceiverId, Arc<dyn BroadcastReceiver>)>>,
    gatt_callback: Mutex<Option<Arc<dyn GattCallback>>>,
    scan_callback: Mutex<Option<Arc<dyn ScanCallback>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny(&self, capability: Capability) {
        self.denied.lock().unwrap().insert(capability);
    }

    pub fn reject_reads_of(&self, handle: u16) {
        self.rejected_reads.lock().unwrap().insert(handle);
    }

    pub fn reject_connect(&self) {
        *self.reject_connect.lock().unwrap() = true;
    }

    pub fn reject_stop_scan(&self) {
        *self.reject_stop_scan.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the queued GATT operations, in the order they were issued.
    pub fn gatt_calls(&self) -> Vec<TransportCall> {
        self.calls()
            .into_iter()
            .filter(TransportCall::is_gatt_operation)
            .collect()
    }

    pub fn count(&self, call: &TransportCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn gatt_callback(&self) -> Arc<dyn GattCallback> {
        self.gatt_callback.lock().unwrap().clone().expect("connect was never called")
    }

    pub fn scan_callback(&self) -> Arc<dyn ScanCallback> {
        self.scan_callback.lock().unwrap().clone().expect("scan was never started")
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.lock().unwrap().len()
    }

    pub fn broadcast_bond_state(&self, address: &DeviceAddress, state: BondState) {
        let receivers: Vec<_> = self.receivers.lock().unwrap().iter().map(|(_, r)| r.clone()).collect();
        for receiver in receivers {
            receiver.on_bond_state_changed(address, None, state);
        }
    }

    pub fn broadcast_adapter_state(&self, state: ManagerState) {
        let receivers: Vec<_> = self.receivers.lock().unwrap().iter().map(|(_, r)| r.clone()).collect();
        for receiver in receivers {
            receiver.on_adapter_state_changed(state);
        }
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GattTransport for FakeTransport {
    fn has_capability(&self, capability: Capability) -> bool {
        !self.denied.lock().unwrap().contains(&capability)
    }

    fn adapter_state(&self) -> ManagerState {
        ManagerState::PoweredOn
    }

    fn start_scan(
        &self,
        filters: &[ScanFilter],
        settings: &ScanSettings,
        callback: Arc<dyn ScanCallback>,
    ) -> crate::Result<()> {
        self.record(TransportCall::StartScan(filters.to_vec(), settings.clone()));
        self.scan_callback.lock().unwrap().replace(callback);
        Ok(())
    }

    fn stop_scan(&self) -> crate::Result<()> {
        self.record(TransportCall::StopScan);
        if *self.reject_stop_scan.lock().unwrap() {
            return Err(crate::error::NativeError::CallReturnedFalse.into());
        }
        Ok(())
    }

    fn connect(
        &self,
        address: &DeviceAddress,
        _auto_connect: bool,
        callback: Arc<dyn GattCallback>,
    ) -> crate::Result<ConnectionHandle> {
        self.record(TransportCall::Connect(address.clone()));
        if *self.reject_connect.lock().unwrap() {
            return Err(ErrorKind::ConnectionFailed.into());
        }
        self.gatt_callback.lock().unwrap().replace(callback);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionHandle::new(id, address.clone()))
    }

    fn disconnect(&self, gatt: &ConnectionHandle) {
        self.record(TransportCall::Disconnect(gatt.address().clone()));
    }

    fn close(&self, gatt: &ConnectionHandle) {
        self.record(TransportCall::Close(gatt.address().clone()));
    }

    fn discover_services(&self, gatt: &ConnectionHandle) -> crate::Result<()> {
        self.record(TransportCall::DiscoverServices(gatt.address().clone()));
        Ok(())
    }

    fn read_characteristic(&self, _gatt: &ConnectionHandle, characteristic: u16) -> crate::Result<()> {
        self.record(TransportCall::ReadCharacteristic(characteristic));
        if self.rejected_reads.lock().unwrap().contains(&characteristic) {
            return Err(crate::error::NativeError::CallReturnedFalse.into());
        }
        Ok(())
    }

    fn write_characteristic(
        &self,
        _gatt: &ConnectionHandle,
        characteristic: u16,
        value: &[u8],
        write_type: WriteType,
    ) -> crate::Result<()> {
        self.record(TransportCall::WriteCharacteristic(characteristic, value.to_vec(), write_type));
        Ok(())
    }

    fn read_descriptor(&self, _gatt: &ConnectionHandle, descriptor: u16) -> crate::Result<()> {
        self.record(TransportCall::ReadDescriptor(descriptor));
        Ok(())
    }

    fn write_descriptor(&self, _gatt: &ConnectionHandle, descriptor: u16, value: &[u8]) -> crate::Result<()> {
        self.record(TransportCall::WriteDescriptor(descriptor, value.to_vec()));
        Ok(())
    }

    fn set_characteristic_notification(
        &self,
        _gatt: &ConnectionHandle,
        characteristic: u16,
        enabled: bool,
    ) -> crate::Result<()> {
        self.record(TransportCall::SetNotification(characteristic, enabled));
        Ok(())
    }

    fn read_remote_rssi(&self, gatt: &ConnectionHandle) -> crate::Result<()> {
        self.record(TransportCall::ReadRssi(gatt.address().clone()));
        Ok(())
    }

    fn request_mtu(&self, _gatt: &ConnectionHandle, mtu: u16) -> crate::Result<()> {
        self.record(TransportCall::RequestMtu(mtu));
        Ok(())
    }

    fn register_receiver(&self, receiver: Arc<dyn BroadcastReceiver>) -> ReceiverId {
        let id = ReceiverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.receivers.lock().unwrap().push((id, receiver));
        id
    }

    fn unregister_receiver(&self, id: ReceiverId) {
        self.receivers.lock().unwrap().retain(|(rid, _)| *rid != id);
    }
}

/// Delegate callbacks recorded as short strings, e.g. `"connect AA:BB"`.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<String>>,
    discovered: Mutex<Vec<(Peripheral, AdvertisementData)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn discovered(&self) -> Vec<(Peripheral, AdvertisementData)> {
        self.discovered.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

fn outcome(error: Option<&Error>) -> String {
    match error {
        None => "ok".to_owned(),
        Some(e) => format!("err({:?})", e.kind()),
    }
}

impl CentralManagerDelegate for Recorder {
    fn did_update_state(&self, central: &CentralManager) {
        self.push(format!("state {:?}", central.state()));
    }

    fn did_discover(
        &self,
        _central: &CentralManager,
        peripheral: &Peripheral,
        advertisement_data: &AdvertisementData,
        rssi: i16,
    ) {
        self.push(format!("discover {} {rssi}", peripheral.address()));
        self.discovered
            .lock()
            .unwrap()
            .push((peripheral.clone(), advertisement_data.clone()));
    }

    fn did_connect(&self, _central: &CentralManager, peripheral: &Peripheral) {
        self.push(format!("connect {}", peripheral.address()));
    }

    fn did_fail_to_connect(&self, _central: &CentralManager, peripheral: &Peripheral, error: Option<&Error>) {
        self.push(format!("fail {} {}", peripheral.address(), outcome(error)));
    }

    fn did_disconnect(&self, _central: &CentralManager, peripheral: &Peripheral, error: Option<&Error>) {
        self.push(format!("disconnect {} {}", peripheral.address(), outcome(error)));
    }
}

impl PeripheralDelegate for Recorder {
    fn did_discover_services(&self, _peripheral: &Peripheral, error: Option<&Error>) {
        self.push(format!("services {}", outcome(error)));
    }

    fn did_discover_characteristics_for(&self, _peripheral: &Peripheral, service: &Service, error: Option<&Error>) {
        self.push(format!("characteristics {} {}", service.uuid(), outcome(error)));
    }

    fn did_discover_descriptors_for(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        self.push(format!("descriptors {} {}", characteristic.uuid(), outcome(error)));
    }

    fn did_update_value_for_characteristic(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        self.push(format!(
            "value {} {:?} {}",
            characteristic.uuid(),
            characteristic.value(),
            outcome(error)
        ));
    }

    fn did_update_value_for_descriptor(&self, _peripheral: &Peripheral, descriptor: &Descriptor, error: Option<&Error>) {
        self.push(format!("descriptor value {} {:?} {}", descriptor.uuid(), descriptor.value(), outcome(error)));
    }

    fn did_write_value_for_characteristic(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        self.push(format!("write {} {}", characteristic.uuid(), outcome(error)));
    }

    fn did_write_value_for_descriptor(&self, _peripheral: &Peripheral, descriptor: &Descriptor, error: Option<&Error>) {
        self.push(format!("descriptor write {} {}", descriptor.uuid(), outcome(error)));
    }

    fn did_update_notification_state_for(
        &self,
        _peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        self.push(format!(
            "notifying {} {} {}",
            characteristic.uuid(),
            characteristic.is_notifying(),
            outcome(error)
        ));
    }

    fn did_read_rssi(&self, _peripheral: &Peripheral, rssi: i16, error: Option<&Error>) {
        self.push(format!("rssi {rssi} {}", outcome(error)));
    }
}

/// Heart rate service (notify), battery service (read + notify + indicate) and a
/// vendor service with a writable characteristic and a user description descriptor.
pub(crate) fn sample_services() -> Vec<Service> {
    use crate::btuuid::descriptors::{CHARACTERISTIC_USER_DESCRIPTION, CLIENT_CHARACTERISTIC_CONFIGURATION};

    let heart_rate = Characteristic::new(
        CbUuid::from_u16(0x2a37),
        0x0010,
        CharacteristicProperties::from_bits(0x10),
        vec![Descriptor::new(CLIENT_CHARACTERISTIC_CONFIGURATION, 0x0011)],
    );
    let battery = Characteristic::new(
        CbUuid::from_u16(0x2a19),
        0x0020,
        CharacteristicProperties::from_bits(0x32),
        vec![Descriptor::new(CLIENT_CHARACTERISTIC_CONFIGURATION, 0x0021)],
    );
    let control = Characteristic::new(
        CbUuid::parse("6e400002-b5a3-f393-e0a9-e50e24dcca9e").unwrap(),
        0x0030,
        CharacteristicProperties::from_bits(0x0e),
        vec![Descriptor::new(CHARACTERISTIC_USER_DESCRIPTION, 0x0031)],
    );
    vec![
        Service::new(CbUuid::from_u16(0x180d), true, vec![heart_rate]),
        Service::new(CbUuid::from_u16(0x180f), true, vec![battery]),
        Service::new(
            CbUuid::parse("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap(),
            true,
            vec![control],
        ),
    ]
}
