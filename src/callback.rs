use std::sync::Weak;

use log::{debug, error, info, warn};

use crate::central::{CentralInner, CentralManager};
use crate::descriptor::DISABLE_NOTIFICATION_VALUE;
use crate::error::{ErrorKind, NativeError};
use crate::operation_queue::GattOperation;
use crate::service::Service;
use crate::transport::{BroadcastReceiver, ConnectionHandle, GattCallback, ScanCallback, ScanResult};
use crate::{
    AdvertisementData, BondState, ConnectionState, DeviceAddress, Error, GattStatus, ManagerState,
    Peripheral, PeripheralState, Result,
};

/// Receives every event of the host stack for one [`CentralManager`] and routes it to the
/// operation queue of the affected peripheral, its state, and the application delegates.
pub(crate) struct GattEventDispatcher {
    central: Weak<CentralInner>,
}

impl GattEventDispatcher {
    pub fn new(central: Weak<CentralInner>) -> Self {
        Self { central }
    }

    fn central(&self) -> Option<CentralManager> {
        self.central.upgrade().map(CentralManager::from_inner)
    }

    /// The connected peripheral a GATT event belongs to. Events of released connections
    /// find nothing.
    fn session(&self, gatt: &ConnectionHandle, event: &str) -> Option<Peripheral> {
        let session = self
            .central()
            .and_then(|central| central.registry().session_for(gatt));
        if session.is_none() {
            warn!("{event}: no peripheral found for {gatt}");
        }
        session
    }

    fn on_connected(&self, central: &CentralManager, gatt: &ConnectionHandle) {
        let address = gatt.address();
        let registry = central.registry();
        if !registry.attach_handle(gatt) {
            warn!("{gatt} connected but is not tracked, releasing it");
            central.transport().disconnect(gatt);
            central.transport().close(gatt);
            return;
        }
        if registry.session_for(gatt).is_some() {
            debug!("{gatt} is already connected, ignoring repeated event");
            return;
        }
        let peripheral = registry
            .peripheral(address)
            .unwrap_or_else(|| central.peripheral_for(address, None));
        peripheral.bind(central.transport().clone(), gatt.clone());
        peripheral.set_state(PeripheralState::Connected);
        if !registry.register_session(gatt, peripheral.clone()) {
            // cleared meanwhile; clearing has released the handle
            debug!("{gatt} was released while connecting");
            if peripheral.gatt().as_ref() == Some(gatt) {
                peripheral.unbind();
            }
            return;
        }
        info!("connected to {address}");

        if let Some(mtu) = central.config().request_mtu_on_connect {
            if let Err(e) = central.transport().request_mtu(gatt, mtu) {
                warn!("MTU request on {gatt} refused: {e}");
            }
        }
        if let Some(delegate) = central.delegate() {
            delegate.did_connect(central, &peripheral);
        }
    }

    fn on_disconnected(&self, central: &CentralManager, gatt: &ConnectionHandle, error: Option<Error>) {
        let address = gatt.address();
        let Some(peripheral) = central.registry().clear_connection(gatt) else {
            debug!("{gatt} disconnected but is not the tracked connection");
            return;
        };
        let Some(delegate) = central.delegate() else {
            return;
        };
        match error {
            None => {
                info!("disconnected from {address}");
                delegate.did_disconnect(central, &peripheral, None);
            }
            Some(error) => {
                info!("connection to {address} failed: {error}");
                delegate.did_fail_to_connect(central, &peripheral, Some(&error));
            }
        }
    }
}

impl GattCallback for GattEventDispatcher {
    fn on_connection_state_change(&self, gatt: &ConnectionHandle, status: GattStatus, new_state: ConnectionState) {
        let Some(central) = self.central() else {
            return;
        };
        let address = gatt.address();
        if !status.is_success() {
            let error = Error::new(
                ErrorKind::ConnectionFailed,
                Some(NativeError::from(status)),
                format!("connection state change of {address} failed with status {status}"),
            );
            self.on_disconnected(&central, gatt, Some(error));
            return;
        }
        match new_state {
            ConnectionState::Connected => self.on_connected(&central, gatt),
            ConnectionState::Disconnected => self.on_disconnected(&central, gatt, None),
            transitional if central.registry().is_current(gatt) => {
                if let Some(peripheral) = central.registry().peripheral(address) {
                    peripheral.set_state(transitional.into());
                }
            }
            transitional => debug!("{gatt} is {transitional:?} but is not the tracked connection"),
        }
    }

    fn on_services_discovered(&self, gatt: &ConnectionHandle, status: GattStatus, services: Vec<Service>) {
        let Some(peripheral) = self.session(gatt, "services discovered") else {
            return;
        };
        let result = status.check();
        match &result {
            Ok(()) => {
                debug!("discovered {} services on {}", services.len(), gatt.address());
                peripheral.set_services(services);
            }
            Err(e) => warn!("service discovery on {} failed: {e}", gatt.address()),
        }
        if let Some(delegate) = peripheral.delegate() {
            delegate.did_discover_services(&peripheral, result.err().as_ref());
        }
    }

    fn on_characteristic_read(&self, gatt: &ConnectionHandle, characteristic: u16, value: Vec<u8>, status: GattStatus) {
        let Some(peripheral) = self.session(gatt, "characteristic read") else {
            return;
        };
        characteristic_read(&peripheral, characteristic, status.check().map(|()| value));
        advance(&peripheral);
    }

    fn on_characteristic_write(&self, gatt: &ConnectionHandle, characteristic: u16, status: GattStatus) {
        let Some(peripheral) = self.session(gatt, "characteristic write") else {
            return;
        };
        characteristic_written(&peripheral, characteristic, status.check());
        advance(&peripheral);
    }

    fn on_characteristic_changed(&self, gatt: &ConnectionHandle, characteristic: u16, value: Vec<u8>) {
        let Some(peripheral) = self.session(gatt, "characteristic changed") else {
            return;
        };
        let Some(ch) = peripheral.tree().and_then(|tree| tree.find_characteristic(characteristic)) else {
            warn!("value pushed for unknown characteristic {characteristic:#06x} of {}", gatt.address());
            return;
        };
        ch.set_value(value.clone());
        ch.notifier().notify(value);
        if let Some(delegate) = peripheral.delegate() {
            delegate.did_update_value_for_characteristic(&peripheral, &ch, None);
        }
    }

    fn on_descriptor_read(&self, gatt: &ConnectionHandle, descriptor: u16, value: Vec<u8>, status: GattStatus) {
        let Some(peripheral) = self.session(gatt, "descriptor read") else {
            return;
        };
        descriptor_read(&peripheral, descriptor, status.check().map(|()| value));
        advance(&peripheral);
    }

    fn on_descriptor_write(&self, gatt: &ConnectionHandle, descriptor: u16, status: GattStatus) {
        let Some(peripheral) = self.session(gatt, "descriptor write") else {
            return;
        };
        let written = peripheral.queue().and_then(|queue| queue.in_flight()).and_then(|op| match op {
            GattOperation::WriteDescriptor { handle, value } | GattOperation::WriteDescriptorValue { handle, value }
                if handle == descriptor =>
            {
                Some(value)
            }
            _ => None,
        });
        descriptor_written(&peripheral, descriptor, written, status.check());
        advance(&peripheral);
    }

    fn on_read_remote_rssi(&self, gatt: &ConnectionHandle, rssi: i16, status: GattStatus) {
        let Some(peripheral) = self.session(gatt, "RSSI read") else {
            return;
        };
        let result = status.check();
        if let Some(delegate) = peripheral.delegate() {
            delegate.did_read_rssi(&peripheral, rssi, result.err().as_ref());
        }
    }

    fn on_mtu_changed(&self, gatt: &ConnectionHandle, mtu: u16, status: GattStatus) {
        let Some(peripheral) = self.session(gatt, "MTU change") else {
            return;
        };
        match status.check() {
            Ok(()) => {
                info!("MTU of {} is now {mtu}", gatt.address());
                peripheral.set_mtu(mtu);
            }
            Err(e) => warn!("MTU exchange on {} failed: {e}", gatt.address()),
        }
    }
}

impl ScanCallback for GattEventDispatcher {
    fn on_scan_result(&self, result: ScanResult) {
        let Some(central) = self.central() else {
            return;
        };
        if !central.is_scanning() {
            debug!("scan result for {} after the scan stopped", result.address);
            return;
        }
        let peripheral = central.peripheral_for(&result.address, result.device_name.clone());
        let advertisement_data = AdvertisementData {
            local_name: result.device_name,
            tx_power_level: (result.tx_power_level != i32::MIN).then_some(result.tx_power_level),
            service_uuids: result.service_uuids.unwrap_or_default(),
            is_connectable: result.is_connectable,
        };
        if let Some(delegate) = central.delegate() {
            delegate.did_discover(&central, &peripheral, &advertisement_data, result.rssi);
        }
    }

    fn on_scan_failed(&self, error_code: i32) {
        error!("scan failed with error code {error_code}");
        if let Some(central) = self.central() {
            central.set_scanning(false);
        }
    }
}

impl BroadcastReceiver for GattEventDispatcher {
    fn on_bond_state_changed(&self, address: &DeviceAddress, name: Option<String>, state: BondState) {
        let Some(central) = self.central() else {
            return;
        };
        match state {
            BondState::Bonded if central.config().reconnect_on_bond => {
                info!("bonded with {address}, connecting");
                let peripheral = central.peripheral_for(address, name);
                if let Err(e) = central.connect(&peripheral) {
                    warn!("reconnecting to bonded {address} failed: {e}");
                }
            }
            BondState::Bonded => debug!("bonded with {address}"),
            BondState::Bonding => debug!("bonding with {address} in progress"),
            BondState::None => debug!("bonding with {address} failed or was removed"),
        }
    }

    fn on_adapter_state_changed(&self, state: ManagerState) {
        let Some(central) = self.central() else {
            return;
        };
        info!("adapter state is now {state:?}");
        central.set_state(state);
        if let Some(delegate) = central.delegate() {
            delegate.did_update_state(&central);
        }
    }
}

/// Reports a request the host stack refused to start as a failed completion.
pub(crate) fn report_rejected(peripheral: &Peripheral, op: GattOperation, error: Error) {
    match op {
        GattOperation::ReadCharacteristic { handle } => characteristic_read(peripheral, handle, Err(error)),
        GattOperation::WriteCharacteristic { handle, .. } => {
            characteristic_written(peripheral, handle, Err(error))
        }
        GattOperation::ReadDescriptor { handle } => descriptor_read(peripheral, handle, Err(error)),
        GattOperation::WriteDescriptor { handle, value } | GattOperation::WriteDescriptorValue { handle, value } => {
            descriptor_written(peripheral, handle, Some(value), Err(error))
        }
    }
}

fn advance(peripheral: &Peripheral) {
    if let Some(queue) = peripheral.queue() {
        queue.on_operation_complete();
    }
}

fn characteristic_read(peripheral: &Peripheral, handle: u16, result: Result<Vec<u8>>) {
    let Some(ch) = peripheral.tree().and_then(|tree| tree.find_characteristic(handle)) else {
        warn!("read of unknown characteristic {handle:#06x} on {}", peripheral.address());
        return;
    };
    let error = match result {
        Ok(value) => {
            debug!("read {} bytes from {} on {}", value.len(), ch.uuid(), peripheral.address());
            ch.set_value(value);
            None
        }
        Err(e) => Some(e),
    };
    if let Some(delegate) = peripheral.delegate() {
        delegate.did_update_value_for_characteristic(peripheral, &ch, error.as_ref());
    }
}

fn characteristic_written(peripheral: &Peripheral, handle: u16, result: Result<()>) {
    let Some(ch) = peripheral.tree().and_then(|tree| tree.find_characteristic(handle)) else {
        warn!("write to unknown characteristic {handle:#06x} on {}", peripheral.address());
        return;
    };
    if let Some(delegate) = peripheral.delegate() {
        delegate.did_write_value_for_characteristic(peripheral, &ch, result.err().as_ref());
    }
}

/// Reads of the configuration descriptor update the notification state of its
/// characteristic instead of being reported as descriptor reads.
fn descriptor_read(peripheral: &Peripheral, handle: u16, result: Result<Vec<u8>>) {
    let Some((ch, desc)) = peripheral.tree().and_then(|tree| tree.find_descriptor(handle)) else {
        warn!("read of unknown descriptor {handle:#06x} on {}", peripheral.address());
        return;
    };
    let error = match result {
        Ok(value) => {
            if desc.is_cccd() {
                ch.set_notifying(value.first().is_some_and(|bits| bits & 0x03 != 0));
            }
            desc.set_value(value);
            None
        }
        Err(e) => Some(e),
    };
    let Some(delegate) = peripheral.delegate() else {
        return;
    };
    if desc.is_cccd() {
        delegate.did_update_notification_state_for(peripheral, &ch, error.as_ref());
    } else {
        delegate.did_update_value_for_descriptor(peripheral, &desc, error.as_ref());
    }
}

fn descriptor_written(peripheral: &Peripheral, handle: u16, written: Option<Vec<u8>>, result: Result<()>) {
    let Some((ch, desc)) = peripheral.tree().and_then(|tree| tree.find_descriptor(handle)) else {
        warn!("write to unknown descriptor {handle:#06x} on {}", peripheral.address());
        return;
    };
    if let (Ok(()), Some(value)) = (&result, written) {
        if desc.is_cccd() {
            let notifying = value[..] != DISABLE_NOTIFICATION_VALUE[..];
            debug!("notifications of {} on {}: {notifying}", ch.uuid(), peripheral.address());
            ch.set_notifying(notifying);
        }
        desc.set_value(value);
    }
    let Some(delegate) = peripheral.delegate() else {
        return;
    };
    if desc.is_cccd() {
        delegate.did_update_notification_state_for(peripheral, &ch, result.err().as_ref());
    } else {
        delegate.did_write_value_for_descriptor(peripheral, &desc, result.err().as_ref());
    }
}
