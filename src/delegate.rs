//! Application callbacks.
//!
//! Every method except [`CentralManagerDelegate::did_update_state`] has an empty default
//! body, so implementations only override the events they care about. Callbacks run on
//! the host stack's callback threads and should return quickly.

use crate::{AdvertisementData, CentralManager, Characteristic, Descriptor, Error, Peripheral, Service};

/// Receives scanning and connection lifecycle events of a [`CentralManager`].
pub trait CentralManagerDelegate: Send + Sync {
    /// The adapter state changed, or the delegate was just installed.
    fn did_update_state(&self, central: &CentralManager);

    /// An advertisement was received while scanning.
    fn did_discover(
        &self,
        central: &CentralManager,
        peripheral: &Peripheral,
        advertisement_data: &AdvertisementData,
        rssi: i16,
    ) {
        let _ = (central, peripheral, advertisement_data, rssi);
    }

    fn did_connect(&self, central: &CentralManager, peripheral: &Peripheral) {
        let _ = (central, peripheral);
    }

    fn did_fail_to_connect(&self, central: &CentralManager, peripheral: &Peripheral, error: Option<&Error>) {
        let _ = (central, peripheral, error);
    }

    /// The connection was closed, either on request or by the link dropping.
    fn did_disconnect(&self, central: &CentralManager, peripheral: &Peripheral, error: Option<&Error>) {
        let _ = (central, peripheral, error);
    }
}

/// Receives GATT results of one [`Peripheral`]. `error` is `None` on success.
pub trait PeripheralDelegate: Send + Sync {
    fn did_discover_services(&self, peripheral: &Peripheral, error: Option<&Error>) {
        let _ = (peripheral, error);
    }

    fn did_discover_characteristics_for(&self, peripheral: &Peripheral, service: &Service, error: Option<&Error>) {
        let _ = (peripheral, service, error);
    }

    fn did_discover_descriptors_for(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        let _ = (peripheral, characteristic, error);
    }

    /// A read completed or a notification arrived; the new value is in
    /// [`Characteristic::value`].
    fn did_update_value_for_characteristic(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        let _ = (peripheral, characteristic, error);
    }

    fn did_update_value_for_descriptor(&self, peripheral: &Peripheral, descriptor: &Descriptor, error: Option<&Error>) {
        let _ = (peripheral, descriptor, error);
    }

    fn did_write_value_for_characteristic(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        let _ = (peripheral, characteristic, error);
    }

    fn did_write_value_for_descriptor(&self, peripheral: &Peripheral, descriptor: &Descriptor, error: Option<&Error>) {
        let _ = (peripheral, descriptor, error);
    }

    /// The Client Characteristic Configuration Descriptor was written or read;
    /// see [`Characteristic::is_notifying`].
    fn did_update_notification_state_for(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        error: Option<&Error>,
    ) {
        let _ = (peripheral, characteristic, error);
    }

    fn did_read_rssi(&self, peripheral: &Peripheral, rssi: i16, error: Option<&Error>) {
        let _ = (peripheral, rssi, error);
    }
}
