// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BlueZ radio adapter.
//!
//! Each request is submitted to a spawned task talking to bluetoothd over
//! D-Bus; results are reported back through the [`RadioEventSink`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{
    Adapter, AdapterEvent, AdapterProperty, Address, Device, DeviceEvent, DeviceProperty,
    ErrorKind,
};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::adapter::{
    CharacteristicHandle, CharacteristicProperties, HandleId, LinkStatus, NativeHandle,
    RadioAdapter, RadioEvent, RadioEventSink, WriteMode,
};
use super::ble_constants::GattStatus;
use crate::error::AdapterError;
use crate::peripheral::{PeripheralAddress, Sighting};

/// How often, and how long, to wait for bluetoothd to resolve services.
const SERVICE_RESOLVE_POLL: Duration = Duration::from_millis(250);
const SERVICE_RESOLVE_ATTEMPTS: u32 = 40;

struct Link {
    address: PeripheralAddress,
    device: Device,
    disconnect_requested: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
    characteristics: HashMap<Uuid, Characteristic>,
}

/// [`RadioAdapter`] backed by the default BlueZ adapter.
pub struct BluezAdapter {
    _session: bluer::Session,
    adapter: Adapter,
    sink: RadioEventSink,
    enabled: Arc<AtomicBool>,
    next_handle: AtomicU64,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    links: Arc<Mutex<HashMap<HandleId, Link>>>,
    power_task: JoinHandle<()>,
}

impl BluezAdapter {
    /// Open the default adapter.
    pub async fn new(sink: RadioEventSink) -> Result<Self> {
        info!("Initializing BlueZ adapter...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        let powered = adapter.is_powered().await?;
        if !powered {
            warn!("Bluetooth adapter {} is powered off", adapter.name());
        }

        let enabled = Arc::new(AtomicBool::new(powered));
        let power_task = tokio::spawn(watch_power(adapter.clone(), enabled.clone(), sink.clone()));

        Ok(Self {
            _session: session,
            adapter,
            sink,
            enabled,
            next_handle: AtomicU64::new(1),
            scan_task: Mutex::new(None),
            links: Arc::new(Mutex::new(HashMap::new())),
            power_task,
        })
    }

    fn ensure_enabled(&self) -> Result<(), AdapterError> {
        if self.enabled.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AdapterError::NotEnabled)
        }
    }

    fn with_link<T>(
        &self,
        handle: HandleId,
        f: impl FnOnce(&Link) -> T,
    ) -> Result<T, AdapterError> {
        self.links.lock().get(&handle).map(f).ok_or(AdapterError::UnknownHandle)
    }

    fn characteristic(
        &self,
        handle: HandleId,
        uuid: Uuid,
    ) -> Result<Characteristic, AdapterError> {
        let links = self.links.lock();
        let link = links.get(&handle).ok_or(AdapterError::UnknownHandle)?;
        link.characteristics.get(&uuid).cloned().ok_or_else(|| {
            AdapterError::Platform(format!("characteristic {} not discovered", uuid))
        })
    }
}

impl RadioAdapter for BluezAdapter {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn start_scan(&self) -> Result<(), AdapterError> {
        self.ensure_enabled()?;

        let mut scan_task = self.scan_task.lock();
        if scan_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(AdapterError::Busy);
        }
        *scan_task = Some(tokio::spawn(scan_devices(self.adapter.clone(), self.sink.clone())));
        Ok(())
    }

    fn stop_scan(&self) {
        if let Some(task) = self.scan_task.lock().take() {
            // dropping the discovery stream ends the BlueZ discovery session
            task.abort();
            debug!("BlueZ discovery stopped");
        }
    }

    fn connect(&self, address: &PeripheralAddress) -> Result<NativeHandle, AdapterError> {
        self.ensure_enabled()?;

        let bt_address: Address = address
            .as_str()
            .parse()
            .map_err(|_| AdapterError::Platform(format!("invalid address {}", address)))?;
        let device = self.adapter.device(bt_address).map_err(platform_error)?;

        let handle = HandleId(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let disconnect_requested = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(run_link(
            handle,
            address.clone(),
            device.clone(),
            disconnect_requested.clone(),
            self.sink.clone(),
        ));

        self.links.lock().insert(
            handle,
            Link {
                address: address.clone(),
                device,
                disconnect_requested,
                watcher,
                characteristics: HashMap::new(),
            },
        );
        debug!("Connecting to {} on handle {}", address, handle);
        Ok(NativeHandle::new(handle))
    }

    fn disconnect(&self, handle: HandleId) -> Result<(), AdapterError> {
        let (address, device, requested) = self.with_link(handle, |link| {
            (link.address.clone(), link.device.clone(), link.disconnect_requested.clone())
        })?;
        requested.store(true, Ordering::SeqCst);

        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = device.disconnect().await {
                warn!("Disconnect from {} failed: {}", address, e);
                sink.emit(RadioEvent::ConnectionStateChanged {
                    handle,
                    address,
                    status: GattStatus::FAILURE,
                    state: LinkStatus::Disconnected,
                });
            }
        });
        Ok(())
    }

    fn close(&self, handle: HandleId) {
        let Some(link) = self.links.lock().remove(&handle) else {
            debug!("Close of unknown handle {}", handle);
            return;
        };
        link.watcher.abort();
        debug!("Closed handle {} ({})", handle, link.address);

        let device = link.device;
        tokio::spawn(async move {
            if let Ok(true) = device.is_connected().await {
                let _ = device.disconnect().await;
            }
        });
    }

    fn discover_services(&self, handle: HandleId) -> Result<(), AdapterError> {
        let device = self.with_link(handle, |link| link.device.clone())?;
        let links = self.links.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            match collect_characteristics(&device).await {
                Ok(found) => {
                    let handles: Vec<CharacteristicHandle> =
                        found.iter().map(|(h, _)| *h).collect();
                    if let Some(link) = links.lock().get_mut(&handle) {
                        link.characteristics =
                            found.into_iter().map(|(h, c)| (h.uuid, c)).collect();
                    }
                    sink.emit(RadioEvent::ServicesDiscovered {
                        handle,
                        status: GattStatus::SUCCESS,
                        characteristics: handles,
                    });
                }
                Err(e) => {
                    error!("Service discovery failed: {}", e);
                    sink.emit(RadioEvent::ServicesDiscovered {
                        handle,
                        status: gatt_status(&e),
                        characteristics: Vec::new(),
                    });
                }
            }
        });
        Ok(())
    }

    fn read_characteristic(&self, handle: HandleId, uuid: Uuid) -> Result<(), AdapterError> {
        let characteristic = self.characteristic(handle, uuid)?;
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let (value, status) = match characteristic.read().await {
                Ok(value) => (value, GattStatus::SUCCESS),
                Err(e) => {
                    warn!("Read of {} failed: {}", uuid, e);
                    (Vec::new(), gatt_status(&e))
                }
            };
            sink.emit(RadioEvent::CharacteristicRead {
                handle,
                uuid,
                value,
                status,
            });
        });
        Ok(())
    }

    fn write_characteristic(
        &self,
        handle: HandleId,
        uuid: Uuid,
        value: Vec<u8>,
        mode: WriteMode,
    ) -> Result<(), AdapterError> {
        let characteristic = self.characteristic(handle, uuid)?;
        let sink = self.sink.clone();
        let request = CharacteristicWriteRequest {
            op_type: match mode {
                WriteMode::WithResponse => WriteOp::Request,
                WriteMode::WithoutResponse => WriteOp::Command,
            },
            ..Default::default()
        };

        tokio::spawn(async move {
            let status = match characteristic.write_ext(&value, &request).await {
                Ok(()) => GattStatus::SUCCESS,
                Err(e) => {
                    warn!("Write to {} failed: {}", uuid, e);
                    gatt_status(&e)
                }
            };
            sink.emit(RadioEvent::CharacteristicWritten {
                handle,
                uuid,
                status,
            });
        });
        Ok(())
    }

    fn read_signal_strength(&self, handle: HandleId) -> Result<(), AdapterError> {
        let device = self.with_link(handle, |link| link.device.clone())?;
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let (rssi, status) = match device.rssi().await {
                Ok(Some(rssi)) => (rssi, GattStatus::SUCCESS),
                Ok(None) => (0, GattStatus::FAILURE),
                Err(e) => (0, gatt_status(&e)),
            };
            sink.emit(RadioEvent::SignalStrengthRead {
                handle,
                rssi,
                status,
            });
        });
        Ok(())
    }
}

impl Drop for BluezAdapter {
    fn drop(&mut self) {
        self.power_task.abort();
        if let Some(task) = self.scan_task.lock().take() {
            task.abort();
        }
        for (_, link) in self.links.lock().drain() {
            link.watcher.abort();
        }
    }
}

async fn watch_power(adapter: Adapter, enabled: Arc<AtomicBool>, sink: RadioEventSink) {
    let events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Cannot watch adapter power state: {}", e);
            return;
        }
    };
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
            if enabled.swap(powered, Ordering::SeqCst) != powered {
                info!("Bluetooth adapter powered {}", if powered { "on" } else { "off" });
                sink.emit(RadioEvent::AdapterStateChanged { enabled: powered });
            }
        }
    }
}

async fn scan_devices(adapter: Adapter, sink: RadioEventSink) {
    let events = match adapter.discover_devices_with_changes().await {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to start BlueZ discovery: {}", e);
            sink.emit(RadioEvent::ScanFailed {
                code: scan_failure_code(&e),
            });
            return;
        }
    };
    pin_mut!(events);
    debug!("BlueZ discovery started");

    while let Some(event) = events.next().await {
        if let AdapterEvent::DeviceAdded(address) = event {
            match read_sighting(&adapter, address).await {
                Ok(sighting) => sink.emit(RadioEvent::Sighting(sighting)),
                Err(e) => debug!("Skipping {}: {}", address, e),
            }
        }
    }
    debug!("BlueZ discovery stream ended");
}

async fn read_sighting(adapter: &Adapter, address: Address) -> bluer::Result<Sighting> {
    let device = adapter.device(address)?;
    let rssi = device.rssi().await?;
    let name = device.name().await?;
    let advertisement = device
        .manufacturer_data()
        .await?
        .map(|data| flatten_manufacturer_data(&data));

    let mut sighting = Sighting::new(address.to_string(), rssi, advertisement);
    sighting.name = name;
    Ok(sighting)
}

/// Concatenate manufacturer data as `company id (LE) || payload`, ordered by id.
fn flatten_manufacturer_data(data: &HashMap<u16, Vec<u8>>) -> Vec<u8> {
    let mut entries: Vec<_> = data.iter().collect();
    entries.sort_by_key(|(id, _)| **id);

    let mut bytes = Vec::new();
    for (id, payload) in entries {
        bytes.extend_from_slice(&id.to_le_bytes());
        bytes.extend_from_slice(payload);
    }
    bytes
}

async fn run_link(
    handle: HandleId,
    address: PeripheralAddress,
    device: Device,
    disconnect_requested: Arc<AtomicBool>,
    sink: RadioEventSink,
) {
    let state_changed = |status: GattStatus, state: LinkStatus| RadioEvent::ConnectionStateChanged {
        handle,
        address: address.clone(),
        status,
        state,
    };

    // subscribe before connecting so an early drop is not missed
    let events = match device.events().await {
        Ok(events) => events,
        Err(e) => {
            error!("Cannot watch {}: {}", address, e);
            sink.emit(state_changed(gatt_status(&e), LinkStatus::Disconnected));
            return;
        }
    };
    pin_mut!(events);

    if let Err(e) = device.connect().await {
        error!("Connection to {} failed: {}", address, e);
        sink.emit(state_changed(GattStatus::ERROR, LinkStatus::Disconnected));
        return;
    }
    info!("Link to {} is up", address);
    sink.emit(state_changed(GattStatus::SUCCESS, LinkStatus::Connected));

    while let Some(event) = events.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
            // BlueZ does not expose the HCI reason; report a supervision timeout
            let status = if disconnect_requested.load(Ordering::SeqCst) {
                GattStatus::SUCCESS
            } else {
                GattStatus::CONN_TIMEOUT
            };
            info!("Link to {} is down", address);
            sink.emit(state_changed(status, LinkStatus::Disconnected));
            return;
        }
    }
}

async fn collect_characteristics(
    device: &Device,
) -> bluer::Result<Vec<(CharacteristicHandle, Characteristic)>> {
    for _ in 0..SERVICE_RESOLVE_ATTEMPTS {
        if device.is_services_resolved().await? {
            break;
        }
        tokio::time::sleep(SERVICE_RESOLVE_POLL).await;
    }

    let mut found = Vec::new();
    for service in device.services().await? {
        for characteristic in service.characteristics().await? {
            let uuid = characteristic.uuid().await?;
            let flags = characteristic.flags().await?;
            let properties = CharacteristicProperties {
                read: flags.read,
                write: flags.write,
                write_without_response: flags.write_without_response,
                notify: flags.notify,
            };
            debug!("Found characteristic {} {:?}", uuid, properties);
            found.push((CharacteristicHandle { uuid, properties }, characteristic));
        }
    }
    Ok(found)
}

fn scan_failure_code(err: &bluer::Error) -> i32 {
    match err.kind {
        ErrorKind::InProgress => 1,
        ErrorKind::NotSupported => 4,
        _ => 3,
    }
}

fn gatt_status(err: &bluer::Error) -> GattStatus {
    match err.kind {
        ErrorKind::NotPermitted => GattStatus::READ_NOT_PERMITTED,
        ErrorKind::NotAuthorized => GattStatus::INSUFFICIENT_AUTHENTICATION,
        ErrorKind::InvalidLength => GattStatus::INVALID_ATTRIBUTE_LENGTH,
        _ => GattStatus::FAILURE,
    }
}

fn platform_error(err: bluer::Error) -> AdapterError {
    match err.kind {
        ErrorKind::NotReady => AdapterError::NotEnabled,
        ErrorKind::InProgress => AdapterError::Busy,
        _ => AdapterError::Platform(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manufacturer_data_layout() {
        let mut data = HashMap::new();
        data.insert(0x0059u16, vec![0xAA, 0xBB]);
        data.insert(0x004Cu16, vec![0x01]);

        assert_eq!(
            flatten_manufacturer_data(&data),
            vec![0x4C, 0x00, 0x01, 0x59, 0x00, 0xAA, 0xBB]
        );
    }

    #[test]
    fn test_empty_manufacturer_data() {
        assert!(flatten_manufacturer_data(&HashMap::new()).is_empty());
    }
}
