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

//! The BLE central.
//!
//! A single task owns all mutable state: discovery, the connection session,
//! the connected record and the sensor history. Caller commands, radio
//! events and timer ticks all arrive on one queue and are handled in order,
//! so no handler ever observes a half-applied transition.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::adapter::{
    CharacteristicHandle, HandleId, LinkStatus, NativeHandle, RadioAdapter, RadioEvent,
    RadioOperation,
};
use super::ble_constants::{
    timing, GattStatus, LOCATION_CHARACTERISTIC_UUID, MAX_SENSOR_HISTORY,
    SENSOR_CHARACTERISTIC_UUID,
};
use super::codec;
use super::discovery::DiscoveryAggregator;
use super::policy::{ReconnectPolicy, SessionProgress, TerminationCause};
use super::telemetry::TelemetryPoller;
use crate::collaborators::{DisconnectNotifier, LocationProvider};
use crate::error::{AdapterError, CentralError, ScanFailureReason};
use crate::events::{CentralCommand, CentralHandle, CentralMessage, Mailbox, PollStep};
use crate::peripheral::{PeripheralAddress, PeripheralRecord, SensorHistory, SensorSample};
use crate::state::{state_channels, LinkState, StatePublisher, StateView};

/// Tunables for a [`Central`].
#[derive(Debug, Clone)]
pub struct CentralSettings {
    /// Debounce window for scan sightings.
    pub debounce: Duration,
    /// Wait between link-up and service discovery.
    pub settle_delay: Duration,
    /// Delay after each telemetry step.
    pub poll_interval: Duration,
    pub history_capacity: usize,
    /// Multiplier applied to degrees before truncation on the wire.
    pub coordinate_scale: f64,
    /// Resume scanning after a session ends.
    pub auto_restart_discovery: bool,
}

impl Default for CentralSettings {
    fn default() -> Self {
        Self {
            debounce: timing::DEBOUNCE,
            settle_delay: timing::SETTLE_DELAY,
            poll_interval: timing::POLL_INTERVAL,
            history_capacity: MAX_SENSOR_HISTORY,
            coordinate_scale: 1.0,
            auto_restart_discovery: true,
        }
    }
}

/// How many released handles are remembered for filtering late events.
const RETIRED_HANDLES: usize = 32;

/// Identifies one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub(crate) u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug)]
struct ConnectionSession {
    id: SessionId,
    target: PeripheralAddress,
    state: LinkState,
    handle: Option<NativeHandle>,
    sensor: Option<CharacteristicHandle>,
    location: Option<CharacteristicHandle>,
    established: bool,
    ready: bool,
    user_requested: bool,
}

impl ConnectionSession {
    fn new(id: SessionId, target: PeripheralAddress) -> Self {
        Self {
            id,
            target,
            state: LinkState::Connecting,
            handle: None,
            sensor: None,
            location: None,
            established: false,
            ready: false,
            user_requested: false,
        }
    }

    fn handle_id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(NativeHandle::id)
    }

    fn owns(&self, handle: HandleId) -> bool {
        self.handle_id() == Some(handle)
    }

    fn characteristic(&self, uuid: Uuid) -> Option<CharacteristicHandle> {
        [self.sensor, self.location]
            .into_iter()
            .flatten()
            .find(|c| c.uuid == uuid)
    }

    fn progress(&self) -> SessionProgress {
        SessionProgress {
            established: self.established,
            ready: self.ready,
        }
    }
}

/// Recently released handles, oldest first.
#[derive(Debug, Default)]
struct RetiredHandles {
    ids: VecDeque<HandleId>,
}

impl RetiredHandles {
    /// Remember `handle`. Returns `false` if it was already retired.
    fn insert(&mut self, handle: HandleId) -> bool {
        if self.ids.contains(&handle) {
            return false;
        }
        if self.ids.len() == RETIRED_HANDLES {
            self.ids.pop_front();
        }
        self.ids.push_back(handle);
        true
    }
}

/// Owner of the central's state. Drive it with [`Central::run`].
///
/// The loop ends on [`CentralHandle::shutdown`] or once every handle is
/// dropped. Dropping the central, including aborting the task running it,
/// tears down the active session the same way.
pub struct Central {
    adapter: Arc<dyn RadioAdapter>,
    location: Arc<dyn LocationProvider>,
    notifier: Arc<dyn DisconnectNotifier>,
    settings: CentralSettings,
    policy: ReconnectPolicy,
    tx: mpsc::UnboundedSender<CentralMessage>,
    rx: mpsc::UnboundedReceiver<CentralMessage>,
    /// Closes when the last [`CentralHandle`] is dropped.
    handles: mpsc::Receiver<()>,
    discovery: DiscoveryAggregator,
    session: Option<ConnectionSession>,
    connected: Option<PeripheralRecord>,
    history: SensorHistory,
    poller: TelemetryPoller,
    settle_task: Option<JoinHandle<()>>,
    /// Handles already released; late events for them are ignored.
    retired: RetiredHandles,
    next_session: u64,
    radio_enabled: bool,
    shutting_down: bool,
    state: StatePublisher,
}

impl Central {
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        mailbox: Mailbox,
        location: Arc<dyn LocationProvider>,
        notifier: Arc<dyn DisconnectNotifier>,
        settings: CentralSettings,
    ) -> (Self, CentralHandle, StateView) {
        let Mailbox { tx, rx } = mailbox;
        let (state, view) = state_channels();
        let (alive, handles) = mpsc::channel(1);
        let radio_enabled = adapter.is_enabled();

        let central = Self {
            discovery: DiscoveryAggregator::new(settings.debounce, tx.clone()),
            history: SensorHistory::new(settings.history_capacity),
            poller: TelemetryPoller::new(settings.poll_interval),
            policy: ReconnectPolicy::new(settings.auto_restart_discovery),
            adapter,
            location,
            notifier,
            settings,
            tx: tx.clone(),
            rx,
            handles,
            session: None,
            connected: None,
            settle_task: None,
            retired: RetiredHandles::default(),
            next_session: 0,
            radio_enabled,
            shutting_down: false,
            state,
        };

        (central, CentralHandle::new(tx, alive), view)
    }

    /// Process messages until shutdown.
    pub async fn run(mut self) {
        info!(
            "Central started (bluetooth {})",
            if self.radio_enabled { "on" } else { "off" }
        );

        loop {
            tokio::select! {
                biased;
                message = self.rx.recv() => {
                    let Some(message) = message else { break };
                    if !self.handle_message(message) {
                        break;
                    }
                }
                _ = self.handles.recv() => {
                    info!("All central handles dropped");
                    self.shutdown();
                    break;
                }
            }
        }

        info!("Central stopped");
    }

    fn handle_message(&mut self, message: CentralMessage) -> bool {
        match message {
            CentralMessage::Radio(event) => self.handle_radio_event(event),
            CentralMessage::Command(command) => return self.handle_command(command),
            CentralMessage::DiscoveryFlush {
                generation,
                sightings,
            } => {
                if self.discovery.apply(generation, &sightings) {
                    self.publish_peripherals();
                }
            }
            CentralMessage::BeginServiceDiscovery { session } => {
                self.begin_service_discovery(session)
            }
            CentralMessage::Poll { session, step } => self.poll(session, step),
        }
        true
    }

    fn handle_command(&mut self, command: CentralCommand) -> bool {
        match command {
            CentralCommand::StartDiscovery(reply) => {
                let _ = reply.send(self.start_discovery());
            }
            CentralCommand::StopDiscovery(reply) => {
                self.stop_discovery();
                let _ = reply.send(());
            }
            CentralCommand::Connect(address, reply) => {
                let _ = reply.send(self.connect(address));
            }
            CentralCommand::Disconnect(reply) => {
                let _ = reply.send(self.disconnect());
            }
            CentralCommand::Sync(reply) => {
                let _ = reply.send(());
            }
            CentralCommand::Shutdown(reply) => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // ---- discovery ----

    fn start_discovery(&mut self) -> Result<(), CentralError> {
        if !self.adapter.has_permission(RadioOperation::Scan) {
            warn!("Scan permission not granted");
            return Err(CentralError::PermissionDenied {
                operation: RadioOperation::Scan,
            });
        }
        if !self.radio_enabled {
            warn!("Cannot scan: Bluetooth is off");
            return Err(CentralError::RadioDisabled);
        }
        if let Some(session) = &self.session {
            debug!("Not scanning while session with {} is active", session.target);
            return Err(CentralError::SessionBusy {
                state: session.state,
            });
        }
        if self.discovery.is_active() {
            debug!("Discovery already active");
            return Ok(());
        }

        if let Err(e) = self.adapter.start_scan() {
            error!("Failed to start scan: {}", e);
            return Err(match e {
                AdapterError::PermissionDenied | AdapterError::NotEnabled => {
                    CentralError::from_adapter(RadioOperation::Scan, e)
                }
                _ => CentralError::ScanStartFailure {
                    reason: ScanFailureReason::InternalError,
                },
            });
        }

        self.discovery.begin();
        self.state.set_scanning(true);
        self.publish_peripherals();
        info!("Discovery started");
        Ok(())
    }

    fn stop_discovery(&mut self) {
        if self.discovery.is_active() {
            if self.radio_enabled {
                self.adapter.stop_scan();
            }
            info!("Discovery stopped");
        }
        self.discovery.halt();
        self.state.set_scanning(false);
    }

    fn on_scan_failed(&mut self, code: i32) {
        let reason = ScanFailureReason::from_code(code);
        error!("Scan failed: {}", reason);
        self.discovery.halt();
        self.state.set_scanning(false);
    }

    // ---- connection ----

    fn connect(&mut self, address: PeripheralAddress) -> Result<(), CentralError> {
        if !self.adapter.has_permission(RadioOperation::Connect) {
            warn!("Connect permission not granted");
            return Err(CentralError::PermissionDenied {
                operation: RadioOperation::Connect,
            });
        }
        if !self.radio_enabled {
            warn!("Cannot connect to {}: Bluetooth is off", address);
            return Err(CentralError::RadioDisabled);
        }
        if let Some(session) = &self.session {
            warn!(
                "Refusing connection to {}: session with {} is {}",
                address,
                session.target,
                session.state.as_str()
            );
            return Err(CentralError::SessionBusy {
                state: session.state,
            });
        }

        self.stop_discovery();
        let record = self
            .discovery
            .remove(&address)
            .unwrap_or_else(|| PeripheralRecord::new(address.clone()));
        self.publish_peripherals();

        self.next_session += 1;
        let id = SessionId(self.next_session);
        info!("Connecting to {} ({}, {})", record.display_name(), address, id);

        self.session = Some(ConnectionSession::new(id, address.clone()));
        self.state.set_last_error(None);
        self.connected = Some(record);
        self.state.set_connecting(true);
        self.publish_connected();
        self.publish_link_state();

        match self.adapter.connect(&address) {
            Ok(handle) => {
                debug!("Connection to {} submitted on handle {}", address, handle.id());
                if let Some(session) = self.session.as_mut() {
                    session.handle = Some(handle);
                }
                Ok(())
            }
            Err(e) => {
                error!("Connect request for {} rejected: {}", address, e);
                self.cleanup(TerminationCause::ConnectionFailed {
                    status: GattStatus::FAILURE,
                });
                Err(CentralError::from_adapter(RadioOperation::Connect, e))
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), CentralError> {
        let Some(session) = self.session.as_mut() else {
            debug!("Disconnect requested with no active session");
            return Ok(());
        };
        if session.state == LinkState::Disconnecting {
            debug!("Disconnect already in progress");
            return Ok(());
        }

        info!("Disconnecting from {}", session.target);
        session.state = LinkState::Disconnecting;
        session.user_requested = true;
        let handle = session.handle_id();

        self.poller.stop();
        if let Some(task) = self.settle_task.take() {
            task.abort();
        }
        self.publish_link_state();

        let submitted = match handle {
            Some(handle) => self.adapter.disconnect(handle),
            None => Err(AdapterError::UnknownHandle),
        };
        if let Err(e) = submitted {
            warn!("Disconnect request failed ({}), cleaning up directly", e);
            self.cleanup(TerminationCause::UserRequested {
                status: GattStatus::FAILURE,
            });
        }
        Ok(())
    }

    fn on_connection_state_changed(
        &mut self,
        handle: HandleId,
        address: PeripheralAddress,
        status: GattStatus,
        link: LinkStatus,
    ) {
        let owned = self.session.as_ref().is_some_and(|s| s.owns(handle));
        if !owned {
            if self.retired.insert(handle) {
                warn!(
                    "Unexpected {:?} ({}) from {} on handle {}, closing it",
                    link, status, address, handle
                );
                self.adapter.close(handle);
            } else {
                debug!("Ignoring {:?} for inactive handle {} ({})", link, handle, address);
            }
            return;
        }

        match link {
            LinkStatus::Connected if status.is_success() => self.on_link_up(),
            LinkStatus::Connected => {
                error!("Connection to {} failed: {}", address, status);
                self.cleanup(TerminationCause::ConnectionFailed { status });
            }
            LinkStatus::Disconnected => {
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                let cause = if session.user_requested {
                    TerminationCause::UserRequested { status }
                } else if !session.established {
                    TerminationCause::ConnectionFailed { status }
                } else {
                    TerminationCause::LinkLost { status }
                };
                info!("Disconnected from {}: {}", address, status);
                self.cleanup(cause);
            }
        }
    }

    fn on_link_up(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != LinkState::Connecting {
            debug!("Ignoring repeated link-up while {}", session.state.as_str());
            return;
        }

        session.state = LinkState::DiscoveringServices;
        session.established = true;
        let id = session.id;
        info!("Connected to {}", session.target);

        if let Some(record) = self.connected.as_mut() {
            record.rssi = None;
            record.services_discovered = false;
            record.sensor_data = None;
            record.is_write_pending = false;
            record.last_write_success = None;
        }
        self.history.clear();
        self.state.set_connecting(false);
        self.publish_connected();
        self.publish_history();
        self.publish_link_state();

        let tx = self.tx.clone();
        let delay = self.settings.settle_delay;
        self.settle_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CentralMessage::BeginServiceDiscovery { session: id });
        }));
    }

    fn begin_service_discovery(&mut self, id: SessionId) {
        self.settle_task = None;
        let Some(session) = self
            .session
            .as_ref()
            .filter(|s| s.id == id && s.state == LinkState::DiscoveringServices)
        else {
            debug!("Skipping service discovery for stale {}", id);
            return;
        };
        let Some(handle) = session.handle_id() else {
            return;
        };

        debug!("Discovering services on {}", session.target);
        if let Err(e) = self.adapter.discover_services(handle) {
            error!("Service discovery request rejected: {}", e);
            self.cleanup(TerminationCause::ServiceDiscoveryFailed {
                status: GattStatus::FAILURE,
            });
        }
    }

    fn on_services_discovered(
        &mut self,
        handle: HandleId,
        status: GattStatus,
        characteristics: Vec<CharacteristicHandle>,
    ) {
        let Some(session) = self.session.as_mut().filter(|s| s.owns(handle)) else {
            warn!("Services discovered on inactive handle {}", handle);
            return;
        };
        if session.state != LinkState::DiscoveringServices {
            debug!("Ignoring service discovery result while {}", session.state.as_str());
            return;
        }
        if !status.is_success() {
            error!("Service discovery failed: {}", status);
            self.cleanup(TerminationCause::ServiceDiscoveryFailed { status });
            return;
        }

        let find = |uuid: Uuid| characteristics.iter().find(|c| c.uuid == uuid).copied();
        let sensor = find(SENSOR_CHARACTERISTIC_UUID);
        let location = find(LOCATION_CHARACTERISTIC_UUID);
        if sensor.is_none() {
            warn!("Sensor characteristic {} not found", SENSOR_CHARACTERISTIC_UUID);
        }
        if location.is_none() {
            warn!("Location characteristic {} not found", LOCATION_CHARACTERISTIC_UUID);
        }

        session.sensor = sensor;
        session.location = location;
        session.state = LinkState::Ready;
        session.ready = true;
        let id = session.id;
        info!(
            "Services discovered on {} ({} characteristics)",
            session.target,
            characteristics.len()
        );

        if let Some(record) = self.connected.as_mut() {
            record.services_discovered = true;
        }
        self.publish_connected();
        self.publish_link_state();

        if sensor.is_some() {
            self.location.start();
            self.poller
                .start(id, self.state.subscribe_link_state(), self.tx.clone());
        } else {
            warn!("Telemetry disabled: no sensor characteristic");
        }
    }

    // ---- telemetry ----

    fn poll(&mut self, id: SessionId, step: PollStep) {
        let current = self
            .session
            .as_ref()
            .is_some_and(|s| s.id == id && s.state == LinkState::Ready);
        if !current {
            debug!("Dropping {:?} for inactive {}", step, id);
            return;
        }

        let result = match step {
            PollStep::ReadSensor => self.request_sensor_read(),
            PollStep::WriteLocation => self.request_location_write(),
        };
        if let Err(e) = result {
            warn!("Telemetry {:?} not submitted: {}", step, e);
        }
    }

    fn ready_characteristic(
        &self,
        uuid: Uuid,
    ) -> Result<(HandleId, CharacteristicHandle), CentralError> {
        let session = self
            .session
            .as_ref()
            .filter(|s| s.state == LinkState::Ready);
        let handle = session.and_then(ConnectionSession::handle_id);
        let characteristic = session.and_then(|s| s.characteristic(uuid));
        match (handle, characteristic) {
            (Some(handle), Some(characteristic)) => Ok((handle, characteristic)),
            _ => Err(CentralError::CharacteristicNotFound { uuid }),
        }
    }

    fn request_sensor_read(&mut self) -> Result<(), CentralError> {
        let (handle, sensor) = self.ready_characteristic(SENSOR_CHARACTERISTIC_UUID)?;
        codec::ensure_readable(&sensor.properties)?;

        self.adapter
            .read_characteristic(handle, sensor.uuid)
            .map_err(|e| CentralError::from_adapter(RadioOperation::Read, e))?;

        if let Err(e) = self.adapter.read_signal_strength(handle) {
            debug!("Signal strength read not submitted: {}", e);
        }
        Ok(())
    }

    fn request_location_write(&mut self) -> Result<(), CentralError> {
        let (handle, location) = self.ready_characteristic(LOCATION_CHARACTERISTIC_UUID)?;
        let mode = codec::select_write_mode(&location.properties)?;

        let position = self.location.last_known_location();
        if position.is_none() {
            debug!("No location fix, sending 0/0");
        }
        let payload = codec::encode_location(position, self.settings.coordinate_scale);
        debug!("Writing location ({} bytes, {:?})", payload.len(), mode);

        self.adapter
            .write_characteristic(handle, location.uuid, payload, mode)
            .map_err(|e| CentralError::from_adapter(RadioOperation::Write, e))?;

        if let Some(record) = self.connected.as_mut() {
            record.is_write_pending = true;
        }
        self.publish_connected();
        Ok(())
    }

    fn owns(&self, handle: HandleId) -> bool {
        self.session.as_ref().is_some_and(|s| s.owns(handle))
    }

    fn on_characteristic_read(
        &mut self,
        handle: HandleId,
        uuid: Uuid,
        value: Vec<u8>,
        status: GattStatus,
    ) {
        if !self.owns(handle) {
            warn!("Ignoring read result from inactive handle {}", handle);
            return;
        }
        if uuid != SENSOR_CHARACTERISTIC_UUID {
            debug!("Ignoring read result from characteristic {}", uuid);
            return;
        }
        if !status.is_success() {
            warn!("Sensor read failed: {}", status);
            return;
        }

        match codec::decode_sensor(&value) {
            Ok(reading) => {
                debug!("Sensor reading: {:?}", reading);
                self.history.push(SensorSample::new(Utc::now(), reading));
                if let Some(record) = self.connected.as_mut() {
                    record.sensor_data = Some(reading);
                }
                self.publish_connected();
                self.publish_history();
            }
            Err(e) => warn!("{} ({} bytes)", e, value.len()),
        }
    }

    fn on_characteristic_written(&mut self, handle: HandleId, uuid: Uuid, status: GattStatus) {
        if !self.owns(handle) {
            warn!("Ignoring write result from inactive handle {}", handle);
            return;
        }
        if uuid != LOCATION_CHARACTERISTIC_UUID {
            debug!("Ignoring write result for characteristic {}", uuid);
            return;
        }

        let success = status.is_success();
        if success {
            debug!("Location written");
        } else {
            warn!("Location write failed: {}", status);
        }
        if let Some(record) = self.connected.as_mut() {
            record.is_write_pending = false;
            record.last_write_success = Some(success);
        }
        self.publish_connected();
    }

    fn on_signal_strength_read(&mut self, handle: HandleId, rssi: i16, status: GattStatus) {
        if !self.owns(handle) {
            return;
        }
        if !status.is_success() {
            debug!("Signal strength read failed: {}", status);
            return;
        }
        if let Some(record) = self.connected.as_mut() {
            record.rssi = Some(rssi);
        }
        self.publish_connected();
    }

    // ---- radio ----

    fn handle_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Sighting(sighting) => self.discovery.record([sighting]),
            RadioEvent::BatchSighting(sightings) => self.discovery.record(sightings),
            RadioEvent::ScanFailed { code } => self.on_scan_failed(code),
            RadioEvent::ConnectionStateChanged {
                handle,
                address,
                status,
                state,
            } => self.on_connection_state_changed(handle, address, status, state),
            RadioEvent::ServicesDiscovered {
                handle,
                status,
                characteristics,
            } => self.on_services_discovered(handle, status, characteristics),
            RadioEvent::CharacteristicRead {
                handle,
                uuid,
                value,
                status,
            } => self.on_characteristic_read(handle, uuid, value, status),
            RadioEvent::CharacteristicWritten {
                handle,
                uuid,
                status,
            } => self.on_characteristic_written(handle, uuid, status),
            RadioEvent::SignalStrengthRead {
                handle,
                rssi,
                status,
            } => self.on_signal_strength_read(handle, rssi, status),
            RadioEvent::AdapterStateChanged { enabled } => self.on_adapter_state_changed(enabled),
        }
    }

    fn on_adapter_state_changed(&mut self, enabled: bool) {
        if enabled == self.radio_enabled {
            return;
        }
        self.radio_enabled = enabled;

        if enabled {
            info!("Bluetooth turned on");
            return;
        }

        warn!("Bluetooth turned off");
        self.discovery.halt();
        self.discovery.clear();
        self.state.set_scanning(false);
        self.publish_peripherals();
        self.cleanup(TerminationCause::AdapterOff);
    }

    // ---- teardown ----

    /// End the active session. Does nothing if there is none.
    fn cleanup(&mut self, cause: TerminationCause) {
        let Some(mut session) = self.session.take() else {
            debug!("No session to clean up ({})", cause);
            return;
        };
        info!("Ending {} with {}: {}", session.id, session.target, cause);

        self.poller.stop();
        if let Some(task) = self.settle_task.take() {
            task.abort();
        }
        self.location.stop();

        if let Some(handle) = session.handle.take() {
            self.retired.insert(handle.id());
            handle.release(self.adapter.as_ref());
        }

        let record = self.connected.take();
        self.history.clear();
        self.state.set_connecting(false);
        self.publish_connected();
        self.publish_history();
        self.publish_link_state();
        if let Some(error) = cause.error() {
            self.state.set_last_error(Some(error));
        }

        if self.policy.should_notify(cause, session.progress()) {
            let name = record
                .as_ref()
                .map(|r| r.display_name().to_string())
                .unwrap_or_else(|| session.target.to_string());
            self.notifier.notify_disconnected(&name);
        }

        if !self.shutting_down && self.policy.should_resume_discovery(cause, self.radio_enabled) {
            if let Err(e) = self.start_discovery() {
                warn!("Could not resume discovery: {}", e);
            }
        }
    }

    fn shutdown(&mut self) {
        info!("Shutting down central");
        self.shutting_down = true;
        self.stop_discovery();
        self.poller.stop();

        if let Some(handle) = self.session.as_ref().and_then(ConnectionSession::handle_id) {
            if let Err(e) = self.adapter.disconnect(handle) {
                debug!("Disconnect during shutdown failed: {}", e);
            }
        }
        self.cleanup(TerminationCause::Shutdown);
    }

    // ---- state publication ----

    fn publish_peripherals(&self) {
        self.state.set_peripherals(self.discovery.snapshot());
    }

    fn publish_connected(&self) {
        self.state.set_connected(self.connected.clone());
    }

    fn publish_history(&self) {
        self.state.set_sensor_history(self.history.snapshot());
    }

    fn publish_link_state(&self) {
        let state = self.session.as_ref().map_or(LinkState::Idle, |s| s.state);
        self.state.set_link_state(state);
    }
}

impl Drop for Central {
    fn drop(&mut self) {
        if !self.shutting_down {
            self.shutdown();
        }
    }
}
