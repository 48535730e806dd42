//! Integration tests for the full central flow against an in-memory radio.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prost::Message;
use tokio::task::JoinHandle;
use uuid::Uuid;

use buzz_central::bluetooth::adapter::{
    CharacteristicHandle, CharacteristicProperties, HandleId, LinkStatus, NativeHandle,
    RadioAdapter, RadioEvent, RadioEventSink, RadioOperation, WriteMode,
};
use buzz_central::bluetooth::ble_constants::{
    GattStatus, LOCATION_CHARACTERISTIC_UUID, SENSOR_CHARACTERISTIC_UUID,
};
use buzz_central::bluetooth::codec::{encode_sensor, LocationData};
use buzz_central::bluetooth::LinkState;
use buzz_central::collaborators::{DisconnectNotifier, GeoPoint, LocationProvider};
use buzz_central::error::AdapterError;
use buzz_central::events;
use buzz_central::peripheral::{PeripheralAddress, SensorReading, Sighting};
use buzz_central::{Central, CentralError, CentralHandle, CentralSettings, StateView};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(HandleId),
    Close(HandleId),
    DiscoverServices(HandleId),
    Read(HandleId, Uuid),
    Write(HandleId, Uuid, Vec<u8>, WriteMode),
    ReadSignalStrength(HandleId),
}

struct RecordingAdapter {
    calls: Mutex<Vec<Call>>,
    enabled: AtomicBool,
    denied: Mutex<Vec<RadioOperation>>,
    rejected: Mutex<Vec<RadioOperation>>,
    next_handle: AtomicU64,
}

impl RecordingAdapter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
            denied: Mutex::new(Vec::new()),
            rejected: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn count_where(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| f(c)).count()
    }

    fn deny(&self, operation: RadioOperation) {
        self.denied.lock().push(operation);
    }

    fn reject(&self, operation: RadioOperation) {
        self.rejected.lock().push(operation);
    }

    fn submit(&self, operation: RadioOperation, call: Call) -> Result<(), AdapterError> {
        if self.rejected.lock().contains(&operation) {
            return Err(AdapterError::Busy);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl RadioAdapter for RecordingAdapter {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn has_permission(&self, operation: RadioOperation) -> bool {
        !self.denied.lock().contains(&operation)
    }

    fn start_scan(&self) -> Result<(), AdapterError> {
        self.submit(RadioOperation::Scan, Call::StartScan)
    }

    fn stop_scan(&self) {
        self.calls.lock().push(Call::StopScan);
    }

    fn connect(&self, address: &PeripheralAddress) -> Result<NativeHandle, AdapterError> {
        self.submit(RadioOperation::Connect, Call::Connect(address.to_string()))?;
        Ok(NativeHandle::new(HandleId(
            self.next_handle.fetch_add(1, Ordering::SeqCst),
        )))
    }

    fn disconnect(&self, handle: HandleId) -> Result<(), AdapterError> {
        self.submit(RadioOperation::Disconnect, Call::Disconnect(handle))
    }

    fn close(&self, handle: HandleId) {
        self.calls.lock().push(Call::Close(handle));
    }

    fn discover_services(&self, handle: HandleId) -> Result<(), AdapterError> {
        self.submit(RadioOperation::DiscoverServices, Call::DiscoverServices(handle))
    }

    fn read_characteristic(&self, handle: HandleId, uuid: Uuid) -> Result<(), AdapterError> {
        self.submit(RadioOperation::Read, Call::Read(handle, uuid))
    }

    fn write_characteristic(
        &self,
        handle: HandleId,
        uuid: Uuid,
        value: Vec<u8>,
        mode: WriteMode,
    ) -> Result<(), AdapterError> {
        self.submit(RadioOperation::Write, Call::Write(handle, uuid, value, mode))
    }

    fn read_signal_strength(&self, handle: HandleId) -> Result<(), AdapterError> {
        self.submit(
            RadioOperation::ReadSignalStrength,
            Call::ReadSignalStrength(handle),
        )
    }
}

#[derive(Default)]
struct RecordingLocation {
    location: Mutex<Option<GeoPoint>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl LocationProvider for RecordingLocation {
    fn last_known_location(&self) -> Option<GeoPoint> {
        *self.location.lock()
    }

    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingNotifier {
    names: Mutex<Vec<String>>,
}

impl DisconnectNotifier for RecordingNotifier {
    fn notify_disconnected(&self, peripheral_name: &str) {
        self.names.lock().push(peripheral_name.to_string());
    }
}

struct Harness {
    adapter: Arc<RecordingAdapter>,
    location: Arc<RecordingLocation>,
    notifier: Arc<RecordingNotifier>,
    handle: CentralHandle,
    view: StateView,
    sink: RadioEventSink,
    task: JoinHandle<()>,
}

const SETTLE: Duration = Duration::from_millis(700);
const FLUSH: Duration = Duration::from_millis(600);
const POLL: Duration = Duration::from_secs(5);

fn addr(s: &str) -> PeripheralAddress {
    s.parse().unwrap()
}

fn sensor_characteristic() -> CharacteristicHandle {
    CharacteristicHandle {
        uuid: SENSOR_CHARACTERISTIC_UUID,
        properties: CharacteristicProperties {
            read: true,
            notify: true,
            ..Default::default()
        },
    }
}

fn location_characteristic() -> CharacteristicHandle {
    CharacteristicHandle {
        uuid: LOCATION_CHARACTERISTIC_UUID,
        properties: CharacteristicProperties {
            write: true,
            write_without_response: true,
            ..Default::default()
        },
    }
}

fn reading(temperature: f32) -> SensorReading {
    SensorReading {
        temperature: Some(temperature),
        pressure: Some(1013.0),
        humidity: Some(45.0),
    }
}

impl Harness {
    fn start() -> Self {
        Self::with_adapter(RecordingAdapter::new())
    }

    fn with_adapter(adapter: Arc<RecordingAdapter>) -> Self {
        let location = Arc::new(RecordingLocation::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let (sink, mailbox) = events::mailbox();
        let (central, handle, view) = Central::new(
            adapter.clone(),
            mailbox,
            location.clone(),
            notifier.clone(),
            CentralSettings::default(),
        );
        let task = tokio::spawn(central.run());

        Self {
            adapter,
            location,
            notifier,
            handle,
            view,
            sink,
            task,
        }
    }

    /// Let spawned tasks run, then wait for the central to drain its queue.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.handle.sync().await.unwrap();
    }

    fn emit(&self, event: RadioEvent) {
        self.sink.emit(event);
    }

    fn link(&self, handle: HandleId, address: &str, status: GattStatus, state: LinkStatus) {
        self.emit(RadioEvent::ConnectionStateChanged {
            handle,
            address: addr(address),
            status,
            state,
        });
    }

    fn notifications(&self) -> Vec<String> {
        self.notifier.names.lock().clone()
    }

    async fn discover(&self, sightings: Vec<Sighting>) {
        self.handle.start_discovery().await.unwrap();
        self.emit(RadioEvent::BatchSighting(sightings));
        tokio::time::sleep(FLUSH).await;
        self.handle.sync().await.unwrap();
    }

    /// Connect to `address` and walk the session to `Ready`.
    async fn ready_session(&self, address: &str) -> HandleId {
        self.handle.connect(addr(address)).await.unwrap();
        let handle = HandleId(self.adapter.next_handle.load(Ordering::SeqCst) - 1);

        self.link(handle, address, GattStatus::SUCCESS, LinkStatus::Connected);
        tokio::time::sleep(SETTLE).await;
        self.settle().await;
        assert_eq!(self.adapter.count(&Call::DiscoverServices(handle)), 1);

        self.emit(RadioEvent::ServicesDiscovered {
            handle,
            status: GattStatus::SUCCESS,
            characteristics: vec![sensor_characteristic(), location_characteristic()],
        });
        self.settle().await;
        assert_eq!(self.view.link_state(), LinkState::Ready);
        handle
    }

    fn sensor_value(&self, handle: HandleId, value: Vec<u8>) {
        self.emit(RadioEvent::CharacteristicRead {
            handle,
            uuid: SENSOR_CHARACTERISTIC_UUID,
            value,
            status: GattStatus::SUCCESS,
        });
    }
}

#[tokio::test(start_paused = true)]
async fn test_sightings_merge_within_window() {
    let h = Harness::start();
    h.handle.start_discovery().await.unwrap();
    assert!(h.view.is_scanning());

    h.emit(RadioEvent::Sighting(Sighting::new("AA:BB", Some(-70), None)));
    h.emit(RadioEvent::Sighting(Sighting::new("AA:BB", Some(-60), None)));
    h.emit(RadioEvent::Sighting(Sighting::new("AA:BB", Some(-55), None)));
    h.settle().await;
    assert!(h.view.peripherals().is_empty());

    tokio::time::sleep(FLUSH).await;
    h.settle().await;

    let list = h.view.peripherals();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].address, addr("AA:BB"));
    assert_eq!(list[0].rssi, Some(-55));
}

#[tokio::test(start_paused = true)]
async fn test_sightings_without_address_dropped() {
    let h = Harness::start();
    let mut anonymous = Sighting::new("", Some(-40), None);
    anonymous.address = None;

    h.discover(vec![
        anonymous,
        Sighting::new("  ", Some(-41), None),
        Sighting::new("cc:dd", Some(-42), Some(vec![0x02, 0x01, 0x06])),
    ])
    .await;

    let list = h.view.peripherals();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].address.as_str(), "CC:DD");
    assert_eq!(list[0].advertisement_hex(), "020106");
    assert_eq!(list[0].display_name(), "Unknown Device");
}

#[tokio::test(start_paused = true)]
async fn test_rogue_connection_closed() {
    let h = Harness::start();
    h.handle.connect(addr("AA:BB")).await.unwrap();
    assert_eq!(h.view.link_state(), LinkState::Connecting);

    let rogue = HandleId(99);
    h.link(rogue, "CC:DD", GattStatus::SUCCESS, LinkStatus::Connected);
    h.settle().await;

    assert_eq!(h.adapter.count(&Call::Close(rogue)), 1);
    assert_eq!(h.adapter.count(&Call::Close(HandleId(1))), 0);
    assert_eq!(h.view.link_state(), LinkState::Connecting);
    assert!(h.view.is_connecting());
}

#[tokio::test(start_paused = true)]
async fn test_rogue_failures_closed_once() {
    let h = Harness::start();
    h.handle.connect(addr("AA:BB")).await.unwrap();

    let failed = HandleId(77);
    let dropped = HandleId(78);
    h.link(failed, "CC:DD", GattStatus::ERROR, LinkStatus::Connected);
    h.link(dropped, "EE:FF", GattStatus::CONN_TIMEOUT, LinkStatus::Disconnected);
    h.link(failed, "CC:DD", GattStatus::ERROR, LinkStatus::Disconnected);
    h.settle().await;

    assert_eq!(h.adapter.count(&Call::Close(failed)), 1);
    assert_eq!(h.adapter.count(&Call::Close(dropped)), 1);
    assert_eq!(h.adapter.count(&Call::Close(HandleId(1))), 0);
    assert_eq!(h.view.link_state(), LinkState::Connecting);
    assert!(h.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ready_session_polls_sensor_and_writes_location() {
    let h = Harness::start();
    *h.location.location.lock() = Some(GeoPoint {
        latitude: 52.23,
        longitude: 21.01,
        altitude: None,
    });

    let handle = h.ready_session("AA:BB").await;
    assert_eq!(h.location.starts.load(Ordering::SeqCst), 1);
    assert!(h.view.connected_peripheral().unwrap().services_discovered);
    assert_eq!(h.adapter.count(&Call::Read(handle, SENSOR_CHARACTERISTIC_UUID)), 1);
    assert_eq!(h.adapter.count(&Call::ReadSignalStrength(handle)), 1);

    h.sensor_value(handle, encode_sensor(&reading(21.5)));
    h.emit(RadioEvent::SignalStrengthRead {
        handle,
        rssi: -48,
        status: GattStatus::SUCCESS,
    });
    h.settle().await;

    let history = h.view.sensor_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].temperature, Some(21.5));
    let connected = h.view.connected_peripheral().unwrap();
    assert_eq!(connected.sensor_data, Some(reading(21.5)));
    assert_eq!(connected.rssi, Some(-48));

    tokio::time::sleep(POLL).await;
    h.settle().await;

    let writes: Vec<_> = h
        .adapter
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Write(_, uuid, value, mode) => Some((uuid, value, mode)),
            _ => None,
        })
        .collect();
    assert_eq!(writes.len(), 1);
    let (uuid, value, mode) = &writes[0];
    assert_eq!(*uuid, LOCATION_CHARACTERISTIC_UUID);
    assert_eq!(*mode, WriteMode::WithoutResponse);
    let location = LocationData::decode(value.as_slice()).unwrap();
    assert_eq!((location.latitude, location.longitude), (52, 21));
    assert!(h.view.connected_peripheral().unwrap().is_write_pending);

    h.emit(RadioEvent::CharacteristicWritten {
        handle,
        uuid: LOCATION_CHARACTERISTIC_UUID,
        status: GattStatus::SUCCESS,
    });
    h.settle().await;
    let connected = h.view.connected_peripheral().unwrap();
    assert!(!connected.is_write_pending);
    assert_eq!(connected.last_write_success, Some(true));

    tokio::time::sleep(POLL).await;
    h.settle().await;
    assert_eq!(h.adapter.count(&Call::Read(handle, SENSOR_CHARACTERISTIC_UUID)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_link_lost_alerts_and_resumes_discovery() {
    let h = Harness::start();
    h.discover(vec![Sighting::new("AA:BB", Some(-60), None).with_name("Buzz Sensor")])
        .await;
    let handle = h.ready_session("AA:BB").await;

    h.link(handle, "AA:BB", GattStatus::CONN_TIMEOUT, LinkStatus::Disconnected);
    h.settle().await;

    assert_eq!(h.notifications(), vec!["Buzz Sensor".to_string()]);
    assert_eq!(h.adapter.count(&Call::Close(handle)), 1);
    assert_eq!(h.view.link_state(), LinkState::Idle);
    assert!(h.view.connected_peripheral().is_none());
    assert!(h.view.sensor_history().is_empty());
    assert!(h.location.stops.load(Ordering::SeqCst) >= 1);
    assert!(h.view.is_scanning());
    assert_eq!(h.adapter.count(&Call::StartScan), 2);
}

#[tokio::test(start_paused = true)]
async fn test_user_disconnect_is_silent() {
    let h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    h.handle.disconnect().await.unwrap();
    assert_eq!(h.view.link_state(), LinkState::Disconnecting);
    assert_eq!(h.adapter.count(&Call::Disconnect(handle)), 1);

    h.link(handle, "AA:BB", GattStatus::SUCCESS, LinkStatus::Disconnected);
    h.settle().await;

    assert!(h.notifications().is_empty());
    assert_eq!(h.adapter.count(&Call::Close(handle)), 1);
    assert_eq!(h.view.link_state(), LinkState::Idle);
    assert!(h.view.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_polling() {
    let h = Harness::start();
    let handle = h.ready_session("AA:BB").await;
    let reads = h.adapter.count(&Call::Read(handle, SENSOR_CHARACTERISTIC_UUID));

    h.handle.disconnect().await.unwrap();
    tokio::time::sleep(POLL * 3).await;
    h.settle().await;

    assert_eq!(h.adapter.count(&Call::Read(handle, SENSOR_CHARACTERISTIC_UUID)), reads);
    assert_eq!(h.adapter.count_where(|c| matches!(c, Call::Write(..))), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_stops_discovery_and_takes_target() {
    let h = Harness::start();
    h.discover(vec![
        Sighting::new("AA:BB", Some(-60), None),
        Sighting::new("CC:DD", Some(-70), None),
    ])
    .await;
    assert_eq!(h.view.peripherals().len(), 2);

    h.handle.connect(addr("AA:BB")).await.unwrap();

    assert!(!h.view.is_scanning());
    assert!(h.view.is_connecting());
    let calls = h.adapter.calls();
    let stop = calls.iter().position(|c| *c == Call::StopScan).unwrap();
    let connect = calls
        .iter()
        .position(|c| *c == Call::Connect("AA:BB".to_string()))
        .unwrap();
    assert!(stop < connect);

    let list = h.view.peripherals();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].address, addr("CC:DD"));
    assert_eq!(h.view.connected_peripheral().unwrap().address, addr("AA:BB"));

    // late sightings are not applied while a session is active
    h.emit(RadioEvent::Sighting(Sighting::new("EE:FF", Some(-50), None)));
    tokio::time::sleep(FLUSH).await;
    h.settle().await;
    assert_eq!(h.view.peripherals().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_busy_is_refused() {
    let h = Harness::start();
    h.handle.connect(addr("AA:BB")).await.unwrap();

    let err = h.handle.connect(addr("CC:DD")).await.unwrap_err();
    assert!(matches!(
        err,
        CentralError::SessionBusy {
            state: LinkState::Connecting
        }
    ));
    assert_eq!(h.adapter.count_where(|c| matches!(c, Call::Connect(_))), 1);
    assert_eq!(h.view.connected_peripheral().unwrap().address, addr("AA:BB"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_discovering_services_is_refused() {
    let h = Harness::start();
    h.handle.connect(addr("AA:BB")).await.unwrap();
    h.link(HandleId(1), "AA:BB", GattStatus::SUCCESS, LinkStatus::Connected);
    h.settle().await;
    assert_eq!(h.view.link_state(), LinkState::DiscoveringServices);

    let err = h.handle.connect(addr("CC:DD")).await.unwrap_err();
    assert!(matches!(
        err,
        CentralError::SessionBusy {
            state: LinkState::DiscoveringServices
        }
    ));
    assert_eq!(h.adapter.count_where(|c| matches!(c, Call::Connect(_))), 1);
    assert_eq!(h.view.link_state(), LinkState::DiscoveringServices);
    assert_eq!(h.view.connected_peripheral().unwrap().address, addr("AA:BB"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_ready_is_refused() {
    let h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    let err = h.handle.connect(addr("CC:DD")).await.unwrap_err();
    assert!(matches!(
        err,
        CentralError::SessionBusy {
            state: LinkState::Ready
        }
    ));
    assert_eq!(h.adapter.count_where(|c| matches!(c, Call::Connect(_))), 1);
    assert_eq!(h.adapter.count(&Call::Close(handle)), 0);
    assert_eq!(h.view.link_state(), LinkState::Ready);
    assert_eq!(h.view.connected_peripheral().unwrap().address, addr("AA:BB"));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_runs_once() {
    let h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    h.link(handle, "AA:BB", GattStatus::CONN_TIMEOUT, LinkStatus::Disconnected);
    h.link(handle, "AA:BB", GattStatus::CONN_TIMEOUT, LinkStatus::Disconnected);
    h.settle().await;
    h.handle.disconnect().await.unwrap();
    h.link(handle, "AA:BB", GattStatus::SUCCESS, LinkStatus::Connected);
    h.settle().await;

    assert_eq!(h.adapter.count(&Call::Close(handle)), 1);
    assert_eq!(h.notifications().len(), 1);
    assert_eq!(h.view.link_state(), LinkState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_changes_nothing() {
    let adapter = RecordingAdapter::new();
    adapter.deny(RadioOperation::Scan);
    let h = Harness::with_adapter(adapter);

    let err = h.handle.start_discovery().await.unwrap_err();
    assert!(matches!(
        err,
        CentralError::PermissionDenied {
            operation: RadioOperation::Scan
        }
    ));
    assert!(!h.view.is_scanning());
    assert!(h.adapter.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_permission_denied_keeps_discovery() {
    let h = Harness::start();
    h.discover(vec![Sighting::new("AA:BB", Some(-60), None)]).await;
    h.adapter.deny(RadioOperation::Connect);

    let err = h.handle.connect(addr("AA:BB")).await.unwrap_err();
    assert!(matches!(err, CentralError::PermissionDenied { .. }));
    assert!(h.view.is_scanning());
    assert_eq!(h.view.peripherals().len(), 1);
    assert_eq!(h.adapter.count(&Call::StopScan), 0);
    assert_eq!(h.view.link_state(), LinkState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_first_attempt_failure_is_silent() {
    let h = Harness::start();
    h.handle.connect(addr("AA:BB")).await.unwrap();

    h.link(HandleId(1), "AA:BB", GattStatus::ERROR, LinkStatus::Disconnected);
    h.settle().await;

    assert!(h.notifications().is_empty());
    assert_eq!(h.adapter.count(&Call::Close(HandleId(1))), 1);
    assert_eq!(h.view.link_state(), LinkState::Idle);
    assert!(h.view.is_scanning());
    assert!(matches!(
        h.view.last_error(),
        Some(CentralError::ConnectionFailure {
            status: GattStatus::ERROR
        })
    ));

    h.handle.connect(addr("AA:BB")).await.unwrap();
    assert!(h.view.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connect_rejected_resumes_discovery() {
    let h = Harness::start();
    h.adapter.reject(RadioOperation::Connect);

    let err = h.handle.connect(addr("AA:BB")).await.unwrap_err();
    assert!(matches!(
        err,
        CentralError::SubmissionRejected {
            operation: RadioOperation::Connect
        }
    ));
    assert!(h.notifications().is_empty());
    assert_eq!(h.view.link_state(), LinkState::Idle);
    assert!(h.view.connected_peripheral().is_none());
    assert!(h.view.is_scanning());
}

#[tokio::test(start_paused = true)]
async fn test_service_discovery_failure_alerts() {
    let h = Harness::start();
    h.handle.connect(addr("AA:BB")).await.unwrap();
    let handle = HandleId(1);
    h.link(handle, "AA:BB", GattStatus::SUCCESS, LinkStatus::Connected);
    h.settle().await;
    assert_eq!(h.view.link_state(), LinkState::DiscoveringServices);
    assert!(!h.view.is_connecting());

    tokio::time::sleep(SETTLE).await;
    h.emit(RadioEvent::ServicesDiscovered {
        handle,
        status: GattStatus::FAILURE,
        characteristics: Vec::new(),
    });
    h.settle().await;

    assert_eq!(h.notifications(), vec!["Unknown Device".to_string()]);
    assert_eq!(h.adapter.count(&Call::Close(handle)), 1);
    assert_eq!(h.view.link_state(), LinkState::Idle);
    assert!(matches!(
        h.view.last_error(),
        Some(CentralError::ServiceDiscoveryFailure {
            status: GattStatus::FAILURE
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_missing_sensor_characteristic_disables_polling() {
    let h = Harness::start();
    h.handle.connect(addr("AA:BB")).await.unwrap();
    let handle = HandleId(1);
    h.link(handle, "AA:BB", GattStatus::SUCCESS, LinkStatus::Connected);
    tokio::time::sleep(SETTLE).await;
    h.emit(RadioEvent::ServicesDiscovered {
        handle,
        status: GattStatus::SUCCESS,
        characteristics: vec![location_characteristic()],
    });
    tokio::time::sleep(POLL * 2).await;
    h.settle().await;

    assert_eq!(h.view.link_state(), LinkState::Ready);
    assert_eq!(h.location.starts.load(Ordering::SeqCst), 0);
    assert_eq!(h.adapter.count_where(|c| matches!(c, Call::Read(..))), 0);
}

#[tokio::test(start_paused = true)]
async fn test_history_is_bounded() {
    let h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    for i in 0..130 {
        h.sensor_value(handle, encode_sensor(&reading(i as f32)));
    }
    h.settle().await;

    let history = h.view.sensor_history();
    assert_eq!(history.len(), 120);
    assert_eq!(history[0].temperature, Some(10.0));
    assert_eq!(history[119].temperature, Some(129.0));
}

#[tokio::test(start_paused = true)]
async fn test_bad_payloads_ignored() {
    let h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    h.sensor_value(handle, Vec::new());
    h.sensor_value(handle, vec![0x0d, 0x00]);
    h.emit(RadioEvent::CharacteristicRead {
        handle,
        uuid: LOCATION_CHARACTERISTIC_UUID,
        value: encode_sensor(&reading(1.0)),
        status: GattStatus::SUCCESS,
    });
    h.settle().await;

    assert!(h.view.sensor_history().is_empty());
    assert!(h.view.connected_peripheral().unwrap().sensor_data.is_none());
    assert_eq!(h.view.link_state(), LinkState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_stale_handle_events_ignored() {
    let h = Harness::start();
    let first = h.ready_session("AA:BB").await;
    h.handle.disconnect().await.unwrap();
    h.link(first, "AA:BB", GattStatus::SUCCESS, LinkStatus::Disconnected);
    h.settle().await;

    let second = h.ready_session("AA:BB").await;
    assert_ne!(first, second);

    h.sensor_value(first, encode_sensor(&reading(30.0)));
    h.link(first, "AA:BB", GattStatus::CONN_TIMEOUT, LinkStatus::Disconnected);
    h.settle().await;

    assert!(h.view.sensor_history().is_empty());
    assert_eq!(h.view.link_state(), LinkState::Ready);
    assert_eq!(h.adapter.count(&Call::Close(first)), 1);
    assert!(h.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_adapter_off_ends_session() {
    let h = Harness::start();
    h.discover(vec![Sighting::new("CC:DD", Some(-70), None)]).await;
    let handle = h.ready_session("AA:BB").await;

    h.emit(RadioEvent::AdapterStateChanged { enabled: false });
    h.settle().await;

    assert_eq!(h.adapter.count(&Call::Close(handle)), 1);
    assert_eq!(h.notifications().len(), 1);
    assert!(h.view.peripherals().is_empty());
    assert!(!h.view.is_scanning());
    assert_eq!(h.adapter.count(&Call::StartScan), 1);

    let err = h.handle.start_discovery().await.unwrap_err();
    assert!(matches!(err, CentralError::RadioDisabled));

    h.emit(RadioEvent::AdapterStateChanged { enabled: true });
    h.settle().await;
    h.handle.start_discovery().await.unwrap();
    assert!(h.view.is_scanning());
}

#[tokio::test(start_paused = true)]
async fn test_scan_failure_keeps_list() {
    let h = Harness::start();
    h.discover(vec![Sighting::new("AA:BB", Some(-60), None)]).await;

    h.emit(RadioEvent::ScanFailed { code: 2 });
    h.settle().await;

    assert!(!h.view.is_scanning());
    assert_eq!(h.view.peripherals().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scan_start_rejected() {
    let h = Harness::start();
    h.adapter.reject(RadioOperation::Scan);

    let err = h.handle.start_discovery().await.unwrap_err();
    assert!(matches!(err, CentralError::ScanStartFailure { .. }));
    assert!(!h.view.is_scanning());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_session() {
    let mut h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    h.handle.shutdown().await.unwrap();
    (&mut h.task).await.unwrap();

    assert_eq!(h.adapter.count(&Call::Disconnect(handle)), 1);
    assert_eq!(h.adapter.count(&Call::Close(handle)), 1);
    assert!(h.location.stops.load(Ordering::SeqCst) >= 1);
    assert!(h.notifications().is_empty());
    assert_eq!(h.view.link_state(), LinkState::Idle);
    assert!(!h.view.is_scanning());
    assert!(matches!(h.handle.sync().await, Err(CentralError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_aborted_central_releases_session() {
    let mut h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    h.task.abort();
    assert!((&mut h.task).await.unwrap_err().is_cancelled());

    assert_eq!(h.adapter.count(&Call::Disconnect(handle)), 1);
    assert_eq!(h.adapter.count(&Call::Close(handle)), 1);
    assert!(h.location.stops.load(Ordering::SeqCst) >= 1);
    assert!(h.notifications().is_empty());
    assert_eq!(h.view.link_state(), LinkState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handles_stops_central() {
    let h = Harness::start();
    let handle = h.ready_session("AA:BB").await;

    let Harness {
        adapter,
        location,
        handle: central,
        view,
        sink,
        task,
        ..
    } = h;
    drop(central);
    task.await.unwrap();

    assert_eq!(adapter.count(&Call::Disconnect(handle)), 1);
    assert_eq!(adapter.count(&Call::Close(handle)), 1);
    assert!(location.stops.load(Ordering::SeqCst) >= 1);
    assert_eq!(view.link_state(), LinkState::Idle);

    // the adapter's sink outlives the central without keeping it alive
    sink.emit(RadioEvent::ScanFailed { code: 1 });
}
