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

//! Radio adapter boundary.
//!
//! Every request is fire-and-observe: the call only reports whether the
//! adapter accepted it, and the outcome arrives later as a [`RadioEvent`]
//! on the sink handed to the adapter at construction.

use tokio::sync::mpsc;
use uuid::Uuid;

use super::ble_constants::GattStatus;
use crate::error::AdapterError;
use crate::events::CentralMessage;
use crate::peripheral::{PeripheralAddress, Sighting};

/// Identifies a platform connection handle in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owned platform connection handle.
///
/// Not `Clone`: releasing consumes it, so a handle can only be closed once.
#[derive(Debug)]
pub struct NativeHandle {
    id: HandleId,
}

impl NativeHandle {
    pub fn new(id: HandleId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Close the handle on the adapter.
    pub fn release(self, adapter: &dyn RadioAdapter) {
        adapter.close(self.id);
    }
}

/// Kinds of request an adapter can be asked to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioOperation {
    Scan,
    Connect,
    Disconnect,
    DiscoverServices,
    Read,
    Write,
    ReadSignalStrength,
}

impl RadioOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::DiscoverServices => "service discovery",
            Self::Read => "characteristic read",
            Self::Write => "characteristic write",
            Self::ReadSignalStrength => "signal strength read",
        }
    }
}

impl std::fmt::Display for RadioOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link-layer state reported with a connection state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// How a characteristic value should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Acknowledged write (the default).
    WithResponse,
    /// Unacknowledged write command.
    WithoutResponse,
}

/// Capability flags of a remote characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

/// A characteristic found during service discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

/// Events reported by the radio.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    Sighting(Sighting),
    BatchSighting(Vec<Sighting>),
    ScanFailed {
        code: i32,
    },
    ConnectionStateChanged {
        handle: HandleId,
        address: PeripheralAddress,
        status: GattStatus,
        state: LinkStatus,
    },
    ServicesDiscovered {
        handle: HandleId,
        status: GattStatus,
        characteristics: Vec<CharacteristicHandle>,
    },
    CharacteristicRead {
        handle: HandleId,
        uuid: Uuid,
        value: Vec<u8>,
        status: GattStatus,
    },
    CharacteristicWritten {
        handle: HandleId,
        uuid: Uuid,
        status: GattStatus,
    },
    SignalStrengthRead {
        handle: HandleId,
        rssi: i16,
        status: GattStatus,
    },
    AdapterStateChanged {
        enabled: bool,
    },
}

/// Where adapters deliver their events.
///
/// Shares the owner's message queue so platform events and caller commands
/// are processed in one order.
#[derive(Debug, Clone)]
pub struct RadioEventSink {
    tx: mpsc::UnboundedSender<CentralMessage>,
}

impl RadioEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CentralMessage>) -> Self {
        Self { tx }
    }

    /// Deliver an event. Dropped silently once the central has stopped.
    pub fn emit(&self, event: RadioEvent) {
        let _ = self.tx.send(CentralMessage::Radio(event));
    }
}

/// Platform radio consumed by the central.
pub trait RadioAdapter: Send + Sync {
    /// Whether the radio is currently switched on.
    fn is_enabled(&self) -> bool;

    /// Whether the host granted the permission needed for `operation`.
    fn has_permission(&self, _operation: RadioOperation) -> bool {
        true
    }

    fn start_scan(&self) -> Result<(), AdapterError>;

    fn stop_scan(&self);

    /// Request a connection; the handle is owned by the caller from here on.
    fn connect(&self, address: &PeripheralAddress) -> Result<NativeHandle, AdapterError>;

    fn disconnect(&self, handle: HandleId) -> Result<(), AdapterError>;

    /// Release a platform handle.
    fn close(&self, handle: HandleId);

    fn discover_services(&self, handle: HandleId) -> Result<(), AdapterError>;

    fn read_characteristic(&self, handle: HandleId, uuid: Uuid) -> Result<(), AdapterError>;

    fn write_characteristic(
        &self,
        handle: HandleId,
        uuid: Uuid,
        value: Vec<u8>,
        mode: WriteMode,
    ) -> Result<(), AdapterError>;

    fn read_signal_strength(&self, handle: HandleId) -> Result<(), AdapterError>;
}
