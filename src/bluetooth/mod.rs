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

//! Bluetooth LE central.
//!
//! Discovers peripherals, manages a single GATT session and runs the
//! sensor/location telemetry cycle over it.

pub mod adapter;
pub mod ble_constants;
#[cfg(feature = "bluez")]
pub mod bluez;
mod central;
pub mod codec;
mod discovery;
pub mod policy;
mod telemetry;

pub use adapter::{
    CharacteristicHandle, CharacteristicProperties, HandleId, LinkStatus, NativeHandle,
    RadioAdapter, RadioEvent, RadioEventSink, RadioOperation, WriteMode,
};
pub use ble_constants::GattStatus;
#[cfg(feature = "bluez")]
pub use bluez::BluezAdapter;
pub use central::{Central, CentralSettings, SessionId};
pub use discovery::DiscoveryAggregator;
pub use policy::{ReconnectPolicy, TerminationCause};
pub use telemetry::TelemetryPoller;
pub use crate::state::LinkState;
