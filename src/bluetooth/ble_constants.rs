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

//! BLE characteristic UUIDs and status codes for Buzz peripherals.

use std::time::Duration;

use uuid::Uuid;

/// Sensor characteristic UUID (peripheral exposes temperature/pressure/humidity).
/// Properties: Read
pub const SENSOR_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000beef_0000_1000_8000_00805f9b34fb);

/// Location characteristic UUID (central writes its position here).
/// Properties: Write, Write Without Response
pub const LOCATION_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000cafe_0000_1000_8000_00805f9b34fb);

/// Timing defaults.
pub mod timing {
    use super::Duration;

    /// Window over which scan sightings are coalesced.
    pub const DEBOUNCE: Duration = Duration::from_millis(500);

    /// Pause between link-up and the service discovery request.
    pub const SETTLE_DELAY: Duration = Duration::from_millis(600);

    /// Telemetry poll half-cycle.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
}

/// Number of sensor samples kept in history.
pub const MAX_SENSOR_HISTORY: usize = 120;

/// Number of advertisement bytes rendered for display.
pub const ADVERTISEMENT_DISPLAY_BYTES: usize = 20;

/// GATT status code attached to platform events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattStatus(pub i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    pub const READ_NOT_PERMITTED: GattStatus = GattStatus(0x02);
    pub const WRITE_NOT_PERMITTED: GattStatus = GattStatus(0x03);
    pub const INSUFFICIENT_AUTHENTICATION: GattStatus = GattStatus(0x05);
    pub const REQUEST_NOT_SUPPORTED: GattStatus = GattStatus(0x06);
    pub const INVALID_OFFSET: GattStatus = GattStatus(0x07);
    pub const CONN_TIMEOUT: GattStatus = GattStatus(0x08);
    pub const INVALID_ATTRIBUTE_LENGTH: GattStatus = GattStatus(0x0d);
    pub const INSUFFICIENT_ENCRYPTION: GattStatus = GattStatus(0x0f);
    pub const CONN_TERMINATE_PEER_USER: GattStatus = GattStatus(0x13);
    pub const CONN_TERMINATE_LOCAL_HOST: GattStatus = GattStatus(0x16);
    pub const ERROR: GattStatus = GattStatus(0x85);
    pub const CONNECTION_CONGESTED: GattStatus = GattStatus(0x8f);
    pub const FAILURE: GattStatus = GattStatus(0x101);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Self::SUCCESS => "GATT_SUCCESS",
            Self::READ_NOT_PERMITTED => "GATT_READ_NOT_PERMITTED",
            Self::WRITE_NOT_PERMITTED => "GATT_WRITE_NOT_PERMITTED",
            Self::INSUFFICIENT_AUTHENTICATION => "GATT_INSUFFICIENT_AUTHENTICATION",
            Self::REQUEST_NOT_SUPPORTED => "GATT_REQUEST_NOT_SUPPORTED",
            Self::INVALID_OFFSET => "GATT_INVALID_OFFSET",
            Self::CONN_TIMEOUT => "GATT_CONN_TIMEOUT",
            Self::INVALID_ATTRIBUTE_LENGTH => "GATT_INVALID_ATTRIBUTE_LENGTH",
            Self::INSUFFICIENT_ENCRYPTION => "GATT_INSUFFICIENT_ENCRYPTION",
            Self::CONN_TERMINATE_PEER_USER => "GATT_CONN_TERMINATE_PEER_USER",
            Self::CONN_TERMINATE_LOCAL_HOST => "GATT_CONN_TERMINATE_LOCAL_HOST",
            Self::ERROR => "GATT_ERROR_133",
            Self::CONNECTION_CONGESTED => "GATT_CONNECTION_CONGESTED",
            Self::FAILURE => "GATT_FAILURE",
            _ => "UNKNOWN_GATT_STATUS",
        }
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}
