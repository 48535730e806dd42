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

//! Characteristic payload definitions and serialization.
//!
//! Both payloads are protobuf messages shared with the peripheral firmware:
//!
//! ```text
//! message SensorData {
//!   optional float temperature = 1;
//!   optional float pressure = 2;
//!   optional float humidity = 3;
//! }
//! message LocationData {
//!   int32 latitude = 1;
//!   int32 longitude = 2;
//!   optional int32 altitude = 3;
//! }
//! ```

use prost::Message;
use tracing::debug;

use super::adapter::{CharacteristicProperties, WriteMode};
use super::ble_constants::{LOCATION_CHARACTERISTIC_UUID, SENSOR_CHARACTERISTIC_UUID};
use crate::collaborators::GeoPoint;
use crate::error::CentralError;
use crate::peripheral::SensorReading;

/// Sensor characteristic payload.
#[derive(Clone, PartialEq, Message)]
pub struct SensorData {
    #[prost(float, optional, tag = "1")]
    pub temperature: Option<f32>,
    #[prost(float, optional, tag = "2")]
    pub pressure: Option<f32>,
    #[prost(float, optional, tag = "3")]
    pub humidity: Option<f32>,
}

/// Location characteristic payload.
#[derive(Clone, PartialEq, Message)]
pub struct LocationData {
    #[prost(int32, tag = "1")]
    pub latitude: i32,
    #[prost(int32, tag = "2")]
    pub longitude: i32,
    #[prost(int32, optional, tag = "3")]
    pub altitude: Option<i32>,
}

impl From<SensorData> for SensorReading {
    fn from(data: SensorData) -> Self {
        Self {
            temperature: data.temperature,
            pressure: data.pressure,
            humidity: data.humidity,
        }
    }
}

/// Decode a sensor characteristic value.
///
/// An empty value is rejected even though protobuf would accept it.
pub fn decode_sensor(value: &[u8]) -> Result<SensorReading, CentralError> {
    let failure = || CentralError::DecodeFailure {
        characteristic: SENSOR_CHARACTERISTIC_UUID,
    };

    if value.is_empty() {
        return Err(failure());
    }

    let data = SensorData::decode(value).map_err(|e| {
        debug!("SensorData decode error: {} (value {})", e, hex::encode_upper(value));
        failure()
    })?;

    Ok(data.into())
}

/// Encode a sensor reading. Used by tests and simulated peripherals.
pub fn encode_sensor(reading: &SensorReading) -> Vec<u8> {
    SensorData {
        temperature: reading.temperature,
        pressure: reading.pressure,
        humidity: reading.humidity,
    }
    .encode_to_vec()
}

/// Build the location payload from the last known position.
///
/// Degrees are multiplied by `scale` and truncated toward zero; an unknown
/// position is sent as 0/0.
pub fn encode_location(location: Option<GeoPoint>, scale: f64) -> Vec<u8> {
    let to_wire = |degrees: f64| (degrees * scale) as i32;

    let message = match location {
        Some(point) => LocationData {
            latitude: to_wire(point.latitude),
            longitude: to_wire(point.longitude),
            altitude: point.altitude.map(|a| a as i32),
        },
        None => LocationData {
            latitude: 0,
            longitude: 0,
            altitude: None,
        },
    };

    message.encode_to_vec()
}

/// Pick the write mode for the location characteristic.
///
/// Prefers write-without-response, falls back to acknowledged writes.
pub fn select_write_mode(properties: &CharacteristicProperties) -> Result<WriteMode, CentralError> {
    if properties.write_without_response {
        Ok(WriteMode::WithoutResponse)
    } else if properties.write {
        Ok(WriteMode::WithResponse)
    } else {
        Err(CentralError::CharacteristicNotWritable {
            uuid: LOCATION_CHARACTERISTIC_UUID,
        })
    }
}

/// Check that the sensor characteristic can be read.
pub fn ensure_readable(properties: &CharacteristicProperties) -> Result<(), CentralError> {
    if properties.read {
        Ok(())
    } else {
        Err(CentralError::CharacteristicNotReadable {
            uuid: SENSOR_CHARACTERISTIC_UUID,
        })
    }
}
