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

//! Peripheral records, sensor samples and their containers.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bluetooth::ble_constants::ADVERTISEMENT_DISPLAY_BYTES;

/// Stable identity of a peripheral (its advertised address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PeripheralAddress(String);

impl PeripheralAddress {
    /// Parse an address reported by the platform.
    ///
    /// Returns `None` for missing or blank addresses.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let trimmed = raw?.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PeripheralAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(Some(s)).ok_or_else(|| "empty peripheral address".to_string())
    }
}

/// A single raw advertisement sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    /// Address as reported; `None` when the platform could not read it.
    pub address: Option<String>,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub advertisement: Option<Vec<u8>>,
}

impl Sighting {
    pub fn new(
        address: impl Into<String>,
        rssi: Option<i16>,
        advertisement: Option<Vec<u8>>,
    ) -> Self {
        Self {
            address: Some(address.into()),
            name: None,
            rssi,
            advertisement,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Decoded contents of the sensor characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SensorReading {
    pub temperature: Option<f32>,
    pub pressure: Option<f32>,
    pub humidity: Option<f32>,
}

/// A timestamped sensor reading. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSample {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f32>,
    pub pressure: Option<f32>,
    pub humidity: Option<f32>,
}

impl SensorSample {
    pub fn new(timestamp: DateTime<Utc>, reading: SensorReading) -> Self {
        Self {
            timestamp,
            temperature: reading.temperature,
            pressure: reading.pressure,
            humidity: reading.humidity,
        }
    }
}

/// Bounded FIFO of the most recent sensor samples.
#[derive(Debug, Clone)]
pub struct SensorHistory {
    samples: VecDeque<SensorSample>,
    capacity: usize,
}

impl SensorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest ones beyond capacity.
    pub fn push(&mut self, sample: SensorSample) {
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest-first snapshot.
    pub fn snapshot(&self) -> Arc<[SensorSample]> {
        self.samples.iter().copied().collect()
    }
}

/// A discovered peripheral as shown to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct PeripheralRecord {
    pub address: PeripheralAddress,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub advertisement: Option<Vec<u8>>,
    pub services_discovered: bool,
    pub sensor_data: Option<SensorReading>,
    pub is_write_pending: bool,
    pub last_write_success: Option<bool>,
}

impl PeripheralRecord {
    pub fn new(address: PeripheralAddress) -> Self {
        Self {
            address,
            name: None,
            rssi: None,
            advertisement: None,
            services_discovered: false,
            sensor_data: None,
            is_write_pending: false,
            last_write_success: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }

    /// Advertisement payload as uppercase hex, truncated for display.
    pub fn advertisement_hex(&self) -> String {
        format_advertisement(self.advertisement.as_deref())
    }

    fn apply_sighting(&mut self, sighting: &Sighting) {
        self.rssi = sighting.rssi;
        self.advertisement = sighting.advertisement.clone();
        if sighting.name.is_some() {
            self.name = sighting.name.clone();
        }
    }
}

impl PartialEq for PeripheralRecord {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeripheralRecord {}

/// Render at most the first few advertisement bytes as hex.
pub fn format_advertisement(bytes: Option<&[u8]>) -> String {
    match bytes {
        Some(bytes) => {
            let shown = &bytes[..bytes.len().min(ADVERTISEMENT_DISPLAY_BYTES)];
            hex::encode_upper(shown)
        }
        None => "N/A".to_string(),
    }
}

/// Insertion-ordered store of discovered peripherals, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct PeripheralRegistry {
    records: Vec<PeripheralRecord>,
}

impl PeripheralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a sighting into the store.
    ///
    /// Existing records are updated in place so list positions stay stable.
    /// Returns `false` if the sighting had no usable address.
    pub fn upsert(&mut self, sighting: &Sighting) -> bool {
        let Some(address) = PeripheralAddress::parse(sighting.address.as_deref()) else {
            return false;
        };

        match self.records.iter_mut().find(|r| r.address == address) {
            Some(record) => record.apply_sighting(sighting),
            None => {
                let mut record = PeripheralRecord::new(address);
                record.apply_sighting(sighting);
                self.records.push(record);
            }
        }
        true
    }

    pub fn get(&self, address: &PeripheralAddress) -> Option<&PeripheralRecord> {
        self.records.iter().find(|r| &r.address == address)
    }

    pub fn remove(&mut self, address: &PeripheralAddress) -> Option<PeripheralRecord> {
        let index = self.records.iter().position(|r| &r.address == address)?;
        Some(self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> Arc<[PeripheralRecord]> {
        self.records.iter().cloned().collect()
    }
}
