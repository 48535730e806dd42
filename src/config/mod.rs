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

//! Configuration module.
//!
//! Handles loading and saving daemon settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants::{timing, MAX_SENSOR_HISTORY};
use crate::bluetooth::CentralSettings;
use crate::collaborators::GeoPoint;
use crate::peripheral::PeripheralAddress;

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Telemetry settings.
    pub telemetry: TelemetryConfig,

    /// Fixed position reported to peripherals.
    pub location: LocationConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Scan debounce window in milliseconds.
    pub debounce_ms: u64,

    /// Wait after link-up before service discovery, in milliseconds.
    pub settle_delay_ms: u64,

    /// Address to connect to as soon as it is discovered.
    pub auto_connect: Option<String>,

    /// Resume scanning after a session ends.
    pub auto_restart_discovery: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Delay after each sensor read and each location write, in seconds.
    pub poll_interval_secs: u64,

    /// Maximum number of sensor samples kept.
    pub history_capacity: usize,

    /// Multiplier applied to degrees before truncation.
    pub coordinate_scale: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            debounce_ms: timing::DEBOUNCE.as_millis() as u64,
            settle_delay_ms: timing::SETTLE_DELAY.as_millis() as u64,
            auto_connect: None,
            auto_restart_discovery: true,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: timing::POLL_INTERVAL.as_secs(),
            history_capacity: MAX_SENSOR_HISTORY,
            coordinate_scale: 1.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "buzz_central=info".to_string(),
        }
    }
}

impl LocationConfig {
    /// The configured position, if both coordinates are set.
    pub fn fixed(&self) -> Option<GeoPoint> {
        Some(GeoPoint {
            latitude: self.latitude?,
            longitude: self.longitude?,
            altitude: self.altitude,
        })
    }
}

impl BluetoothConfig {
    /// Parsed auto-connect target. Blank values are treated as unset.
    pub fn auto_connect_address(&self) -> Option<PeripheralAddress> {
        PeripheralAddress::parse(self.auto_connect.as_deref())
    }
}

impl Config {
    /// Default configuration path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buzz-central")
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Runtime settings for the central.
    pub fn central_settings(&self) -> CentralSettings {
        CentralSettings {
            debounce: Duration::from_millis(self.bluetooth.debounce_ms),
            settle_delay: Duration::from_millis(self.bluetooth.settle_delay_ms),
            poll_interval: Duration::from_secs(self.telemetry.poll_interval_secs),
            history_capacity: self.telemetry.history_capacity,
            coordinate_scale: self.telemetry.coordinate_scale,
            auto_restart_discovery: self.bluetooth.auto_restart_discovery,
        }
    }
}
