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

//! External collaborators consumed by the central.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A geographic position in degrees (altitude in metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Source of the central's own position.
pub trait LocationProvider: Send + Sync {
    fn last_known_location(&self) -> Option<GeoPoint>;

    /// Begin active tracking. Called when a session becomes ready.
    fn start(&self);

    /// Stop active tracking. Called from session cleanup.
    fn stop(&self);
}

/// Shows the user that a peripheral was lost.
pub trait DisconnectNotifier: Send + Sync {
    fn notify_disconnected(&self, peripheral_name: &str);
}

/// Location provider serving a settable position.
#[derive(Debug, Default)]
pub struct StaticLocation {
    location: RwLock<Option<GeoPoint>>,
    running: AtomicBool,
}

impl StaticLocation {
    pub fn new(location: Option<GeoPoint>) -> Self {
        Self {
            location: RwLock::new(location),
            running: AtomicBool::new(false),
        }
    }

    /// Replace the last known location. `None` keeps the previous value.
    pub fn update(&self, location: Option<GeoPoint>) {
        if let Some(location) = location {
            *self.location.write() = Some(location);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl LocationProvider for StaticLocation {
    fn last_known_location(&self) -> Option<GeoPoint> {
        *self.location.read()
    }

    fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Location tracking started");
        }
    }

    fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Location tracking stopped");
        }
    }
}

/// Notifier that reports disconnections through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl DisconnectNotifier for LogNotifier {
    fn notify_disconnected(&self, peripheral_name: &str) {
        warn!("Connection lost: {}", peripheral_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_location_update_keeps_last_value() {
        let provider = StaticLocation::new(None);
        assert_eq!(provider.last_known_location(), None);

        let point = GeoPoint {
            latitude: 1.0,
            longitude: 2.0,
            altitude: None,
        };
        provider.update(Some(point));
        provider.update(None);
        assert_eq!(provider.last_known_location(), Some(point));
    }

    #[test]
    fn test_static_location_start_stop() {
        let provider = StaticLocation::new(None);
        provider.start();
        provider.start();
        assert!(provider.is_running());
        provider.stop();
        assert!(!provider.is_running());
    }
}
