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

//! Buzz central.
//!
//! Discovers Buzz sensor peripherals over BLE, owns at most one GATT
//! session at a time and runs the sensor-read / location-write telemetry
//! exchange while that session is ready.

pub mod bluetooth;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod peripheral;
pub mod state;

pub use bluetooth::{Central, CentralSettings};
pub use error::{CentralError, ScanFailureReason};
pub use events::CentralHandle;
pub use state::StateView;
