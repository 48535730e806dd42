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

//! Observable central state.
//!
//! The owner task publishes immutable snapshots; the presentation layer
//! reads them through a [`StateView`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::error::CentralError;
use crate::peripheral::{PeripheralRecord, SensorSample};

/// Lifecycle state of the (single) connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Idle,
    Connecting,
    DiscoveringServices,
    Ready,
    Disconnecting,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "Idle",
            LinkState::Connecting => "Connecting...",
            LinkState::DiscoveringServices => "Discovering services...",
            LinkState::Ready => "Ready",
            LinkState::Disconnecting => "Disconnecting...",
        }
    }
}

/// Write side, held by the central.
#[derive(Debug)]
pub(crate) struct StatePublisher {
    peripherals: watch::Sender<Arc<[PeripheralRecord]>>,
    is_scanning: watch::Sender<bool>,
    is_connecting: watch::Sender<bool>,
    connected: watch::Sender<Option<PeripheralRecord>>,
    sensor_history: watch::Sender<Arc<[SensorSample]>>,
    link_state: watch::Sender<LinkState>,
    last_error: watch::Sender<Option<CentralError>>,
}

impl StatePublisher {
    pub fn set_peripherals(&self, peripherals: Arc<[PeripheralRecord]>) {
        self.peripherals.send_replace(peripherals);
    }

    pub fn set_scanning(&self, scanning: bool) {
        self.is_scanning.send_if_modified(|current| replace_if_changed(current, scanning));
    }

    pub fn set_connecting(&self, connecting: bool) {
        self.is_connecting.send_if_modified(|current| replace_if_changed(current, connecting));
    }

    pub fn set_connected(&self, record: Option<PeripheralRecord>) {
        self.connected.send_replace(record);
    }

    pub fn set_sensor_history(&self, history: Arc<[SensorSample]>) {
        self.sensor_history.send_replace(history);
    }

    pub fn set_link_state(&self, state: LinkState) {
        self.link_state.send_if_modified(|current| replace_if_changed(current, state));
    }

    pub fn set_last_error(&self, error: Option<CentralError>) {
        self.last_error.send_replace(error);
    }

    pub fn subscribe_link_state(&self) -> watch::Receiver<LinkState> {
        self.link_state.subscribe()
    }
}

fn replace_if_changed<T: PartialEq>(current: &mut T, new: T) -> bool {
    if *current == new {
        false
    } else {
        *current = new;
        true
    }
}

/// Read-only view of the central state.
#[derive(Debug, Clone)]
pub struct StateView {
    peripherals: watch::Receiver<Arc<[PeripheralRecord]>>,
    is_scanning: watch::Receiver<bool>,
    is_connecting: watch::Receiver<bool>,
    connected: watch::Receiver<Option<PeripheralRecord>>,
    sensor_history: watch::Receiver<Arc<[SensorSample]>>,
    link_state: watch::Receiver<LinkState>,
    last_error: watch::Receiver<Option<CentralError>>,
}

impl StateView {
    pub fn peripherals(&self) -> Arc<[PeripheralRecord]> {
        self.peripherals.borrow().clone()
    }

    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.borrow()
    }

    pub fn is_connecting(&self) -> bool {
        *self.is_connecting.borrow()
    }

    pub fn connected_peripheral(&self) -> Option<PeripheralRecord> {
        self.connected.borrow().clone()
    }

    pub fn sensor_history(&self) -> Arc<[SensorSample]> {
        self.sensor_history.borrow().clone()
    }

    pub fn link_state(&self) -> LinkState {
        *self.link_state.borrow()
    }

    /// Why the most recent session failed. Cleared when a new connection starts.
    pub fn last_error(&self) -> Option<CentralError> {
        self.last_error.borrow().clone()
    }

    pub fn subscribe_peripherals(&self) -> watch::Receiver<Arc<[PeripheralRecord]>> {
        self.peripherals.clone()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<Option<PeripheralRecord>> {
        self.connected.clone()
    }

    pub fn subscribe_sensor_history(&self) -> watch::Receiver<Arc<[SensorSample]>> {
        self.sensor_history.clone()
    }

    pub fn subscribe_link_state(&self) -> watch::Receiver<LinkState> {
        self.link_state.clone()
    }

    pub fn subscribe_last_error(&self) -> watch::Receiver<Option<CentralError>> {
        self.last_error.clone()
    }
}

pub(crate) fn state_channels() -> (StatePublisher, StateView) {
    let empty_peripherals: Arc<[PeripheralRecord]> = Arc::from(Vec::new());
    let empty_history: Arc<[SensorSample]> = Arc::from(Vec::new());

    let (peripherals_tx, peripherals_rx) = watch::channel(empty_peripherals);
    let (scanning_tx, scanning_rx) = watch::channel(false);
    let (connecting_tx, connecting_rx) = watch::channel(false);
    let (connected_tx, connected_rx) = watch::channel(None);
    let (history_tx, history_rx) = watch::channel(empty_history);
    let (link_tx, link_rx) = watch::channel(LinkState::Idle);
    let (error_tx, error_rx) = watch::channel(None);

    let publisher = StatePublisher {
        peripherals: peripherals_tx,
        is_scanning: scanning_tx,
        is_connecting: connecting_tx,
        connected: connected_tx,
        sensor_history: history_tx,
        link_state: link_tx,
        last_error: error_tx,
    };
    let view = StateView {
        peripherals: peripherals_rx,
        is_scanning: scanning_rx,
        is_connecting: connecting_rx,
        connected: connected_rx,
        sensor_history: history_rx,
        link_state: link_rx,
        last_error: error_rx,
    };
    (publisher, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let (_publisher, view) = state_channels();
        assert!(view.peripherals().is_empty());
        assert!(!view.is_scanning());
        assert!(!view.is_connecting());
        assert!(view.connected_peripheral().is_none());
        assert_eq!(view.link_state(), LinkState::Idle);
        assert!(view.last_error().is_none());
    }

    #[test]
    fn test_unchanged_flag_does_not_notify() {
        let (publisher, view) = state_channels();
        let mut rx = view.subscribe_link_state();
        publisher.set_link_state(LinkState::Idle);
        assert!(!rx.has_changed().unwrap());
        publisher.set_link_state(LinkState::Connecting);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), LinkState::Connecting);
    }
}
