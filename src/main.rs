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

//! Buzz central daemon.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use buzz_central::bluetooth::{BluezAdapter, LinkState};
use buzz_central::collaborators::{LogNotifier, StaticLocation};
use buzz_central::config::Config;
use buzz_central::peripheral::PeripheralAddress;
use buzz_central::{events, logging, Central, CentralHandle, StateView};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    logging::init(&config.logging.filter)?;

    info!("Starting Buzz central v{}...", env!("CARGO_PKG_VERSION"));

    // Open the radio
    let (sink, mailbox) = events::mailbox();
    let adapter = Arc::new(BluezAdapter::new(sink).await?);

    let location = Arc::new(StaticLocation::new(config.location.fixed()));
    if config.location.fixed().is_none() {
        warn!("No fixed location configured, peripherals will receive 0/0");
    }

    let (central, handle, view) = Central::new(
        adapter,
        mailbox,
        location,
        Arc::new(LogNotifier),
        config.central_settings(),
    );
    let central_task = tokio::spawn(central.run());

    if let Err(e) = handle.start_discovery().await {
        error!("Could not start discovery: {}", e);
    }

    let watchers = [
        tokio::spawn(log_peripherals(
            view.clone(),
            handle.clone(),
            config.bluetooth.auto_connect_address(),
        )),
        tokio::spawn(log_samples(view.clone())),
        tokio::spawn(log_link_state(view)),
    ];

    info!("Ready. Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    for watcher in &watchers {
        watcher.abort();
    }
    if let Err(e) = handle.shutdown().await {
        warn!("Central already stopped: {}", e);
    }
    central_task.await?;

    info!("Buzz central stopped");
    Ok(())
}

/// Log candidate list changes and auto-connect when the configured target appears.
async fn log_peripherals(
    view: StateView,
    handle: CentralHandle,
    auto_connect: Option<PeripheralAddress>,
) {
    let mut peripherals = view.subscribe_peripherals();

    while peripherals.changed().await.is_ok() {
        let list = peripherals.borrow_and_update().clone();
        debug!("{} peripherals discovered", list.len());
        for record in list.iter() {
            debug!(
                "  {} {} rssi={:?} adv={}",
                record.address,
                record.display_name(),
                record.rssi,
                record.advertisement_hex()
            );
        }

        let Some(target) = &auto_connect else {
            continue;
        };
        if view.link_state() != LinkState::Idle || !list.iter().any(|r| &r.address == target) {
            continue;
        }

        info!("Auto-connecting to {}", target);
        if let Err(e) = handle.connect(target.clone()).await {
            error!("Auto-connect to {} failed: {}", target, e);
        }
    }
}

async fn log_samples(view: StateView) {
    let mut history = view.subscribe_sensor_history();

    while history.changed().await.is_ok() {
        let latest = history.borrow_and_update().last().copied();
        if let Some(sample) = latest {
            match serde_json::to_string(&sample) {
                Ok(json) => info!("Sample: {}", json),
                Err(e) => warn!("Could not serialize sample: {}", e),
            }
        }
    }
}

async fn log_link_state(view: StateView) {
    let mut link_state = view.subscribe_link_state();

    while link_state.changed().await.is_ok() {
        let state = *link_state.borrow_and_update();
        let peripheral = view
            .connected_peripheral()
            .map(|r| r.display_name().to_string())
            .unwrap_or_else(|| "-".to_string());
        info!("Link: {} ({})", state.as_str(), peripheral);
    }
}
