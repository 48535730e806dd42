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

//! Periodic sensor read / location write cycle.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::SessionId;
use crate::events::{CentralMessage, PollStep};
use crate::state::LinkState;

/// Drives the telemetry cycle while a session is ready.
///
/// The poller never touches the radio itself: each step is sent to the
/// central, which checks the session before submitting anything.
#[derive(Debug)]
pub struct TelemetryPoller {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl TelemetryPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start polling for `session`. Returns `false` if already running.
    pub fn start(
        &mut self,
        session: SessionId,
        link_state: watch::Receiver<LinkState>,
        tx: mpsc::UnboundedSender<CentralMessage>,
    ) -> bool {
        if self.is_running() {
            debug!("Telemetry poller already running");
            return false;
        }

        let interval = self.interval;
        self.task = Some(tokio::spawn(poll_loop(session, interval, link_state, tx)));
        true
    }

    /// Stop polling. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Telemetry poller stopped");
        }
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    session: SessionId,
    interval: Duration,
    link_state: watch::Receiver<LinkState>,
    tx: mpsc::UnboundedSender<CentralMessage>,
) {
    info!("Sensor polling started ({:?} per step)", interval);

    let is_ready = || *link_state.borrow() == LinkState::Ready;

    loop {
        if !is_ready() {
            break;
        }
        let read = CentralMessage::Poll {
            session,
            step: PollStep::ReadSensor,
        };
        if tx.send(read).is_err() {
            break;
        }
        tokio::time::sleep(interval).await;

        if !is_ready() {
            break;
        }
        let write = CentralMessage::Poll {
            session,
            step: PollStep::WriteLocation,
        };
        if tx.send(write).is_err() {
            break;
        }
        tokio::time::sleep(interval).await;
    }

    info!("Sensor polling ended");
}
