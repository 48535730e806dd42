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

//! Messages processed by the central and the caller-facing handle.

use tokio::sync::{mpsc, oneshot};

use crate::bluetooth::adapter::{RadioEvent, RadioEventSink};
use crate::bluetooth::SessionId;
use crate::error::CentralError;
use crate::peripheral::{PeripheralAddress, Sighting};

/// Everything the central reacts to, in arrival order.
#[derive(Debug)]
pub enum CentralMessage {
    /// Reported by the radio adapter.
    Radio(RadioEvent),
    /// Issued by a [`CentralHandle`].
    Command(CentralCommand),
    /// Debounce window elapsed.
    DiscoveryFlush {
        generation: u64,
        sightings: Vec<Sighting>,
    },
    /// Settle delay after link-up elapsed.
    BeginServiceDiscovery { session: SessionId },
    /// Telemetry poller tick.
    Poll { session: SessionId, step: PollStep },
}

/// The two halves of a telemetry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    ReadSensor,
    WriteLocation,
}

type Reply<T> = oneshot::Sender<T>;

/// Caller requests.
#[derive(Debug)]
pub enum CentralCommand {
    StartDiscovery(Reply<Result<(), CentralError>>),
    StopDiscovery(Reply<()>),
    Connect(PeripheralAddress, Reply<Result<(), CentralError>>),
    Disconnect(Reply<Result<(), CentralError>>),
    /// Answered once every message queued before it has been handled.
    Sync(Reply<()>),
    Shutdown(Reply<()>),
}

/// Queue shared by the central, its handles and the radio adapter.
#[derive(Debug)]
pub struct Mailbox {
    pub(crate) tx: mpsc::UnboundedSender<CentralMessage>,
    pub(crate) rx: mpsc::UnboundedReceiver<CentralMessage>,
}

/// Create the central's queue.
///
/// The sink goes to the radio adapter; the mailbox to [`crate::Central::new`].
pub fn mailbox() -> (RadioEventSink, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RadioEventSink::new(tx.clone()), Mailbox { tx, rx })
}

/// Cloneable handle for issuing commands to a running central.
///
/// The central shuts down once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct CentralHandle {
    tx: mpsc::UnboundedSender<CentralMessage>,
    _alive: mpsc::Sender<()>,
}

impl CentralHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CentralMessage>, alive: mpsc::Sender<()>) -> Self {
        Self { tx, _alive: alive }
    }

    /// Begin scanning for peripherals.
    pub async fn start_discovery(&self) -> Result<(), CentralError> {
        self.request(CentralCommand::StartDiscovery).await?
    }

    /// Stop scanning. A no-op when not scanning.
    pub async fn stop_discovery(&self) -> Result<(), CentralError> {
        self.request(CentralCommand::StopDiscovery).await
    }

    /// Open a session with `address`. Scanning stops first.
    pub async fn connect(&self, address: PeripheralAddress) -> Result<(), CentralError> {
        self.request(|reply| CentralCommand::Connect(address, reply))
            .await?
    }

    /// Tear down the active session, if any.
    pub async fn disconnect(&self) -> Result<(), CentralError> {
        self.request(CentralCommand::Disconnect).await?
    }

    /// Wait until the central has handled everything queued so far.
    pub async fn sync(&self) -> Result<(), CentralError> {
        self.request(CentralCommand::Sync).await
    }

    /// Release all resources and stop the central.
    pub async fn shutdown(&self) -> Result<(), CentralError> {
        self.request(CentralCommand::Shutdown).await
    }

    /// Deliver a radio event as if it came from the adapter.
    pub fn inject(&self, event: RadioEvent) -> Result<(), CentralError> {
        self.tx
            .send(CentralMessage::Radio(event))
            .map_err(|_| CentralError::Closed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> CentralCommand,
    ) -> Result<T, CentralError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CentralMessage::Command(command(reply_tx)))
            .map_err(|_| CentralError::Closed)?;
        reply_rx.await.map_err(|_| CentralError::Closed)
    }
}
