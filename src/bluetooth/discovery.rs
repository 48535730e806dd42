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

//! Debounced aggregation of scan sightings.
//!
//! Sightings are buffered as they arrive. The first sighting of a window
//! schedules a flush; when the window elapses the whole buffer is handed to
//! the central, which merges it into the candidate list in one step.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::events::CentralMessage;
use crate::peripheral::{PeripheralAddress, PeripheralRecord, PeripheralRegistry, Sighting};

#[derive(Debug, Default)]
struct ScanResultBuffer {
    sightings: Vec<Sighting>,
    /// Ticket of the scheduled flush, if one is pending.
    pending: Option<u64>,
    next_ticket: u64,
    generation: u64,
}

/// Aggregates sightings into a deduplicated candidate list.
#[derive(Debug)]
pub struct DiscoveryAggregator {
    buffer: Arc<Mutex<ScanResultBuffer>>,
    registry: PeripheralRegistry,
    active: bool,
    window: Duration,
    flush_task: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<CentralMessage>,
}

impl DiscoveryAggregator {
    pub fn new(window: Duration, tx: mpsc::UnboundedSender<CentralMessage>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(ScanResultBuffer::default())),
            registry: PeripheralRegistry::new(),
            active: false,
            window,
            flush_task: None,
            tx,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start a fresh discovery round: the candidate list is cleared.
    pub fn begin(&mut self) {
        self.cancel_flush();
        self.registry.clear();
        self.active = true;
        debug!("Discovery round started");
    }

    /// End the current round. Buffered sightings are discarded; the
    /// candidate list is kept.
    pub fn halt(&mut self) {
        self.cancel_flush();
        if self.active {
            debug!("Discovery round ended");
        }
        self.active = false;
    }

    /// Buffer sightings. Ignored while inactive.
    pub fn record(&mut self, sightings: impl IntoIterator<Item = Sighting>) {
        if !self.active {
            trace!("Ignoring sightings outside a discovery round");
            return;
        }

        let ticket = {
            let mut buffer = self.buffer.lock();
            buffer.sightings.extend(sightings);
            if buffer.pending.is_some() || buffer.sightings.is_empty() {
                return;
            }
            buffer.next_ticket += 1;
            let ticket = buffer.next_ticket;
            buffer.pending = Some(ticket);
            ticket
        };

        self.schedule_flush(ticket);
    }

    fn schedule_flush(&mut self, ticket: u64) {
        let buffer = self.buffer.clone();
        let tx = self.tx.clone();
        let window = self.window;

        self.flush_task = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let (generation, sightings) = {
                let mut buffer = buffer.lock();
                if buffer.pending != Some(ticket) {
                    return;
                }
                buffer.pending = None;
                (buffer.generation, std::mem::take(&mut buffer.sightings))
            };

            if !sightings.is_empty() {
                let _ = tx.send(CentralMessage::DiscoveryFlush {
                    generation,
                    sightings,
                });
            }
        }));
    }

    fn cancel_flush(&mut self) {
        if let Some(task) = self.flush_task.take() {
            task.abort();
        }
        let mut buffer = self.buffer.lock();
        buffer.sightings.clear();
        buffer.pending = None;
        buffer.generation += 1;
    }

    /// Merge a flushed batch into the candidate list.
    ///
    /// Returns `false` when the batch belongs to an earlier round or
    /// discovery is no longer active; the batch is then dropped.
    pub fn apply(&mut self, generation: u64, sightings: &[Sighting]) -> bool {
        if !self.active || generation != self.buffer.lock().generation {
            debug!("Dropping stale discovery batch ({} sightings)", sightings.len());
            return false;
        }

        let mut rejected = 0;
        for sighting in sightings {
            if !self.registry.upsert(sighting) {
                rejected += 1;
            }
        }
        trace!(
            "Applied {} sightings ({} without address), {} candidates",
            sightings.len(),
            rejected,
            self.registry.len()
        );
        true
    }

    pub fn remove(&mut self, address: &PeripheralAddress) -> Option<PeripheralRecord> {
        self.registry.remove(address)
    }

    pub fn clear(&mut self) {
        self.registry.clear();
    }

    pub fn snapshot(&self) -> Arc<[PeripheralRecord]> {
        self.registry.snapshot()
    }
}

impl Drop for DiscoveryAggregator {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.take() {
            task.abort();
        }
    }
}
