// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::device::DeviceIntro;
use crate::error::Error;
use crate::proto::{D2hMsg, D2nMsg, H2dMsg, N2dMsg};
use crate::Tick;

// Wire values accepted for the SYNC-MODE argument.
pub const SYNC_MODES: u64 = 0;
pub const SYNC_BARRIER: u64 = 1;

/// How the transport keeps the peers' clocks in agreement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Per-message synchronization: every slot carries a timestamp bound.
    PerMessage,
    /// Barrier synchronization at epoch boundaries.
    Barrier,
}

impl SyncMode {
    /// Maps a CLI/wire value onto a mode. Anything outside the accepted
    /// set is a fatal startup error.
    pub fn from_wire(value: u64) -> Self {
        match value {
            SYNC_MODES => Self::PerMessage,
            SYNC_BARRIER => Self::Barrier,
            other => panic!("{}", Error::InvalidSyncMode(other)),
        }
    }
}

/// Everything the transport needs to attach to its peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportParams {
    pub pci_socket: String,
    pub eth_socket: String,
    pub shm_path: String,
    pub sync_pci: bool,
    pub sync_eth: bool,
    pub sync_mode: SyncMode,
    /// Message latency on the host channel, in ps.
    pub pci_latency: Tick,
    /// Message latency on the network channel, in ps.
    pub eth_latency: Tick,
    /// Interval between sync messages, in ps.
    pub sync_period: Tick,
    /// Initial value of the logical clock.
    pub start_tick: Tick,
}

/// Reserved device-to-host slot, returned by `d2h_alloc` and consumed by
/// `d2h_publish`. The index is transport-defined.
#[derive(Debug, PartialEq, Eq)]
pub struct D2hSlot(pub usize);

/// Reserved device-to-network slot.
#[derive(Debug, PartialEq, Eq)]
pub struct D2nSlot(pub usize);

/// The shared-memory queue endpoints, as consumed by the runtime.
///
/// Outbound messages follow a reserve/publish protocol: `*_alloc` claims
/// a slot (absent when the ring is full; the runtime retries), the runtime
/// fills a message, and `*_publish` performs the ownership-bit release
/// that hands the slot to the peer. Inbound messages follow poll/done/next:
/// `*_poll` surfaces at most one message, `*_done` returns the slot to the
/// producer, `*_next` advances the ring cursor.
pub trait Transport {
    fn init(&mut self, params: &TransportParams, intro: &DeviceIntro) -> Result<(), Error>;

    fn h2d_poll(&mut self, now: Tick) -> Option<H2dMsg>;
    fn h2d_done(&mut self);
    fn h2d_next(&mut self);

    fn n2d_poll(&mut self, now: Tick) -> Option<N2dMsg>;
    fn n2d_done(&mut self);
    fn n2d_next(&mut self);

    fn d2h_alloc(&mut self, now: Tick) -> Option<D2hSlot>;
    fn d2h_publish(&mut self, slot: D2hSlot, msg: D2hMsg);

    fn d2n_alloc(&mut self, now: Tick) -> Option<D2nSlot>;
    fn d2n_publish(&mut self, slot: D2nSlot, msg: D2nMsg);

    /// Emit whatever sync traffic is due at `now`. Returns false when the
    /// peer has not advanced far enough yet; the caller retries.
    fn sync(&mut self, now: Tick) -> bool;

    /// Mark an epoch boundary at `now`.
    fn advance_epoch(&mut self, now: Tick);

    /// Earliest time the peers promise not to send a message before.
    fn next_timestamp(&mut self) -> Tick;

    /// Advance the shared clock toward `target`; returns the time actually
    /// reached, which may be smaller but never moves backwards.
    fn advance_time(&mut self, target: Tick) -> Tick;

    fn cleanup(&mut self);
}
