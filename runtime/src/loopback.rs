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
use crate::proto::{D2hMsg, D2nMsg, H2dMsg, N2dMsg, N2dRecv};
use crate::transport::{D2hSlot, D2nSlot, Transport, TransportParams};
use crate::Tick;

/// Circular buffer with the slot discipline of the shared-memory rings: a
/// producer reserves the slot at the write cursor, fills it, and the entry
/// becomes visible at the read cursor; `done` hands the slot back and
/// `next` advances the cursor.
#[derive(Debug)]
struct Ring<M> {
    slots: Vec<Option<M>>,
    read_idx: usize,
    write_idx: usize,
    occupancy: usize,
}

impl<M: Clone> Ring<M> {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            read_idx: 0,
            write_idx: 0,
            occupancy: 0,
        }
    }

    fn reserve(&mut self) -> Option<usize> {
        if self.occupancy == self.slots.len() {
            return None;
        }
        let idx = self.write_idx;
        self.write_idx = (self.write_idx + 1) % self.slots.len();
        self.occupancy += 1;
        Some(idx)
    }

    fn publish(&mut self, idx: usize, msg: M) {
        debug_assert!(self.slots[idx].is_none(), "slot published twice");
        self.slots[idx] = Some(msg);
    }

    fn push(&mut self, msg: M) -> bool {
        match self.reserve() {
            Some(idx) => {
                self.publish(idx, msg);
                true
            }
            None => false,
        }
    }

    fn front(&self) -> Option<M> {
        self.slots[self.read_idx].clone()
    }

    fn done(&mut self) {
        debug_assert!(self.slots[self.read_idx].is_some(), "done without poll");
        self.slots[self.read_idx] = None;
        self.occupancy -= 1;
    }

    fn next(&mut self) {
        self.read_idx = (self.read_idx + 1) % self.slots.len();
    }

    fn is_empty(&self) -> bool {
        self.occupancy == 0
    }

    fn drain(&mut self) -> Vec<M> {
        let mut out = Vec::new();
        while let Some(msg) = self.front() {
            self.done();
            self.next();
            out.push(msg);
        }
        out
    }
}

/// In-process transport: four rings and a scriptable notion of peer time.
///
/// This is what unit tests, the system test and the demo app run against;
/// the host/network side of each ring is driven through the `push_*` and
/// `drain_*` helpers. Sync behavior is scripted: `set_sync_failures`
/// makes the next n `sync` calls report a lagging peer, `set_sync_offset`
/// bounds how far ahead of a queued-empty ring the peers promise to be,
/// and `set_advance_cap` caps how far `advance_time` will actually move.
#[derive(Debug)]
pub struct LoopbackTransport {
    h2d: Ring<H2dMsg>,
    n2d: Ring<N2dMsg>,
    d2h: Ring<D2hMsg>,
    d2n: Ring<D2nMsg>,
    cur_time: Tick,
    sync_offset: Tick,
    advance_cap: Option<Tick>,
    sync_failures: usize,
    sync_calls: usize,
    epochs: usize,
    initialized: bool,
    cleaned: bool,
    echo_frames: bool,
    /// Scripted init failure, for startup-path tests.
    pub fail_init: bool,
}

impl LoopbackTransport {
    /// All four rings get `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            h2d: Ring::new(capacity),
            n2d: Ring::new(capacity),
            d2h: Ring::new(capacity),
            d2n: Ring::new(capacity),
            cur_time: 0,
            sync_offset: Tick::MAX,
            advance_cap: None,
            sync_failures: 0,
            sync_calls: 0,
            epochs: 0,
            initialized: false,
            cleaned: false,
            echo_frames: false,
            fail_init: false,
        }
    }

    /// Reflect transmitted frames back as inbound RECV messages, so a
    /// device can run against itself with no network peer attached.
    pub fn set_echo_frames(&mut self, on: bool) {
        self.echo_frames = on;
    }

    pub fn push_h2d(&mut self, msg: H2dMsg) {
        assert!(self.h2d.push(msg), "h2d ring full");
    }

    pub fn push_n2d(&mut self, msg: N2dMsg) {
        assert!(self.n2d.push(msg), "n2d ring full");
    }

    pub fn drain_d2h(&mut self) -> Vec<D2hMsg> {
        self.d2h.drain()
    }

    pub fn drain_d2n(&mut self) -> Vec<D2nMsg> {
        self.d2n.drain()
    }

    pub fn h2d_is_empty(&self) -> bool {
        self.h2d.is_empty()
    }

    pub fn n2d_is_empty(&self) -> bool {
        self.n2d.is_empty()
    }

    pub fn set_sync_offset(&mut self, offset: Tick) {
        self.sync_offset = offset;
    }

    pub fn set_sync_failures(&mut self, failures: usize) {
        self.sync_failures = failures;
    }

    pub fn set_advance_cap(&mut self, cap: Tick) {
        self.advance_cap = Some(cap);
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn cleaned_up(&self) -> bool {
        self.cleaned
    }
}

impl Transport for LoopbackTransport {
    fn init(&mut self, params: &TransportParams, _intro: &DeviceIntro) -> Result<(), Error> {
        if self.fail_init {
            return Err(Error::TransportInit);
        }
        self.cur_time = params.start_tick;
        self.initialized = true;
        Ok(())
    }

    fn h2d_poll(&mut self, _now: Tick) -> Option<H2dMsg> {
        self.h2d.front()
    }

    fn h2d_done(&mut self) {
        self.h2d.done();
    }

    fn h2d_next(&mut self) {
        self.h2d.next();
    }

    fn n2d_poll(&mut self, _now: Tick) -> Option<N2dMsg> {
        self.n2d.front()
    }

    fn n2d_done(&mut self) {
        self.n2d.done();
    }

    fn n2d_next(&mut self) {
        self.n2d.next();
    }

    fn d2h_alloc(&mut self, _now: Tick) -> Option<D2hSlot> {
        self.d2h.reserve().map(D2hSlot)
    }

    fn d2h_publish(&mut self, slot: D2hSlot, msg: D2hMsg) {
        self.d2h.publish(slot.0, msg);
    }

    fn d2n_alloc(&mut self, _now: Tick) -> Option<D2nSlot> {
        self.d2n.reserve().map(D2nSlot)
    }

    fn d2n_publish(&mut self, slot: D2nSlot, msg: D2nMsg) {
        self.d2n.publish(slot.0, msg);
        if self.echo_frames {
            for msg in self.d2n.drain() {
                let D2nMsg::Send(send) = msg;
                let recv = N2dMsg::Recv(N2dRecv {
                    port: send.port,
                    data: send.data,
                });
                if !self.n2d.push(recv) {
                    log::debug!("echo: n2d ring full, dropping frame");
                }
            }
        }
    }

    fn sync(&mut self, _now: Tick) -> bool {
        self.sync_calls += 1;
        if self.sync_failures > 0 {
            self.sync_failures -= 1;
            return false;
        }
        true
    }

    fn advance_epoch(&mut self, _now: Tick) {
        self.epochs += 1;
    }

    fn next_timestamp(&mut self) -> Tick {
        // A queued inbound message is a promise at the current time.
        if !self.h2d.is_empty() || !self.n2d.is_empty() {
            return self.cur_time;
        }
        self.cur_time.saturating_add(self.sync_offset)
    }

    fn advance_time(&mut self, target: Tick) -> Tick {
        let reached = match self.advance_cap {
            Some(cap) => target.min(cap),
            None => target,
        };
        self.cur_time = self.cur_time.max(reached);
        self.cur_time
    }

    fn cleanup(&mut self) {
        self.cleaned = true;
    }
}
