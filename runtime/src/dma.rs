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

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::device::{Device, DmaDirection, DmaRef};
use crate::proto::{self, D2hMsg, D2hRead, D2hWrite, H2dReadComp, H2dWriteComp};
use crate::runner::{NicCore, Runner};
use crate::transport::Transport;

/// Upper bound on DMAs in flight toward the host.
pub const DMA_MAX_PENDING: usize = 64;

/// Bounded-concurrency registry of outstanding DMA transfers.
///
/// Ops sent to the host sit in `in_flight` keyed by the ticket that
/// travels on the wire as `req_id`; ops that arrive while the pipeline is
/// full wait in `deferred` and are issued in insertion order as
/// completions free capacity.
pub(crate) struct DmaPipeline {
    pub(crate) in_flight: HashMap<u64, DmaRef>,
    pub(crate) deferred: VecDeque<DmaRef>,
    pub(crate) pending: usize,
    next_ticket: u64,
}

impl DmaPipeline {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: HashMap::new(),
            deferred: VecDeque::new(),
            pending: 0,
            next_ticket: 1,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending
    }

    fn ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        ticket
    }
}

impl<T: Transport> NicCore<T> {
    /// Send `op` to the host now, or park it if the pipeline is full.
    pub(crate) fn dma_issue(&mut self, op: DmaRef) {
        if self.dma.pending < DMA_MAX_PENDING {
            log::trace!(
                "dma: issuing op addr {:#x} len {} pending {}",
                op.borrow().dma_addr,
                op.borrow().len(),
                self.dma.pending
            );
            self.dma_do(op);
        } else {
            log::trace!(
                "dma: deferring op addr {:#x} len {} pending {}",
                op.borrow().dma_addr,
                op.borrow().len(),
                self.dma.pending
            );
            self.dma.deferred.push_back(op);
        }
    }

    /// Issue the head of the deferred queue if capacity is available.
    pub(crate) fn dma_trigger(&mut self) {
        if self.dma.deferred.is_empty() || self.dma.pending == DMA_MAX_PENDING {
            return;
        }
        let op = self.dma.deferred.pop_front().unwrap();
        self.dma_do(op);
    }

    fn dma_do(&mut self, op: DmaRef) {
        let (direction, dma_addr, len) = {
            let b = op.borrow();
            (b.direction, b.dma_addr, b.len())
        };
        // Devices must not synthesize transfers larger than a slot.
        match direction {
            DmaDirection::Write => {
                let cap = self.intro.d2h_elen.saturating_sub(proto::D2H_WRITE_HDR);
                if len > cap {
                    panic!("dma write too big ({}), can only fit up to ({})", len, cap);
                }
            }
            DmaDirection::Read => {
                let cap = self.intro.h2d_elen.saturating_sub(proto::H2D_READCOMP_HDR);
                if len > cap {
                    panic!("dma read too big ({}), can only fit up to ({})", len, cap);
                }
            }
        }

        let ticket = self.dma.ticket();
        let slot = self.d2h_alloc();
        self.dma.pending += 1;
        log::trace!(
            "dma: executing op ticket {} addr {:#x} len {} pending {}",
            ticket,
            dma_addr,
            len,
            self.dma.pending
        );
        let msg = match direction {
            DmaDirection::Write => D2hMsg::Write(D2hWrite {
                req_id: ticket,
                offset: dma_addr,
                data: op.borrow().data.clone(),
            }),
            DmaDirection::Read => D2hMsg::Read(D2hRead {
                req_id: ticket,
                offset: dma_addr,
                len,
            }),
        };
        self.transport.d2h_publish(slot, msg);
        self.dma.in_flight.insert(ticket, op);
    }
}

impl<D: Device, T: Transport> Runner<D, T> {
    /// A DMA read came back: copy the payload into the caller's buffer,
    /// notify the device, free capacity, and pull from the deferred queue.
    pub(crate) fn h2d_readcomp(&mut self, rc: H2dReadComp) {
        let Some(op) = self.nic.dma.in_flight.remove(&rc.req_id) else {
            log::warn!("readcomp: no in-flight dma for req_id {}", rc.req_id);
            return;
        };
        {
            let mut b = op.borrow_mut();
            let len = b.data.len();
            b.data.copy_from_slice(&rc.data[..len]);
        }
        log::trace!(
            "dma: completed read ticket {} addr {:#x} len {}",
            rc.req_id,
            op.borrow().dma_addr,
            op.borrow().len()
        );
        self.device.dma_complete(&mut self.nic, Rc::clone(&op));
        self.nic.dma.pending -= 1;
        self.nic.dma_trigger();
    }

    pub(crate) fn h2d_writecomp(&mut self, wc: H2dWriteComp) {
        let Some(op) = self.nic.dma.in_flight.remove(&wc.req_id) else {
            log::warn!("writecomp: no in-flight dma for req_id {}", wc.req_id);
            return;
        };
        log::trace!(
            "dma: completed write ticket {} addr {:#x} len {}",
            wc.req_id,
            op.borrow().dma_addr,
            op.borrow().len()
        );
        self.device.dma_complete(&mut self.nic, Rc::clone(&op));
        self.nic.dma.pending -= 1;
        self.nic.dma_trigger();
    }
}
