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

use crate::device::Device;
use crate::proto::{
    self, D2hInterrupt, D2hMsg, D2hReadComp, D2hWriteComp, D2nMsg, D2nSend, H2dMsg, H2dRead,
    H2dWrite, IntMode, N2dMsg,
};
use crate::runner::{NicCore, Runner};
use crate::transport::{D2hSlot, D2nSlot, Transport};

impl<T: Transport> NicCore<T> {
    /// Claim a device-to-host slot, spinning until one frees up. The
    /// runtime is single-threaded, so there is nothing else to do while
    /// the host drains its ring; each failed attempt is logged.
    pub(crate) fn d2h_alloc(&mut self) -> D2hSlot {
        loop {
            if let Some(slot) = self.transport.d2h_alloc(self.time) {
                return slot;
            }
            log::error!("d2h_alloc: no entry available");
        }
    }

    pub(crate) fn d2n_alloc(&mut self) -> D2nSlot {
        loop {
            if let Some(slot) = self.transport.d2n_alloc(self.time) {
                return slot;
            }
            log::error!("d2n_alloc: no entry available");
        }
    }

    /// Transmit a frame to the network peer on port 0.
    pub(crate) fn eth_tx(&mut self, data: &[u8]) {
        let cap = self.intro.d2n_elen.saturating_sub(proto::D2N_SEND_HDR);
        if data.len() > cap {
            panic!(
                "eth_tx: frame too big ({}), can only fit up to ({})",
                data.len(),
                cap
            );
        }
        log::debug!("eth tx: len {}", data.len());
        let slot = self.d2n_alloc();
        self.transport.d2n_publish(
            slot,
            D2nMsg::Send(D2nSend {
                port: 0,
                data: data.to_vec(),
            }),
        );
    }

    /// Raise an interrupt toward the host.
    pub(crate) fn interrupt_tx(&mut self, vector: u8, mode: IntMode) {
        log::debug!("issue interrupt vec {} mode {:?}", vector, mode);
        let slot = self.d2h_alloc();
        self.transport
            .d2h_publish(slot, D2hMsg::Interrupt(D2hInterrupt { vector, mode }));
    }
}

impl<D: Device, T: Transport> Runner<D, T> {
    /// Consume at most one host-to-device message.
    pub(crate) fn poll_h2d(&mut self) {
        let Some(msg) = self.nic.transport.h2d_poll(self.nic.time) else {
            return;
        };
        match msg {
            H2dMsg::Read(read) => self.h2d_read(read),
            H2dMsg::Write(write) => self.h2d_write(write),
            H2dMsg::ReadComp(rc) => self.h2d_readcomp(rc),
            H2dMsg::WriteComp(wc) => self.h2d_writecomp(wc),
            H2dMsg::DevCtrl(dc) => self.device.devctrl_update(dc.flags),
            H2dMsg::Sync => {}
            H2dMsg::Other(kind) => log::error!("poll_h2d: unsupported type={}", kind),
        }
        self.nic.transport.h2d_done();
        self.nic.transport.h2d_next();
    }

    /// Consume at most one network-to-device message.
    pub(crate) fn poll_n2d(&mut self) {
        let Some(msg) = self.nic.transport.n2d_poll(self.nic.time) else {
            return;
        };
        match msg {
            N2dMsg::Recv(recv) => {
                log::debug!("eth rx: port {} len {}", recv.port, recv.data.len());
                self.device.eth_rx(&mut self.nic, recv.port, &recv.data);
            }
            N2dMsg::Sync => {}
            N2dMsg::Other(kind) => log::error!("poll_n2d: unsupported type={}", kind),
        }
        self.nic.transport.n2d_done();
        self.nic.transport.n2d_next();
    }

    fn h2d_read(&mut self, read: H2dRead) {
        let slot = self.nic.d2h_alloc();
        let mut data = vec![0u8; read.len];
        self.device
            .reg_read(&mut self.nic, read.bar, read.offset, &mut data);
        log::debug!(
            "reg read(bar={}, off={:#x}, len={})",
            read.bar,
            read.offset,
            read.len
        );
        self.nic.transport.d2h_publish(
            slot,
            D2hMsg::ReadComp(D2hReadComp {
                req_id: read.req_id,
                data,
            }),
        );
    }

    fn h2d_write(&mut self, write: H2dWrite) {
        log::debug!(
            "reg write(bar={}, off={:#x}, len={})",
            write.bar,
            write.offset,
            write.data.len()
        );
        self.device
            .reg_write(&mut self.nic, write.bar, write.offset, &write.data);
        let slot = self.nic.d2h_alloc();
        self.nic.transport.d2h_publish(
            slot,
            D2hMsg::WriteComp(D2hWriteComp {
                req_id: write.req_id,
            }),
        );
    }
}
