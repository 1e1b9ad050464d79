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

//! A deliberately small device: one BAR of scratch registers, a DMA echo
//! engine behind a doorbell, and a periodic ethernet heartbeat. Enough to
//! light up every harness path without modeling real silicon.

use runtime::{
    Device, DeviceIntro, DmaDirection, DmaOp, DmaRef, EventRef, IntControl, Runtime,
};

/// ps between heartbeat frames.
pub const HEARTBEAT_PERIOD: u64 = 1_000_000;
pub const TAG_HEARTBEAT: u64 = 1;

const TAG_ECHO_READ: u64 = 2;
const TAG_ECHO_WRITE: u64 = 3;

// BAR0 register map.
const REG_ID: u64 = 0x00;
const REG_SCRATCH: u64 = 0x08;
const REG_MAC: u64 = 0x10;
const REG_DMA_ADDR: u64 = 0x18;
const REG_DMA_LEN: u64 = 0x20;
const REG_DOORBELL: u64 = 0x28;

const DEVICE_ID: u64 = 0x0dd0_0d10;
const MSI_VEC_ECHO: u8 = 0;

#[derive(Default)]
pub struct ScratchNic {
    scratch: u64,
    dma_addr: u64,
    dma_len: u64,
    heartbeats: u64,
    rx_frames: u64,
    int_control: IntControl,
}

fn get_le(src: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let n = src.len().min(8);
    bytes[..n].copy_from_slice(&src[..n]);
    u64::from_le_bytes(bytes)
}

fn put_le(dst: &mut [u8], value: u64) {
    let bytes = value.to_le_bytes();
    let n = dst.len().min(8);
    dst[..n].copy_from_slice(&bytes[..n]);
}

impl Device for ScratchNic {
    fn setup_intro(&mut self, intro: &mut DeviceIntro) {
        intro.bars[0].len = 0x1000;
        intro.pci_vendor_id = 0x0dd0;
        intro.pci_device_id = 0x0d10;
        intro.pci_class = 0x02; // network controller
        intro.pci_msi_nvecs = 1;
        intro.d2h_elen = 2048;
        intro.h2d_elen = 2048;
        intro.d2n_elen = 2048;
        intro.n2d_elen = 2048;
    }

    fn reg_read(&mut self, rt: &mut dyn Runtime, _bar: u8, offset: u64, dst: &mut [u8]) {
        let value = match offset {
            REG_ID => DEVICE_ID,
            REG_SCRATCH => self.scratch,
            REG_MAC => rt.mac_addr(),
            REG_DMA_ADDR => self.dma_addr,
            REG_DMA_LEN => self.dma_len,
            _ => 0,
        };
        put_le(dst, value);
    }

    fn reg_write(&mut self, rt: &mut dyn Runtime, _bar: u8, offset: u64, src: &[u8]) {
        let value = get_le(src);
        match offset {
            REG_SCRATCH => self.scratch = value,
            REG_DMA_ADDR => self.dma_addr = value,
            REG_DMA_LEN => self.dma_len = value,
            REG_DOORBELL => {
                // Fetch the buffer; the write-back happens on completion.
                log::debug!(
                    "doorbell: echo of {} bytes at {:#x}",
                    self.dma_len,
                    self.dma_addr
                );
                let op = DmaOp::read(self.dma_addr, self.dma_len as usize, TAG_ECHO_READ);
                rt.issue_dma(op.into_shared());
            }
            _ => log::debug!("write to unmapped register {:#x}", offset),
        }
    }

    fn dma_complete(&mut self, rt: &mut dyn Runtime, op: DmaRef) {
        let (direction, tag) = {
            let b = op.borrow();
            (b.direction, b.tag)
        };
        match (direction, tag) {
            (DmaDirection::Read, TAG_ECHO_READ) => {
                let data = op.borrow().data.clone();
                let write = DmaOp::write(self.dma_addr, data, TAG_ECHO_WRITE);
                rt.issue_dma(write.into_shared());
            }
            (DmaDirection::Write, TAG_ECHO_WRITE) => {
                if self.int_control.msi_en {
                    rt.msi_issue(MSI_VEC_ECHO);
                }
            }
            _ => log::warn!("unexpected dma completion tag {}", tag),
        }
    }

    fn eth_rx(&mut self, _rt: &mut dyn Runtime, port: u8, data: &[u8]) {
        self.rx_frames += 1;
        log::debug!("rx frame {} on port {} ({} bytes)", self.rx_frames, port, data.len());
    }

    fn timed_event(&mut self, rt: &mut dyn Runtime, event: EventRef) {
        self.heartbeats += 1;
        let mut frame = vec![0u8; 60];
        frame[..6].fill(0xff); // broadcast
        frame[6..12].copy_from_slice(&rt.mac_addr().to_be_bytes()[2..8]);
        frame[12..14].copy_from_slice(&0x88b5u16.to_be_bytes());
        put_le(&mut frame[14..22], self.heartbeats);
        rt.eth_send(&frame);

        event.borrow_mut().time += HEARTBEAT_PERIOD;
        rt.event_schedule(event);
    }

    fn int_control(&mut self) -> &mut IntControl {
        &mut self.int_control
    }
}
