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

//! Shared fixtures for the unit tests.

use crate::calendar::EventRef;
use crate::device::{Device, DeviceIntro, DmaRef, IntControl};
use crate::runner::Runtime;
use crate::transport::{SyncMode, TransportParams};

/// A device that records every callback, serving canned data on reads.
#[derive(Default)]
pub(crate) struct RecorderDevice {
    /// Bytes served to `reg_read`, truncated or zero-padded to fit.
    pub read_data: Vec<u8>,
    pub reads: Vec<(u8, u64, usize)>,
    pub writes: Vec<(u8, u64, Vec<u8>)>,
    pub completions: Vec<DmaRef>,
    pub rx_frames: Vec<(u8, Vec<u8>)>,
    pub fired: Vec<EventRef>,
    /// Callback order across all entry points.
    pub calls: Vec<&'static str>,
    pub int_control: IntControl,
}

impl Device for RecorderDevice {
    fn setup_intro(&mut self, intro: &mut DeviceIntro) {
        intro.bars[0].len = 0x1000;
        intro.pci_vendor_id = 0x0dd0;
        intro.pci_device_id = 0x0001;
        intro.pci_msi_nvecs = 4;
        intro.d2h_elen = 2048;
        intro.h2d_elen = 2048;
        intro.d2n_elen = 2048;
        intro.n2d_elen = 2048;
    }

    fn reg_read(&mut self, _rt: &mut dyn Runtime, bar: u8, offset: u64, dst: &mut [u8]) {
        self.calls.push("reg_read");
        self.reads.push((bar, offset, dst.len()));
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = self.read_data.get(i).copied().unwrap_or(0);
        }
    }

    fn reg_write(&mut self, _rt: &mut dyn Runtime, bar: u8, offset: u64, src: &[u8]) {
        self.calls.push("reg_write");
        self.writes.push((bar, offset, src.to_vec()));
    }

    fn dma_complete(&mut self, _rt: &mut dyn Runtime, op: DmaRef) {
        self.calls.push("dma_complete");
        self.completions.push(op);
    }

    fn eth_rx(&mut self, _rt: &mut dyn Runtime, port: u8, data: &[u8]) {
        self.calls.push("eth_rx");
        self.rx_frames.push((port, data.to_vec()));
    }

    fn timed_event(&mut self, _rt: &mut dyn Runtime, event: EventRef) {
        self.calls.push("timed_event");
        self.fired.push(event);
    }

    fn int_control(&mut self) -> &mut IntControl {
        &mut self.int_control
    }
}

/// Parameters for a loopback-backed runner.
pub(crate) fn test_params() -> TransportParams {
    TransportParams {
        pci_socket: "pci".to_string(),
        eth_socket: "eth".to_string(),
        shm_path: "shm".to_string(),
        sync_pci: true,
        sync_eth: true,
        sync_mode: SyncMode::PerMessage,
        pci_latency: 500_000,
        eth_latency: 500_000,
        sync_period: 100_000,
        start_tick: 0,
    }
}
