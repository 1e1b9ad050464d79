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

//! System-level scenarios driven through the public harness API: register
//! round-trips, DMA back-pressure, payload copies, event ordering,
//! interrupt enables, and signal-driven shutdown.

use std::rc::Rc;

use runtime::proto::{
    D2hMsg, H2dDevCtrl, H2dMsg, H2dRead, H2dReadComp, H2dWriteComp, CTRL_MSIX_EN, CTRL_MSI_EN,
};
use runtime::{
    Device, DeviceIntro, DmaOp, DmaRef, EventRef, IntControl, LoopbackTransport, Runner, Runtime,
    SyncMode, TimedEvent, TransportParams, DMA_MAX_PENDING,
};

/// Minimal observable device for the scenarios.
#[derive(Default)]
struct ProbeDevice {
    reg_file: Vec<u8>,
    completions: Vec<DmaRef>,
    fired: Vec<u64>,
    int_control: IntControl,
    /// When set, raise SIGINT from the first timed event.
    quit_on_event: bool,
}

impl Device for ProbeDevice {
    fn setup_intro(&mut self, intro: &mut DeviceIntro) {
        intro.bars[0].len = 0x1000;
        intro.pci_vendor_id = 0x0dd0;
        intro.pci_device_id = 0x0002;
        intro.d2h_elen = 2048;
        intro.h2d_elen = 2048;
        intro.d2n_elen = 2048;
        intro.n2d_elen = 2048;
    }

    fn reg_read(&mut self, _rt: &mut dyn Runtime, _bar: u8, offset: u64, dst: &mut [u8]) {
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = self
                .reg_file
                .get(offset as usize + i)
                .copied()
                .unwrap_or(0);
        }
    }

    fn reg_write(&mut self, _rt: &mut dyn Runtime, _bar: u8, offset: u64, src: &[u8]) {
        let end = offset as usize + src.len();
        if self.reg_file.len() < end {
            self.reg_file.resize(end, 0);
        }
        self.reg_file[offset as usize..end].copy_from_slice(src);
    }

    fn dma_complete(&mut self, _rt: &mut dyn Runtime, op: DmaRef) {
        self.completions.push(op);
    }

    fn eth_rx(&mut self, _rt: &mut dyn Runtime, _port: u8, _data: &[u8]) {}

    fn timed_event(&mut self, _rt: &mut dyn Runtime, event: EventRef) {
        self.fired.push(event.borrow().tag);
        if self.quit_on_event {
            // SAFETY: raising a signal against the current process.
            unsafe {
                libc::raise(libc::SIGINT);
            }
        }
    }

    fn int_control(&mut self) -> &mut IntControl {
        &mut self.int_control
    }
}

fn params(start_tick: u64) -> TransportParams {
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
        start_tick,
    }
}

fn probe_runner(start_tick: u64) -> Runner<ProbeDevice, LoopbackTransport> {
    let mut runner = Runner::with_mac_seed(
        ProbeDevice::default(),
        LoopbackTransport::new(256),
        0xabcd,
    );
    runner.init(&params(start_tick)).expect("init failed");
    runner
}

/// S1: an H2D register read produces one READCOMP with the same req_id
/// and the device's bytes.
fn scenario_register_roundtrip() {
    let mut runner = probe_runner(0);
    runner.device_mut().reg_file = vec![0; 0x20];
    runner.device_mut().reg_file[0x10..0x14].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

    runner.transport_mut().push_h2d(H2dMsg::Read(H2dRead {
        req_id: 0x52,
        bar: 0,
        offset: 0x10,
        len: 4,
    }));
    runner.step();

    let out = runner.transport_mut().drain_d2h();
    assert_eq!(out.len(), 1);
    match &out[0] {
        D2hMsg::ReadComp(rc) => {
            assert_eq!(rc.req_id, 0x52);
            assert_eq!(rc.data, vec![0xde, 0xad, 0xbe, 0xef]);
        }
        other => panic!("expected readcomp, got {:?}", other),
    }
    log::info!("register roundtrip ok");
}

/// S2: 65 issued writes, 64 on the wire, the 65th issues only after the
/// first completion.
fn scenario_dma_backpressure() {
    let mut runner = probe_runner(0);
    for i in 0..65u64 {
        runner
            .runtime()
            .issue_dma(DmaOp::write(i * 8, vec![i as u8; 8], i).into_shared());
    }
    let writes = runner
        .transport_mut()
        .drain_d2h()
        .into_iter()
        .map(|msg| match msg {
            D2hMsg::Write(write) => write,
            other => panic!("expected write, got {:?}", other),
        })
        .collect::<Vec<_>>();
    assert_eq!(writes.len(), DMA_MAX_PENDING);

    runner.transport_mut().push_h2d(H2dMsg::WriteComp(H2dWriteComp {
        req_id: writes[0].req_id,
    }));
    runner.step();

    let late = runner.transport_mut().drain_d2h();
    assert_eq!(late.len(), 1);
    match &late[0] {
        D2hMsg::Write(write) => assert_eq!(write.offset, 64 * 8),
        other => panic!("expected deferred write, got {:?}", other),
    }
    assert_eq!(runner.device().completions.len(), 1);
    log::info!("dma backpressure ok");
}

/// S3: a 16-byte DMA read lands in the caller's buffer verbatim.
fn scenario_dma_read_payload() {
    let mut runner = probe_runner(0);
    let op = DmaOp::read(0x8000, 16, 7).into_shared();
    runner.runtime().issue_dma(Rc::clone(&op));

    let req_id = match &runner.transport_mut().drain_d2h()[0] {
        D2hMsg::Read(read) => read.req_id,
        other => panic!("expected read, got {:?}", other),
    };
    let payload = (0u8..16).collect::<Vec<_>>();
    runner.transport_mut().push_h2d(H2dMsg::ReadComp(H2dReadComp {
        req_id,
        data: payload.clone(),
    }));
    runner.step();

    assert_eq!(op.borrow().data, payload);
    log::info!("dma read payload ok");
}

/// S4: events at {1000, 500, 1000} all fire inside one outer iteration
/// once `now` reaches 1200, in (time, schedule-order) order.
fn scenario_event_ordering() {
    let mut runner = probe_runner(1_200);
    runner.runtime().event_schedule(TimedEvent::shared(1_000, 0));
    runner.runtime().event_schedule(TimedEvent::shared(500, 1));
    runner.runtime().event_schedule(TimedEvent::shared(1_000, 2));

    runner.step();

    assert_eq!(runner.device().fired, vec![1, 0, 2]);
    log::info!("event ordering ok");
}

/// S5: DEVCTRL with MSI|MSIX sets exactly those enables.
fn scenario_interrupt_enables() {
    let mut runner = probe_runner(0);
    runner.transport_mut().push_h2d(H2dMsg::DevCtrl(H2dDevCtrl {
        flags: CTRL_MSI_EN | CTRL_MSIX_EN,
    }));
    runner.step();

    let ctl = runner.device_mut().int_control;
    assert!(ctl.msi_en && ctl.msix_en && !ctl.intx_en);
    log::info!("interrupt enables ok");
}

/// S6: SIGINT mid-run finishes the iteration, tears the transport down,
/// and returns cleanly.
fn scenario_graceful_shutdown() {
    let mut device = ProbeDevice::default();
    device.quit_on_event = true;
    let mut runner = Runner::with_mac_seed(device, LoopbackTransport::new(64), 0xabcd);
    runner
        .runtime()
        .event_schedule(TimedEvent::shared(30_000, 99));

    runner.run(&params(0)).expect("run failed");

    assert_eq!(runner.device().fired, vec![99]);
    assert!(runner.transport().cleaned_up());
    assert!(runner.time_ps() >= 30_000);
    log::info!("graceful shutdown ok");
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    scenario_register_roundtrip();
    scenario_dma_backpressure();
    scenario_dma_read_payload();
    scenario_event_ordering();
    scenario_interrupt_enables();
    scenario_graceful_shutdown();

    log::info!("all scenarios passed");
}
