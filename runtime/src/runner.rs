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

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::calendar::{EventCalendar, EventRef};
use crate::device::{Device, DeviceIntro, DmaRef};
use crate::dma::DmaPipeline;
use crate::error::Error;
use crate::transport::{Transport, TransportParams};
use crate::Tick;

/// Largest time step the loop takes on its own, in ps.
pub const MAX_STEP: Tick = 10_000;

const MAC_MASK: u64 = (1 << 48) - 1;

// Process-wide termination and introspection flags. The handlers only
// touch these; the loop observes them at iteration boundaries, so the
// logical clock itself can stay plain instance state.
static EXITING: AtomicBool = AtomicBool::new(false);
static DUMP_TIME: AtomicBool = AtomicBool::new(false);

extern "C" fn sigint_handler(_signum: libc::c_int) {
    EXITING.store(true, Ordering::Relaxed);
}

extern "C" fn sigusr1_handler(_signum: libc::c_int) {
    DUMP_TIME.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let sigint: extern "C" fn(libc::c_int) = sigint_handler;
    let sigusr1: extern "C" fn(libc::c_int) = sigusr1_handler;
    // SAFETY: the handlers only store to lock-free atomics.
    unsafe {
        libc::signal(libc::SIGINT, sigint as libc::sighandler_t);
        libc::signal(libc::SIGUSR1, sigusr1 as libc::sighandler_t);
    }
}

fn default_mac_seed() -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs ^ u64::from(std::process::id())
}

/// 48-bit unicast MAC with the low two bits cleared.
fn generate_mac(seed: u64) -> u64 {
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    rng.gen::<u64>() & MAC_MASK & !3
}

/// The runtime services a device callback may invoke.
///
/// Handed to every re-entrant `Device` callback; devices must not retain
/// it across callbacks. None of these suspend.
pub trait Runtime {
    /// Current logical time in picoseconds.
    fn time_ps(&self) -> Tick;

    /// The device's MAC address, fixed at construction.
    fn mac_addr(&self) -> u64;

    /// Hand a DMA op to the pipeline. Issued immediately while fewer than
    /// `DMA_MAX_PENDING` transfers are in flight, deferred in FIFO order
    /// otherwise.
    fn issue_dma(&mut self, op: DmaRef);

    /// Insert an event into the calendar at its current time.
    fn event_schedule(&mut self, event: EventRef);

    /// Remove an event from the calendar if scheduled.
    fn event_cancel(&mut self, event: &EventRef);

    /// Transmit an ethernet frame on port 0.
    fn eth_send(&mut self, data: &[u8]);

    /// Raise a message-signaled interrupt.
    fn msi_issue(&mut self, vector: u8);

    /// Raise an MSI-X interrupt.
    fn msix_issue(&mut self, vector: u8);
}

/// Runtime state shared by the calendar, the DMA pipeline and channel
/// I/O. Kept separate from the device so that device callbacks can borrow
/// the full runtime surface while the device itself is borrowed mutably.
pub(crate) struct NicCore<T: Transport> {
    pub(crate) transport: T,
    pub(crate) time: Tick,
    pub(crate) calendar: EventCalendar,
    pub(crate) dma: DmaPipeline,
    pub(crate) intro: DeviceIntro,
    pub(crate) mac_addr: u64,
    /// True when either channel runs synchronized.
    pub(crate) sync: bool,
}

impl<T: Transport> Runtime for NicCore<T> {
    fn time_ps(&self) -> Tick {
        self.time
    }

    fn mac_addr(&self) -> u64 {
        self.mac_addr
    }

    fn issue_dma(&mut self, op: DmaRef) {
        self.dma_issue(op);
    }

    fn event_schedule(&mut self, event: EventRef) {
        self.calendar.schedule(event);
    }

    fn event_cancel(&mut self, event: &EventRef) {
        self.calendar.cancel(event);
    }

    fn eth_send(&mut self, data: &[u8]) {
        self.eth_tx(data);
    }

    fn msi_issue(&mut self, vector: u8) {
        self.interrupt_tx(vector, crate::proto::IntMode::Msi);
    }

    fn msix_issue(&mut self, vector: u8) {
        self.interrupt_tx(vector, crate::proto::IntMode::Msix);
    }
}

/// Couples a device model to the host and network simulators and drives
/// the logical clock. One instance per simulated device; several runners
/// can coexist in one process (the clock is instance state).
pub struct Runner<D: Device, T: Transport> {
    pub(crate) device: D,
    pub(crate) nic: NicCore<T>,
}

impl<D: Device, T: Transport> Runner<D, T> {
    pub fn new(device: D, transport: T) -> Self {
        Self::with_mac_seed(device, transport, default_mac_seed())
    }

    /// Like `new` with a fixed MAC seed, for reproducible runs.
    pub fn with_mac_seed(device: D, transport: T, mac_seed: u64) -> Self {
        let mac_addr = generate_mac(mac_seed);
        log::info!("mac_addr {:#014x}", mac_addr);
        Self {
            device,
            nic: NicCore {
                transport,
                time: 0,
                calendar: EventCalendar::new(),
                dma: DmaPipeline::new(),
                intro: DeviceIntro::default(),
                mac_addr,
                sync: false,
            },
        }
    }

    pub fn time_ps(&self) -> Tick {
        self.nic.time
    }

    pub fn mac_addr(&self) -> u64 {
        self.nic.mac_addr
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn transport(&self) -> &T {
        &self.nic.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.nic.transport
    }

    /// The service surface device callbacks receive, for use outside a
    /// callback (e.g. to schedule a device's first event).
    pub fn runtime(&mut self) -> &mut dyn Runtime {
        &mut self.nic
    }

    /// Let the device describe itself and attach the transport. Separate
    /// from `run` so tests can drive the loop one `step` at a time.
    pub fn init(&mut self, params: &TransportParams) -> Result<(), Error> {
        self.nic.intro = DeviceIntro::default();
        self.device.setup_intro(&mut self.nic.intro);
        self.nic.sync = params.sync_pci || params.sync_eth;
        self.nic.time = params.start_tick;
        self.nic.transport.init(params, &self.nic.intro)?;
        log::info!("sync_pci={} sync_eth={}", params.sync_pci, params.sync_eth);
        Ok(())
    }

    /// One outer iteration of the time loop: synchronize, drain messages
    /// and due events at the current time, then advance the clock.
    pub fn step(&mut self) {
        while !self.nic.transport.sync(self.nic.time) {
            log::warn!("sync failed (t={})", self.nic.time);
        }
        self.nic.transport.advance_epoch(self.nic.time);

        // Drain to a fixed point: the clock may only move once every
        // inbound slot and calendar entry at or before `now` is consumed.
        let next_ts = loop {
            self.poll_h2d();
            self.poll_n2d();
            self.event_trigger();

            let mut next_ts = self.nic.time + MAX_STEP;
            if self.nic.sync {
                next_ts = next_ts.min(self.nic.transport.next_timestamp());
            }
            if let Some(ev_ts) = self.nic.calendar.next_time() {
                if ev_ts < next_ts {
                    next_ts = ev_ts;
                }
            }
            if next_ts > self.nic.time || EXITING.load(Ordering::Relaxed) {
                break next_ts;
            }
        };
        self.nic.time = self.nic.transport.advance_time(next_ts);
    }

    /// Install signal handlers, initialize, and run until SIGINT. The
    /// iteration in progress when the flag is raised completes before the
    /// transport is torn down.
    pub fn run(&mut self, params: &TransportParams) -> Result<(), Error> {
        install_signal_handlers();
        self.init(params)?;
        while !EXITING.load(Ordering::Relaxed) {
            if DUMP_TIME.swap(false, Ordering::Relaxed) {
                eprintln!("now = {}", self.nic.time);
            }
            self.step();
        }
        log::info!("exit now: {}", self.nic.time);
        self.nic.transport.cleanup();
        Ok(())
    }

    /// Fire at most one due calendar event.
    fn event_trigger(&mut self) {
        let Some(event) = self.nic.calendar.pop_due(self.nic.time) else {
            return;
        };
        self.device.timed_event(&mut self.nic, event);
    }
}

#[cfg(test)]
mod runner_tests {
    use super::*;
    use crate::loopback::LoopbackTransport;
    use crate::testutil::{test_params, RecorderDevice};
    use crate::TimedEvent;
    use std::rc::Rc;

    fn test_runner() -> Runner<RecorderDevice, LoopbackTransport> {
        let mut runner = Runner::with_mac_seed(
            RecorderDevice::default(),
            LoopbackTransport::new(128),
            0x1234,
        );
        runner.init(&test_params()).expect("init failed");
        runner
    }

    #[test]
    fn test_mac_is_deterministic_unicast() {
        let _ = env_logger::builder().is_test(true).try_init();
        let a = Runner::with_mac_seed(
            RecorderDevice::default(),
            LoopbackTransport::new(8),
            0xfeed,
        );
        let b = Runner::with_mac_seed(
            RecorderDevice::default(),
            LoopbackTransport::new(8),
            0xfeed,
        );
        assert_eq!(a.mac_addr(), b.mac_addr());
        assert_eq!(a.mac_addr() & 3, 0);
        assert!(a.mac_addr() <= MAC_MASK);
        assert_ne!(a.mac_addr(), 0);
    }

    #[test]
    fn test_init_populates_intro() {
        let mut runner = Runner::with_mac_seed(
            RecorderDevice::default(),
            LoopbackTransport::new(8),
            1,
        );
        let mut params = test_params();
        params.start_tick = 777;
        runner.init(&params).unwrap();
        assert!(runner.transport().initialized());
        assert_eq!(runner.nic.intro.bars[0].len, 0x1000);
        assert_ne!(runner.nic.intro.d2h_elen, 0);
        assert_eq!(runner.time_ps(), 777);
    }

    #[test]
    fn test_init_failure_surfaces() {
        let mut transport = LoopbackTransport::new(8);
        transport.fail_init = true;
        let mut runner = Runner::with_mac_seed(RecorderDevice::default(), transport, 1);
        assert_eq!(runner.init(&test_params()), Err(Error::TransportInit));
    }

    #[test]
    fn test_idle_step_advances_by_max_step() {
        let mut runner = test_runner();
        for i in 1..=3 {
            runner.step();
            assert_eq!(runner.time_ps(), i * MAX_STEP);
        }
    }

    #[test]
    fn test_sync_clamps_next_timestamp() {
        let mut runner = test_runner();
        runner.transport_mut().set_sync_offset(3_000);
        runner.step();
        assert_eq!(runner.time_ps(), 3_000);
        runner.step();
        assert_eq!(runner.time_ps(), 6_000);
    }

    #[test]
    fn test_transport_may_force_smaller_step() {
        let mut runner = test_runner();
        runner.transport_mut().set_advance_cap(4_000);
        runner.step();
        assert_eq!(runner.time_ps(), 4_000);
    }

    #[test]
    fn test_sync_lag_retries_in_same_iteration() {
        let mut runner = test_runner();
        runner.transport_mut().set_sync_failures(2);
        runner.step();
        // Two failed attempts plus the one that succeeded.
        assert_eq!(runner.transport().sync_calls(), 3);
        assert_eq!(runner.time_ps(), MAX_STEP);
    }

    #[test]
    fn test_due_events_fire_in_order_within_one_iteration() {
        let mut runner = Runner::with_mac_seed(
            RecorderDevice::default(),
            LoopbackTransport::new(8),
            1,
        );
        let mut params = test_params();
        params.start_tick = 1_200;
        runner.init(&params).unwrap();

        runner.nic.calendar.schedule(TimedEvent::shared(1_000, 0));
        runner.nic.calendar.schedule(TimedEvent::shared(500, 1));
        runner.nic.calendar.schedule(TimedEvent::shared(1_000, 2));

        runner.step();
        let fired = runner
            .device()
            .fired
            .iter()
            .map(|ev| (ev.borrow().time, ev.borrow().tag))
            .collect::<Vec<_>>();
        assert_eq!(fired, vec![(500, 1), (1_000, 0), (1_000, 2)]);
        assert!(runner.nic.calendar.is_empty());
        assert!(runner.time_ps() > 1_200);
    }

    #[test]
    fn test_clock_waits_for_future_event() {
        let mut runner = test_runner();
        runner.nic.calendar.schedule(TimedEvent::shared(2_500, 9));
        runner.step();
        // The clock stops at the event, not at max_step.
        assert_eq!(runner.time_ps(), 2_500);
        assert!(runner.device().fired.is_empty());
        runner.step();
        assert_eq!(runner.device().fired.len(), 1);
    }

    #[test]
    fn test_cancelled_event_never_fires() {
        let mut runner = test_runner();
        let event = TimedEvent::shared(100, 4);
        runner.nic.calendar.schedule(Rc::clone(&event));
        runner.nic.calendar.cancel(&event);
        for _ in 0..4 {
            runner.step();
        }
        assert!(runner.device().fired.is_empty());
        assert_eq!(runner.time_ps(), 4 * MAX_STEP);
    }

    #[test]
    fn test_now_is_monotonic() {
        let mut runner = test_runner();
        runner.nic.calendar.schedule(TimedEvent::shared(900, 0));
        runner.nic.calendar.schedule(TimedEvent::shared(15_000, 1));
        let mut last = runner.time_ps();
        for _ in 0..10 {
            runner.step();
            assert!(runner.time_ps() >= last);
            last = runner.time_ps();
        }
    }
}
