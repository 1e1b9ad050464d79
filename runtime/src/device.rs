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

use std::cell::RefCell;
use std::rc::Rc;

use crate::calendar::EventRef;
use crate::proto;
use crate::runner::Runtime;

pub const PCI_BAR_COUNT: usize = 6;

// BAR flag bits declared through `DeviceIntro`.
pub const BAR_IO: u32 = 1 << 0;
pub const BAR_64: u32 = 1 << 1;
pub const BAR_PREFETCH: u32 = 1 << 2;

/// One base address region window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BarConfig {
    /// Window size in bytes; zero disables the BAR.
    pub len: u64,
    pub flags: u32,
}

/// Device self-description, filled in by `Device::setup_intro` before the
/// transport attaches. Slot sizes are the negotiated per-entry capacities
/// of the four rings; the runtime's slot-fit checks read them from here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceIntro {
    pub bars: [BarConfig; PCI_BAR_COUNT],
    pub pci_vendor_id: u16,
    pub pci_device_id: u16,
    pub pci_class: u8,
    pub pci_subclass: u8,
    pub pci_revision: u8,
    pub pci_msi_nvecs: u8,
    pub pci_msix_nvecs: u16,
    pub d2h_elen: usize,
    pub h2d_elen: usize,
    pub d2n_elen: usize,
    pub n2d_elen: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaDirection {
    Read,
    Write,
}

/// One pending bus transfer.
///
/// `data` is the caller's buffer: a write reads from it at issue time, a
/// read completion stores the returned bytes into it. The transfer length
/// is `data.len()`. The device owns the op; the runtime holds a handle
/// only between `Runtime::issue_dma` and the `dma_complete` callback, so
/// the buffer stays valid for the whole flight without further ceremony.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DmaOp {
    pub direction: DmaDirection,
    pub dma_addr: u64,
    pub data: Vec<u8>,
    /// Opaque device cookie, passed through unchanged to `dma_complete`.
    pub tag: u64,
}

impl DmaOp {
    /// A read of `len` bytes from host memory at `dma_addr`.
    pub fn read(dma_addr: u64, len: usize, tag: u64) -> Self {
        Self {
            direction: DmaDirection::Read,
            dma_addr,
            data: vec![0; len],
            tag,
        }
    }

    /// A write of `data` to host memory at `dma_addr`.
    pub fn write(dma_addr: u64, data: Vec<u8>, tag: u64) -> Self {
        Self {
            direction: DmaDirection::Write,
            dma_addr,
            data,
            tag,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_shared(self) -> DmaRef {
        Rc::new(RefCell::new(self))
    }
}

/// Shared handle to a device-owned DMA op.
pub type DmaRef = Rc<RefCell<DmaOp>>;

/// Interrupt-enable state mirrored from host DEVCTRL messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntControl {
    pub intx_en: bool,
    pub msi_en: bool,
    pub msix_en: bool,
}

/// A behavioral device model driven by the runtime.
///
/// Callbacks execute on the single simulation thread and must return
/// promptly; the `Runtime` handle they receive is how a device issues
/// DMAs, sends frames, raises interrupts and manages timers from inside
/// a callback.
pub trait Device {
    /// Declare BAR layout, PCI identity and slot sizes. Called once at
    /// startup with a zeroed intro.
    fn setup_intro(&mut self, intro: &mut DeviceIntro);

    /// Synchronous register read; fill `dst` (its length is the access
    /// size). Must not block.
    fn reg_read(&mut self, rt: &mut dyn Runtime, bar: u8, offset: u64, dst: &mut [u8]);

    /// Synchronous register write of `src`. Must not block.
    fn reg_write(&mut self, rt: &mut dyn Runtime, bar: u8, offset: u64, src: &[u8]);

    /// A DMA previously passed to `Runtime::issue_dma` has finished. For
    /// reads, `op`'s buffer now holds the returned bytes. Completions
    /// arrive in host order, which may differ from issue order.
    fn dma_complete(&mut self, rt: &mut dyn Runtime, op: DmaRef);

    /// A frame arrived from the network peer.
    fn eth_rx(&mut self, rt: &mut dyn Runtime, port: u8, data: &[u8]);

    /// A scheduled event came due.
    fn timed_event(&mut self, _rt: &mut dyn Runtime, _event: EventRef) {}

    /// Storage for the interrupt-enable mask recorded by `devctrl_update`.
    fn int_control(&mut self) -> &mut IntControl;

    /// The host changed the interrupt-enable mask.
    fn devctrl_update(&mut self, flags: u32) {
        let ctl = self.int_control();
        ctl.intx_en = flags & proto::CTRL_INTX_EN != 0;
        ctl.msi_en = flags & proto::CTRL_MSI_EN != 0;
        ctl.msix_en = flags & proto::CTRL_MSIX_EN != 0;
    }
}
