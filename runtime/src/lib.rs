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

mod calendar;
mod channel;
mod config;
mod device;
mod dma;
mod error;
mod loopback;
pub mod proto;
mod runner;
mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// Public types
// type to use for logical simulation time, in picoseconds
pub type Tick = u64;

pub use crate::calendar::{EventCalendar, EventRef, TimedEvent};
pub use crate::config::Arguments;
pub use crate::device::{
    BarConfig, Device, DeviceIntro, DmaDirection, DmaOp, DmaRef, IntControl, BAR_64, BAR_IO,
    BAR_PREFETCH, PCI_BAR_COUNT,
};
pub use crate::dma::DMA_MAX_PENDING;
pub use crate::error::Error;
pub use crate::loopback::LoopbackTransport;
pub use crate::runner::{Runner, Runtime, MAX_STEP};
pub use crate::transport::{
    D2hSlot, D2nSlot, SyncMode, Transport, TransportParams, SYNC_BARRIER, SYNC_MODES,
};
