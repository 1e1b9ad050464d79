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

use structopt::StructOpt;

use crate::transport::{SyncMode, TransportParams};

// CLI defaults, before the x1000 scaling to picoseconds.
const DEFAULT_SYNC_PERIOD: u64 = 100;
const DEFAULT_PCI_LATENCY: u64 = 500;
const DEFAULT_ETH_LATENCY: u64 = 500;

/// Command-line surface of a device binary. The three sockets are
/// required; the trailing positionals are optional and ordered. Missing
/// required arguments or surplus arguments produce a usage message and a
/// non-zero exit.
#[derive(Debug, StructOpt)]
#[structopt(about = "behavioral NIC device model")]
pub struct Arguments {
    /// Unix socket of the host (PCIe) peer
    #[structopt(name = "PCI-SOCKET")]
    pub pci_socket: String,

    /// Unix socket of the network peer
    #[structopt(name = "ETH-SOCKET")]
    pub eth_socket: String,

    /// Shared-memory pool backing the queues
    #[structopt(name = "SHM")]
    pub shm_path: String,

    /// Synchronization mode (0 = per-message, 1 = barrier)
    #[structopt(name = "SYNC-MODE")]
    pub sync_mode: Option<u64>,

    /// Initial simulation time in ps
    #[structopt(name = "START-TICK")]
    pub start_tick: Option<u64>,

    /// Synchronization period, x1000 ps
    #[structopt(name = "SYNC-PERIOD")]
    pub sync_period: Option<u64>,

    /// Host channel latency, x1000 ps
    #[structopt(name = "PCI-LATENCY")]
    pub pci_latency: Option<u64>,

    /// Network channel latency, x1000 ps
    #[structopt(name = "ETH-LATENCY")]
    pub eth_latency: Option<u64>,
}

impl Arguments {
    pub fn into_params(self) -> TransportParams {
        TransportParams {
            pci_socket: self.pci_socket,
            eth_socket: self.eth_socket,
            shm_path: self.shm_path,
            sync_pci: true,
            sync_eth: true,
            sync_mode: SyncMode::from_wire(self.sync_mode.unwrap_or(crate::SYNC_MODES)),
            start_tick: self.start_tick.unwrap_or(0),
            sync_period: self.sync_period.unwrap_or(DEFAULT_SYNC_PERIOD) * 1000,
            pci_latency: self.pci_latency.unwrap_or(DEFAULT_PCI_LATENCY) * 1000,
            eth_latency: self.eth_latency.unwrap_or(DEFAULT_ETH_LATENCY) * 1000,
        }
    }
}
