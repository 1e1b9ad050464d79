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

//! Messages carried by the four directional channels.
//!
//! The transport owns the byte layout of its ring slots; this module fixes
//! the logical content of each slot kind and the header sizes that the
//! slot-fit checks account for. Inbound enums keep an `Other` variant with
//! the raw kind byte so that unrecognized slots can be logged and dropped
//! without the transport having to understand them.

/// Interrupt-enable bits carried by a DEVCTRL message.
pub const CTRL_INTX_EN: u32 = 1 << 0;
pub const CTRL_MSI_EN: u32 = 1 << 1;
pub const CTRL_MSIX_EN: u32 = 1 << 2;

/// Header bytes a transport slot reserves ahead of the payload, per kind.
/// A slot of `elen` bytes therefore fits `elen - *_HDR` payload bytes.
pub const D2H_WRITE_HDR: usize = 32;
pub const D2H_READCOMP_HDR: usize = 16;
pub const D2N_SEND_HDR: usize = 16;
pub const H2D_READCOMP_HDR: usize = 16;

/// Host to device: register access, DMA completions, device control.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum H2dMsg {
    Read(H2dRead),
    Write(H2dWrite),
    ReadComp(H2dReadComp),
    WriteComp(H2dWriteComp),
    DevCtrl(H2dDevCtrl),
    Sync,
    /// Unrecognized slot kind; the raw type byte is kept for diagnostics.
    Other(u8),
}

/// Register read request against a BAR window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct H2dRead {
    pub req_id: u64,
    pub bar: u8,
    pub offset: u64,
    pub len: usize,
}

/// Register write request against a BAR window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct H2dWrite {
    pub req_id: u64,
    pub bar: u8,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Completion of a device-issued DMA read; carries the fetched bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct H2dReadComp {
    pub req_id: u64,
    pub data: Vec<u8>,
}

/// Completion of a device-issued DMA write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct H2dWriteComp {
    pub req_id: u64,
}

/// Interrupt-enable mask update from the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct H2dDevCtrl {
    pub flags: u32,
}

/// Network to device: frame delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum N2dMsg {
    Recv(N2dRecv),
    Sync,
    Other(u8),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct N2dRecv {
    pub port: u8,
    pub data: Vec<u8>,
}

/// Interrupt delivery mechanism for a D2H interrupt slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntMode {
    Intx,
    Msi,
    Msix,
}

/// Device to host: register completions, DMA requests, interrupts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum D2hMsg {
    Read(D2hRead),
    Write(D2hWrite),
    ReadComp(D2hReadComp),
    WriteComp(D2hWriteComp),
    Interrupt(D2hInterrupt),
}

/// DMA read request: fetch `len` bytes from host memory at `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct D2hRead {
    pub req_id: u64,
    pub offset: u64,
    pub len: usize,
}

/// DMA write request: store `data` to host memory at `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct D2hWrite {
    pub req_id: u64,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Completion of a host-issued register read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct D2hReadComp {
    pub req_id: u64,
    pub data: Vec<u8>,
}

/// Completion of a host-issued register write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct D2hWriteComp {
    pub req_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct D2hInterrupt {
    pub vector: u8,
    pub mode: IntMode,
}

/// Device to network: frame transmission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum D2nMsg {
    Send(D2nSend),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct D2nSend {
    pub port: u8,
    pub data: Vec<u8>,
}
