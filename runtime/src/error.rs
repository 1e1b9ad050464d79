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

use std::fmt;

/// Startup failures that surface to the caller. Everything past transport
/// initialization is handled inside the time loop; the process is the unit
/// of failure recovery.
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// The transport could not attach to its queues.
    TransportInit,
    /// The sync mode argument is outside the accepted wire values.
    InvalidSyncMode(u64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TransportInit => write!(f, "ERROR: transport initialization failed"),
            Self::InvalidSyncMode(mode) => {
                write!(f, "ERROR: invalid sync mode {}", mode)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
