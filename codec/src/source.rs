//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
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
//


use std::fmt;
use std::net::Ipv4Addr;

/// Identifies a reporting agent by the IPv4 address it announces in its heartbeat.
///
/// This is the registry key; one client record exists per distinct `SourceId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Ipv4Addr);

impl SourceId {
    /// Create a source identifier from an address
    pub fn new(address: Ipv4Addr) -> Self {
        Self(address)
    }

    /// Get the underlying address
    pub fn address(&self) -> Ipv4Addr {
        self.0
    }

    /// Get the four octets
    pub fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }
}

impl From<Ipv4Addr> for SourceId {
    fn from(address: Ipv4Addr) -> Self {
        Self(address)
    }
}

impl From<[u8; 4]> for SourceId {
    fn from(octets: [u8; 4]) -> Self {
        Self(Ipv4Addr::from(octets))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
