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


//! Point-in-time statistics derived from the registry

use crate::ClientInfo;
use heartwire_codec::StatusCode;
use std::fmt;

/// Number of clients in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusDistribution {
    /// Clients reporting an error
    pub error: usize,
    /// Clients reporting secondary
    pub secondary: usize,
    /// Clients reporting primary
    pub primary: usize,
    /// Clients with no status yet
    pub unknown: usize,
}

impl StatusDistribution {
    /// Count for a single status
    pub fn count(&self, status: StatusCode) -> usize {
        match status {
            StatusCode::Error => self.error,
            StatusCode::Secondary => self.secondary,
            StatusCode::Primary => self.primary,
            StatusCode::Unknown => self.unknown,
        }
    }

    fn increment(&mut self, status: StatusCode) {
        match status {
            StatusCode::Error => self.error += 1,
            StatusCode::Secondary => self.secondary += 1,
            StatusCode::Primary => self.primary += 1,
            StatusCode::Unknown => self.unknown += 1,
        }
    }
}

/// Aggregate registry statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryStatistics {
    /// Tracked clients
    pub total_clients: usize,
    /// Clients that reported within the inactivity threshold
    pub active_clients: usize,
    /// Clients past the inactivity threshold
    pub inactive_clients: usize,
    /// Clients whose connected hint is still set
    pub connected_clients: usize,
    /// Clients per status
    pub status: StatusDistribution,
    /// Valid messages applied across all clients
    pub total_messages: u64,
    /// Wire bytes of valid messages across all clients
    pub total_bytes: u64,
    /// Transitions across all clients
    pub total_transitions: u64,
    /// Messages per second over the configured rate window
    pub messages_per_second: f64,
}

impl RegistryStatistics {
    pub(crate) fn record_client(&mut self, info: &ClientInfo, active: bool) {
        self.total_clients += 1;
        if active {
            self.active_clients += 1;
        } else {
            self.inactive_clients += 1;
        }
        if info.connected {
            self.connected_clients += 1;
        }
        self.status.increment(info.status);
        self.total_messages += info.message_count;
        self.total_bytes += info.byte_count;
        self.total_transitions += info.transition_count;
    }
}

impl fmt::Display for RegistryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry {{ clients: {}, active: {}, primary: {}, secondary: {}, error: {}, rate: {:.2}/s }}",
            self.total_clients,
            self.active_clients,
            self.status.primary,
            self.status.secondary,
            self.status.error,
            self.messages_per_second
        )
    }
}
