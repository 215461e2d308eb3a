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


//! Core types for the heartbeat server

use dashmap::DashSet;
use heartwire_codec::SourceId;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Unique identifier for a connection (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state (stored as atomic u8 for lock-free state management)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Worker created but not yet reading
    Connecting = 0,
    /// Worker is reading frames
    Active = 1,
    /// Worker is releasing sources and notifying observers
    Closing = 2,
    /// Worker has exited
    Closed = 3,
}

impl ConnectionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the connection is in a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Per-connection counters shared between a worker and the manager
#[derive(Debug, Default)]
pub struct ConnectionStats {
    bytes_received: AtomicU64,
    frames_received: AtomicU64,
    valid_messages: AtomicU64,
    invalid_messages: AtomicU64,
    sources: DashSet<SourceId>,
}

impl ConnectionStats {
    /// Remember that `source` reported over this connection, returning true the first time
    pub fn record_source(&self, source: SourceId) -> bool {
        self.sources.insert(source)
    }

    /// Sources that reported over this connection, in address order
    pub fn sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self.sources.iter().map(|s| *s).collect();
        sources.sort();
        sources
    }

    /// Record one decoded frame
    pub fn frame_received(&self, wire_len: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(wire_len as u64, Ordering::Relaxed);
    }

    /// Record a frame that was applied to the registry
    pub fn valid_message(&self) {
        self.valid_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame that failed to parse
    pub fn invalid_message(&self) {
        self.invalid_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes of complete frames received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Complete frames received
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Frames applied to the registry
    pub fn valid_messages(&self) -> u64 {
        self.valid_messages.load(Ordering::Relaxed)
    }

    /// Frames rejected by the parser
    pub fn invalid_messages(&self) -> u64 {
        self.invalid_messages.load(Ordering::Relaxed)
    }
}

/// Connection information snapshot (for non-blocking queries)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Current state
    pub state: ConnectionState,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// When the connection was accepted
    pub created_at: Instant,
    /// Bytes of complete frames received
    pub bytes_received: u64,
    /// Complete frames received
    pub frames_received: u64,
    /// Frames applied to the registry
    pub valid_messages: u64,
    /// Frames rejected by the parser
    pub invalid_messages: u64,
    /// Sources that reported over this connection
    pub sources: Vec<SourceId>,
}

impl ConnectionInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Whether the server is accepting connections
    pub running: bool,
    /// Bound listener address while running
    pub local_addr: Option<SocketAddr>,
    /// Number of connections currently handled
    pub active_connections: usize,
    /// Total connections since the server was created
    pub total_connections: u64,
    /// Number of sources in the registry
    pub tracked_clients: usize,
    /// Time since the server was created
    pub uptime: Duration,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self
            .local_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "HeartbeatServer {{ running: {}, addr: {}, connections: {}, total: {}, clients: {}, uptime: {:?} }}",
            self.running,
            addr,
            self.active_connections,
            self.total_connections,
            self.tracked_clients,
            self.uptime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id() {
        let id1 = ConnectionId::new(1);
        let id2 = ConnectionId::new(2);

        assert_eq!(id1.as_u64(), 1);
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id2.to_string(), "conn-2");
    }

    #[test]
    fn test_connection_state_conversion() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Active,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(200), ConnectionState::Closed);
    }

    #[test]
    fn test_connection_state_terminal() {
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Active.is_terminal());
        assert!(ConnectionState::Closing.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
    }

    #[test]
    fn test_connection_stats() {
        let stats = ConnectionStats::default();
        stats.frame_received(17);
        stats.frame_received(9);
        stats.valid_message();
        stats.invalid_message();

        assert_eq!(stats.frames_received(), 2);
        assert_eq!(stats.bytes_received(), 26);
        assert_eq!(stats.valid_messages(), 1);
        assert_eq!(stats.invalid_messages(), 1);
    }

    #[test]
    fn test_connection_stats_sources() {
        let stats = ConnectionStats::default();
        let a = SourceId::from([10, 0, 0, 9]);
        let b = SourceId::from([10, 0, 0, 5]);

        assert!(stats.record_source(a));
        assert!(stats.record_source(b));
        assert!(!stats.record_source(a));
        assert_eq!(stats.sources(), vec![b, a]);
    }
}
